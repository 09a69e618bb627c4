//! Symbol tables, partial symbol tables, and blocks.

use crate::entities::{ModuleId, SymbolId, SymtabId};
use crate::symbol::{Namespace, Symbol};
use crate::symfile::SymtabData;

/// Index of the global block in every block vector.
pub const GLOBAL_BLOCK: usize = 0;
/// Index of the file-static block in every block vector.
pub const STATIC_BLOCK: usize = 1;
/// Index of the first per-function block.
pub const FIRST_LOCAL_BLOCK: usize = 2;

/// Source language of a compilation unit, as deduced from its filename.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Language {
    C,
    Cplus,
    ObjC,
    ObjCplus,
    Unknown,
}

impl Language {
    /// Deduce the language from a source filename extension.
    pub fn from_filename(name: &str) -> Language {
        let ext = match name.rfind('.') {
            Some(i) => &name[i + 1..],
            None => return Language::Unknown,
        };
        match ext {
            "c" => Language::C,
            "cc" | "cp" | "cpp" | "cxx" | "C" => Language::Cplus,
            "m" => Language::ObjC,
            "mm" | "M" => Language::ObjCplus,
            _ => Language::Unknown,
        }
    }

    /// True for the languages that require the ZeroLink shim to fix.
    pub fn is_cplus(self) -> bool {
        matches!(self, Language::Cplus | Language::ObjCplus)
    }
}

/// A lexical block. Block 0 holds globals, block 1 holds file statics, and
/// every later block holds the formals and locals of one function.
#[derive(Clone, Debug, Default)]
pub struct Block {
    /// The owning function symbol, for per-function blocks.
    pub function: Option<SymbolId>,
    /// Code extent, for per-function blocks.
    pub start: u64,
    pub end: u64,
    /// Symbols in declaration order. The restriction checker walks old and
    /// new blocks in tandem by index, so order is load-bearing.
    pub symbols: Vec<SymbolId>,
}

impl Block {
    pub fn contains(&self, pc: u64) -> bool {
        self.start <= pc && pc < self.end
    }
}

/// A full symbol table for one compilation unit of one module.
#[derive(Clone, Debug)]
pub struct Symtab {
    pub module: ModuleId,
    /// The filename recorded by the compiler, often a basename.
    pub filename: String,
    /// The resolved full path, when known.
    pub fullname: Option<String>,
    /// Code-less mirror symtabs share a codeful symtab's blocks; only the
    /// primary one should be scanned.
    pub primary: bool,
    pub language: Language,
    pub blocks: Vec<Block>,
    pub obsolete: bool,
}

impl Symtab {
    /// Look up a symbol in one of this symtab's blocks by source name,
    /// linkage name, and namespace.
    pub fn lookup_block_symbol<'a>(
        &self,
        symbols: impl Fn(SymbolId) -> &'a Symbol,
        block: usize,
        source_name: &str,
        linkage_name: &str,
        namespace: Namespace,
    ) -> Option<SymbolId> {
        self.blocks.get(block)?.symbols.iter().copied().find(|&id| {
            let sym = symbols(id);
            sym.namespace == namespace
                && sym.source_name == source_name
                && sym.linkage_name == linkage_name
        })
    }
}

/// A partial symbol table: the cheap per-compilation-unit record built when
/// a module is read, expandable on demand into a full [`Symtab`].
#[derive(Clone, Debug)]
pub struct PartialSymtab {
    pub module: ModuleId,
    pub filename: String,
    pub fullname: Option<String>,
    /// Upper bound of the unit's text. Zero means the psymtab maps no code
    /// and can never be the original home of a fixed function.
    pub texthigh: u64,
    /// Filled in once expanded.
    pub symtab: Option<SymtabId>,
    /// The unexpanded payload; taken when the psymtab is expanded.
    pub(crate) pending: Option<SymtabData>,
    pub obsolete: bool,
}

impl PartialSymtab {
    /// Does this psymtab describe `name`, by recorded filename or by
    /// resolved full path?
    pub fn matches_source(&self, name: &str) -> bool {
        self.filename == name || self.fullname.as_deref() == Some(name)
    }
}
