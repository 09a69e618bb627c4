//! Symbols and minimal symbols.

use crate::entities::{ModuleId, SymtabId};

/// The namespace a symbol's name lives in. Data and functions share the
/// variable namespace; Objective-C methods get their own; type names are
/// kept apart so a struct and a variable of the same name can coexist.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Namespace {
    Var,
    Struct,
    Methods,
}

/// Storage class of a symbol, the subset the fix engine cares about.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SymbolClass {
    /// File-scope or exported data at a fixed address.
    Static,
    /// Data reached through an indirection slot.
    Indirect,
    /// Per-thread static data.
    ThreadLocalStatic,
    /// A compile-time constant; has no runtime storage.
    Const,
    /// A type definition.
    Typedef,
    /// A formal parameter of a function.
    Arg,
    /// A local variable of a function.
    Local,
    /// A function; its code extent lives on its block.
    Function,
}

/// What kind of type a symbol has. `Error` and `Undef` mark types the
/// debugger could not resolve when the owning module was read.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TypeCode {
    Function,
    Error,
    Undef,
    Other,
}

/// A symbol's type: the code used for category checks plus the printed form
/// used for the textual invariants. For a function, `display` is the return
/// type's printed form.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SymType {
    pub code: TypeCode,
    pub display: String,
}

impl SymType {
    pub fn new(code: TypeCode, display: impl Into<String>) -> Self {
        SymType {
            code,
            display: display.into(),
        }
    }

    /// True when the type could not be resolved at module-read time.
    pub fn is_unresolvable(&self) -> bool {
        matches!(self.code, TypeCode::Error | TypeCode::Undef)
    }
}

/// A full debug symbol, owned by one symtab.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub symtab: SymtabId,
    /// The name as written in the source.
    pub source_name: String,
    /// The name the linker saw (mangled for C++).
    pub linkage_name: String,
    pub namespace: Namespace,
    pub class: SymbolClass,
    pub ty: SymType,
    /// Value address for data symbols; entry point for functions.
    pub address: u64,
    /// For a function symbol, the index of its block in the owning symtab's
    /// block vector.
    pub block: Option<usize>,
    pub obsolete: bool,
}

impl Symbol {
    pub fn is_function(&self) -> bool {
        self.ty.code == TypeCode::Function
    }

    /// Does `name` match either the source or the linkage spelling?
    pub fn matches_name(&self, name: &str) -> bool {
        self.source_name == name || self.linkage_name == name
    }
}

/// A minimal symbol: the linker-level (name, address) pair kept for every
/// module regardless of debug info.
#[derive(Clone, Debug)]
pub struct MinimalSymbol {
    pub module: ModuleId,
    pub name: String,
    pub address: u64,
    pub obsolete: bool,
}
