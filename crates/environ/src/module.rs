//! Loaded modules and their sections.

use crate::entities::{MinsymId, PsymtabId, SymtabId};

/// One mapped section of a module, identified by the loader's section name.
#[derive(Clone, Debug)]
pub struct Section {
    pub name: String,
    pub addr: u64,
    pub size: u64,
}

impl Section {
    pub fn contains(&self, addr: u64) -> bool {
        self.addr <= addr && addr < self.addr + self.size
    }
}

/// A module the debugger knows about: the executable, a shared library, or
/// a loaded fix bundle.
#[derive(Clone, Debug)]
pub struct Module {
    /// Path of the module on disk, as the dynamic linker reports it.
    pub path: String,
    pub sections: Vec<Section>,
    pub symtabs: Vec<SymtabId>,
    pub psymtabs: Vec<PsymtabId>,
    pub minsyms: Vec<MinsymId>,
}

impl Module {
    /// Find the section containing `addr`, if any.
    pub fn section_for(&self, addr: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains(addr))
    }
}
