//! Entity references into a [`SymbolStore`](crate::SymbolStore).
//!
//! All cross-references in the symbolic world are these small copyable ids
//! rather than borrows, so the engine can hold on to a symbol across
//! arbitrary store mutation (module loads, psymtab expansion, obsolescence
//! flips). Ids are never reused; removing a module tombstones its slot and
//! leaves the ids of its contents dangling-but-stable, which is exactly what
//! the fix journals need.

use cranelift_entity::entity_impl;

/// An opaque reference to a loaded module (executable, library, or bundle).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);
entity_impl!(ModuleId, "module");

/// An opaque reference to a full symbol table.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymtabId(u32);
entity_impl!(SymtabId, "symtab");

/// An opaque reference to a partial symbol table.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PsymtabId(u32);
entity_impl!(PsymtabId, "psymtab");

/// An opaque reference to a full debug symbol.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);
entity_impl!(SymbolId, "sym");

/// An opaque reference to a minimal (linker-level) symbol.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MinsymId(u32);
entity_impl!(MinsymId, "minsym");
