//! Per-source fix bookkeeping.
//!
//! One [`FixInfo`] exists for every source file ever fixed in this session,
//! keyed by its canonical path and kept in request order. Each successful
//! load appends a [`FixedObj`] journaling what was written to the inferior
//! and which symbols changed obsolescence. The journals document the
//! mutation; nothing replays them.

use crate::error::{FixError, FixResult};
use crate::stacks::ActiveThread;
use indexmap::IndexMap;
use refix_environ::{
    basename, MinsymId, ModuleId, PsymtabId, SymbolId, SymbolStore, SymtabId,
};
use smallvec::SmallVec;

/// A journaled write to inferior memory: at most eight bytes, with the old
/// and new contents.
#[derive(Clone, Debug)]
pub struct FixedDatum {
    pub addr: u64,
    pub size: usize,
    pub old: SmallVec<[u8; 8]>,
    pub new: SmallVec<[u8; 8]>,
}

/// A pair of symbols whose obsolescence flags were flipped by a fix.
#[derive(Copy, Clone, Debug)]
pub struct ObsoletedSym {
    pub old_sym: SymbolId,
    pub new_sym: SymbolId,
    pub old_minsym: Option<MinsymId>,
    pub new_minsym: Option<MinsymId>,
}

/// One loaded fix bundle.
#[derive(Clone, Debug)]
pub struct FixedObj {
    /// The bundle's module as registered in the symbol store.
    pub module: ModuleId,
    pub bundle_filename: String,
    pub datums: Vec<FixedDatum>,
    pub obsoleted: Vec<ObsoletedSym>,
}

impl FixedObj {
    pub fn new(module: ModuleId, bundle_filename: impl Into<String>) -> FixedObj {
        FixedObj {
            module,
            bundle_filename: bundle_filename.into(),
            datums: Vec::new(),
            obsoleted: Vec::new(),
        }
    }
}

/// Everything known about fixing one source file. Created lazily on the
/// first fix of a source and never destroyed once complete.
#[derive(Clone, Debug)]
pub struct FixInfo {
    /// Canonical source path, and its final path component.
    pub src_filename: String,
    pub src_basename: String,
    /// The most recently seen bundle for this source.
    pub bundle_filename: String,
    pub bundle_basename: String,
    /// The `.o` path, supplied only for ZeroLink targets.
    pub object_filename: Option<String>,
    /// Path of the module in the live process that first owned this source.
    pub original_objfile_filename: Option<String>,
    /// The spelling of the source name the original's psymtabs use: either
    /// the full path or the basename, whichever matched.
    pub canonical_source_filename: Option<String>,
    /// Every bundle loaded for this source, oldest first.
    pub fixed_objects: Vec<FixedObj>,
    /// Index of the bundle loaded by the current (or last) request.
    pub most_recent_fix: Option<usize>,
    /// Stack snapshot for the request in flight; cleared when it completes.
    pub active_threads: Vec<ActiveThread>,
    /// A record is incomplete until its first load succeeds; an incomplete
    /// record is discarded on the request's error path.
    pub complete: bool,
}

impl FixInfo {
    fn new(src_filename: &str) -> FixInfo {
        FixInfo {
            src_filename: src_filename.to_string(),
            src_basename: basename(src_filename).to_string(),
            bundle_filename: String::new(),
            bundle_basename: String::new(),
            object_filename: None,
            original_objfile_filename: None,
            canonical_source_filename: None,
            fixed_objects: Vec::new(),
            most_recent_fix: None,
            active_threads: Vec::new(),
            complete: false,
        }
    }

    pub fn most_recent(&self) -> Option<&FixedObj> {
        self.most_recent_fix.map(|i| &self.fixed_objects[i])
    }

    pub fn most_recent_mut(&mut self) -> Option<&mut FixedObj> {
        self.most_recent_fix.map(|i| &mut self.fixed_objects[i])
    }

    /// The module that originally defined this source.
    pub fn original_module(&self, store: &SymbolStore) -> FixResult<ModuleId> {
        let name = self.original_objfile_filename.as_deref().ok_or_else(|| {
            FixError::Internal("original object file not yet identified".to_string())
        })?;
        store.find_module_by_name(name).ok_or_else(|| {
            FixError::NotFound(format!("Unable to find original object file '{name}'!"))
        })
    }

    /// The original's partial symtab for this source.
    pub fn original_psymtab(&self, store: &SymbolStore) -> FixResult<PsymtabId> {
        let module = self.original_module(store)?;
        let canonical = self.canonical_source_filename.as_deref().ok_or_else(|| {
            FixError::Internal("canonical source filename not yet identified".to_string())
        })?;
        store
            .module_psymtabs(module, true)
            .into_iter()
            .find(|&ps| store.psymtab(ps).matches_source(canonical))
            .ok_or_else(|| {
                FixError::NotFound(format!(
                    "Unable to find original source file '{canonical}'!  \
                     Target compiled without debug information?"
                ))
            })
    }

    /// The original's full symtab for this source, expanding on demand.
    pub fn original_symtab(&self, store: &mut SymbolStore) -> FixResult<SymtabId> {
        let ps = self.original_psymtab(store)?;
        Ok(store.expand_psymtab(ps))
    }
}

/// The session-wide registry of fixed sources.
#[derive(Default)]
pub struct FixRegistry {
    entries: IndexMap<String, FixInfo>,
}

impl FixRegistry {
    pub fn new() -> FixRegistry {
        FixRegistry::default()
    }

    /// The record for `src_filename`, creating a fresh incomplete one if
    /// this source has never been fixed. The caller owns discarding the
    /// fresh record if the request fails before its first load.
    pub fn get_or_create(&mut self, src_filename: &str) -> &mut FixInfo {
        self.entries
            .entry(src_filename.to_string())
            .or_insert_with(|| FixInfo::new(src_filename))
    }

    /// Drop the record for `src_filename` if it never completed. Run on the
    /// error path of every request so half-finished records cannot outlive
    /// the request that created them.
    pub fn discard_incomplete(&mut self, src_filename: &str) {
        if self
            .entries
            .get(src_filename)
            .is_some_and(|info| !info.complete)
        {
            self.entries.shift_remove(src_filename);
        }
    }

    pub fn get(&self, src_filename: &str) -> Option<&FixInfo> {
        self.entries.get(src_filename)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
