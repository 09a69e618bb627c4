//! The fix session: process-wide state plus the request pipeline.
//!
//! A [`Session`] owns the symbol store, the per-source fix registry, the
//! target description, and the ISA codec. One call to [`Session::fix`] runs
//! the whole pipeline, strictly in order: canonicalize identity, find the
//! original module, the ZeroLink pre-hint, symbol-only pre-load plus
//! restriction checks, the real load, obsolescence of prior fixes, function
//! splicing, static redirection, and the report. The inferior must be
//! stopped for the duration.

use crate::error::{FixError, FixResult};
use crate::inferior::Inferior;
use crate::isa::{self, LookupError, PatchIsa};
use crate::loader;
use crate::obsolete;
use crate::preload;
use crate::redirect;
use crate::registry::{FixInfo, FixRegistry};
use crate::report::{self, FixOutcome};
use crate::target::Target;
use refix_environ::{basename, SymbolReader, SymbolStore};
use target_lexicon::Triple;

/// One parsed fix request. Paths arrive tilde-expanded, and the bundle path
/// resolved, by the command layer.
#[derive(Clone, Debug)]
pub struct FixRequest {
    pub bundle_filename: String,
    pub source_filename: String,
    pub object_filename: Option<String>,
}

/// Process-wide fix-and-continue state for one debugged program.
pub struct Session {
    store: SymbolStore,
    registry: FixRegistry,
    isa: Box<dyn PatchIsa>,
    target: Target,
    reader: Box<dyn SymbolReader>,
}

impl Session {
    /// Create a session for a target triple. Fails when the triple's ISA has
    /// no trampoline support.
    pub fn new(triple: &Triple, reader: Box<dyn SymbolReader>) -> Result<Session, LookupError> {
        let isa = isa::lookup(triple)?;
        let target = Target::from_triple(triple).ok_or(LookupError::Unsupported)?;
        Ok(Session {
            store: SymbolStore::new(),
            registry: FixRegistry::new(),
            isa,
            target,
            reader,
        })
    }

    pub fn store(&self) -> &SymbolStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SymbolStore {
        &mut self.store
    }

    pub fn registry(&self) -> &FixRegistry {
        &self.registry
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn isa(&self) -> &dyn PatchIsa {
        &*self.isa
    }

    /// Run one complete fix request against the stopped inferior.
    pub fn fix(&mut self, inferior: &mut dyn Inferior, request: &FixRequest) -> FixResult<FixOutcome> {
        if self
            .store
            .find_module_by_name(&request.bundle_filename)
            .is_some()
        {
            return Err(FixError::AlreadyLoaded(request.bundle_filename.clone()));
        }

        let result = run_pipeline(
            &mut self.store,
            &mut self.registry,
            &*self.isa,
            &self.target,
            &mut *self.reader,
            inferior,
            request,
        );
        if result.is_err() {
            // A record created by this request and never completed must not
            // outlive it.
            self.registry.discard_incomplete(&request.source_filename);
        }
        result
    }

    /// Is the code at `pc` a fix trampoline? Returns its destination if so.
    pub fn trampoline_target(&self, inferior: &mut dyn Inferior, pc: u64) -> Option<u64> {
        let mut buf = vec![0; self.isa.trampoline_size()];
        inferior.read_memory(pc, &mut buf).ok()?;
        self.isa.decode_trampoline(&buf, &self.target)
    }

    /// See [`report::update_picbase_register`].
    pub fn update_picbase_register(
        &self,
        inferior: &mut dyn Inferior,
        new_fun: refix_environ::SymbolId,
        thread: crate::inferior::ThreadId,
    ) -> FixResult<()> {
        report::update_picbase_register(
            &self.store,
            inferior,
            &*self.isa,
            &self.target,
            new_fun,
            thread,
        )
    }
}

fn run_pipeline(
    store: &mut SymbolStore,
    registry: &mut FixRegistry,
    isa: &dyn PatchIsa,
    target: &Target,
    reader: &mut dyn SymbolReader,
    inferior: &mut dyn Inferior,
    request: &FixRequest,
) -> FixResult<FixOutcome> {
    let info = registry.get_or_create(&request.source_filename);
    info.bundle_filename = request.bundle_filename.clone();
    info.bundle_basename = basename(&request.bundle_filename).to_string();
    info.object_filename = request.object_filename.clone();

    find_original_object_file_name(info, store)?;

    loader::tell_zerolink(info, store, inferior)?;

    preload::pre_load_and_check(info, store, inferior, reader)?;

    loader::get_fixed_file(info, store, inferior, target)?;

    obsolete::mark_previous_fixes_obsolete(info, store)?;

    redirect::do_final_fix_fixups(info, store, inferior, isa, target)?;

    let outcome = report::build_outcome(info);
    // The snapshot is only meaningful for the request that took it.
    info.active_threads.clear();
    Ok(outcome)
}

/// Identify the module in the live process that originally owned this
/// source, and which spelling of the source name its psymtabs use. A
/// full-path match anywhere beats any basename match; within each pass the
/// first match wins. Empty psymtabs and the bundle itself never match.
fn find_original_object_file_name(info: &mut FixInfo, store: &mut SymbolStore) -> FixResult<()> {
    if info.original_objfile_filename.is_some() && info.canonical_source_filename.is_some() {
        return Ok(());
    }

    let passes = [info.src_filename.clone(), info.src_basename.clone()];
    for pass in passes {
        let mut matched = None;
        for pid in store.all_psymtabs() {
            let ps = store.psymtab(pid);
            if !ps.matches_source(&pass) || ps.texthigh == 0 {
                continue;
            }
            let Some(module) = store.module(ps.module) else {
                continue;
            };
            if module.path == info.bundle_filename {
                continue;
            }
            matched = Some((pid, module.path.clone()));
            break;
        }
        if let Some((pid, module_path)) = matched {
            store.expand_psymtab(pid);
            info.original_objfile_filename = Some(module_path);
            info.canonical_source_filename = Some(pass);
            return Ok(());
        }
    }

    Err(FixError::NotFound(format!(
        "Unable to find original source file {}.  Target built without debugging symbols?",
        info.src_basename
    )))
}
