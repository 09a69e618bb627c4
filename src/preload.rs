//! Symbol-only pre-load of a candidate bundle.
//!
//! Before the dynamic linker touches anything, the bundle is read as a
//! symbol-only module, its psymtabs for the fixed source are expanded, the
//! stack snapshot is taken, and the restriction checks run against it. The
//! pre-load module is removed again on every exit path; nothing of it may
//! survive into the real load.

use crate::error::{FixError, FixResult};
use crate::inferior::Inferior;
use crate::registry::FixInfo;
use crate::restrict;
use crate::stacks::snapshot_active_threads;
use refix_environ::{ModuleId, SymbolReader, SymbolStore};

/// Pre-load the bundle named by `info`, validate it, and discard it.
pub fn pre_load_and_check(
    info: &mut FixInfo,
    store: &mut SymbolStore,
    inferior: &mut dyn Inferior,
    reader: &mut dyn SymbolReader,
) -> FixResult<()> {
    let data = reader.read(&info.bundle_filename).map_err(|err| {
        FixError::NotFound(format!(
            "Unable to read bundle '{}': {err}",
            info.bundle_filename
        ))
    })?;

    let preload = store.add_module(data);
    let result = check_preloaded(info, store, inferior, preload);
    // Whether validation passed or not, the symbol-only module goes away.
    store.remove_module(preload);
    result
}

fn check_preloaded(
    info: &mut FixInfo,
    store: &mut SymbolStore,
    inferior: &mut dyn Inferior,
    preload: ModuleId,
) -> FixResult<()> {
    force_psymtab_expansion(store, preload, &info.src_filename, Some(&info.src_basename));

    info.active_threads = snapshot_active_threads(store, inferior, &info.src_filename);

    restrict::do_pre_load_checks(info, store, preload)
}

/// Expand the psymtabs of `module` that look like they describe the named
/// source file, by recorded name or by the alternate (base) name. Expanding
/// too many is harmless; expanding none would lose the unit under check.
pub fn force_psymtab_expansion(
    store: &mut SymbolStore,
    module: ModuleId,
    source_fn: &str,
    alt_source_fn: Option<&str>,
) {
    for pid in store.module_psymtabs(module, true) {
        let ps = store.psymtab(pid);
        let matches = ps.matches_source(source_fn)
            || alt_source_fn.is_some_and(|alt| ps.matches_source(alt));
        if matches {
            store.expand_psymtab(pid);
        }
    }
}
