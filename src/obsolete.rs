//! Obsolescence bookkeeping.
//!
//! After a new bundle loads (and before it gets its trampolines), every
//! previously loaded fix of the same source is flagged obsolete wholesale:
//! minimal symbols, symbols, symtabs, partial symtabs. The original's symtab
//! and psymtab are flagged too; the new module is canonical from now on.
//! Obsolete state is kept, not deleted: backtraces through superseded code
//! still need it.

use crate::error::FixResult;
use crate::registry::FixInfo;
use refix_environ::SymbolStore;

/// Flag every prior fix of this source, and the original compilation unit,
/// as obsolete. Must run after the new load succeeds; a failed load leaves
/// obsolescence untouched.
pub fn mark_previous_fixes_obsolete(info: &mut FixInfo, store: &mut SymbolStore) -> FixResult<()> {
    for (i, fo) in info.fixed_objects.iter().enumerate() {
        // The file just loaded stays live; everything before it goes.
        if Some(i) == info.most_recent_fix {
            continue;
        }
        if store.module(fo.module).is_none() {
            log::warn!(
                "fixed object file entry for '{}' has a stale module reference!  \
                 Will try continuing",
                fo.bundle_filename
            );
            continue;
        }

        for ms in store.module_minsyms(fo.module) {
            store.minsym_mut(ms).obsolete = true;
        }

        for st in store.module_symtabs(fo.module, true) {
            if store.symtab(st).primary {
                let ids: Vec<_> = store
                    .symtab(st)
                    .blocks
                    .iter()
                    .flat_map(|b| b.symbols.iter().copied())
                    .collect();
                for sym in ids {
                    store.symbol_mut(sym).obsolete = true;
                }
            }
            store.symtab_mut(st).obsolete = true;
        }

        for ps in store.module_psymtabs(fo.module, true) {
            store.psymtab_mut(ps).obsolete = true;
        }
    }

    let original_psymtab = info.original_psymtab(store)?;
    store.psymtab_mut(original_psymtab).obsolete = true;
    let original_symtab = info.original_symtab(store)?;
    store.symtab_mut(original_symtab).obsolete = true;
    Ok(())
}
