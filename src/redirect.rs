//! Function redirection: splicing trampolines over replaced entry points.
//!
//! Every function defined by the new module that also resolves in the
//! original module (or in a previous fix of the same source) gets the
//! ISA trampoline written over its old entry. The walk collects all
//! redirection pairs first, then validates every target (the old function
//! must hold the whole trampoline, and no snapshot thread may be stopped
//! inside the bytes about to be rewritten), and only then writes — so a
//! rejected fix has mutated nothing.

use crate::error::{FixError, FixResult};
use crate::inferior::Inferior;
use crate::isa::PatchIsa;
use crate::registry::{FixInfo, FixedDatum, ObsoletedSym};
use crate::statics;
use crate::target::Target;
use refix_environ::{
    ModuleId, Namespace, SymbolClass, SymbolId, SymbolStore, GLOBAL_BLOCK, STATIC_BLOCK,
};
use smallvec::SmallVec;

/// One planned entry-point rewrite.
struct Redirect {
    new_sym: SymbolId,
    old_sym: SymbolId,
}

/// Read-old, write-new, journal. The journal records the write even though
/// nothing replays it; a half-written trampoline after a failed write is
/// visible in the journal.
pub(crate) fn update_datum(
    info: &mut FixInfo,
    inferior: &mut dyn Inferior,
    addr: u64,
    new: &[u8],
) -> FixResult<()> {
    debug_assert!(new.len() <= 8);
    let mut old: SmallVec<[u8; 8]> = SmallVec::from_elem(0, new.len());
    inferior.read_memory(addr, &mut old)?;
    if inferior.write_memory(addr, new).is_err() {
        return Err(FixError::Io("Can't redirect function".to_string()));
    }
    let journal = info
        .most_recent_mut()
        .ok_or_else(|| FixError::Internal("no fix in progress to journal against".to_string()))?;
    journal.datums.push(FixedDatum {
        addr,
        size: new.len(),
        old,
        new: SmallVec::from_slice(new),
    });
    Ok(())
}

/// Write the trampoline sequence at `fixup_addr`, vectoring to `dest`.
/// Exactly `isa.trampoline_size()` bytes are written, one word at a time,
/// each journaled; a failed write aborts with the earlier words already
/// journaled (no rollback).
pub(crate) fn write_trampoline(
    info: &mut FixInfo,
    inferior: &mut dyn Inferior,
    isa: &dyn PatchIsa,
    target: &Target,
    fixup_addr: u64,
    dest: u64,
) -> FixResult<()> {
    for (i, word) in isa.trampoline_words(dest).into_iter().enumerate() {
        let mut buf = [0; 4];
        target.write_uint(&mut buf, u64::from(word));
        update_datum(info, inferior, fixup_addr + i as u64 * 4, &buf)?;
    }
    Ok(())
}

/// The modules whose old definitions need redirecting: the original, plus
/// every previous fix of this source.
fn modules_to_update(info: &FixInfo, store: &SymbolStore) -> FixResult<Vec<ModuleId>> {
    let mut out = vec![info.original_module(store)?];
    for (i, fo) in info.fixed_objects.iter().enumerate() {
        if Some(i) == info.most_recent_fix {
            continue;
        }
        out.push(fo.module);
    }
    Ok(out)
}

/// Splice every replaced function, then redirect the new module's file
/// statics back at the originals.
pub fn do_final_fix_fixups(
    info: &mut FixInfo,
    store: &mut SymbolStore,
    inferior: &mut dyn Inferior,
    isa: &dyn PatchIsa,
    target: &Target,
) -> FixResult<()> {
    let new_module = info
        .most_recent()
        .ok_or_else(|| FixError::Internal("no fix in progress".to_string()))?
        .module;

    let mut redirects = Vec::new();
    for old_module in modules_to_update(info, store)? {
        for newst in store.module_symtabs(new_module, true) {
            // Code-less mirror symtabs borrow a codeful symtab's blocks;
            // scan only the primary one.
            if !store.symtab(newst).primary {
                continue;
            }
            collect_global_redirects(store, newst, old_module, &mut redirects);
            collect_static_redirects(store, newst, old_module, &mut redirects)?;
        }
    }

    preflight_redirects(info, store, isa, &redirects)?;

    for r in &redirects {
        redirect_old_function(info, store, inferior, isa, target, r)?;
    }

    statics::redirect_file_statics(info, store, inferior, target)
}

fn collect_global_redirects(
    store: &SymbolStore,
    newst: refix_environ::SymtabId,
    old_module: ModuleId,
    redirects: &mut Vec<Redirect>,
) {
    let old_symtabs = store.module_symtabs(old_module, true);
    for &new_id in &store.symtab(newst).blocks[GLOBAL_BLOCK].symbols {
        let newsym = store.symbol(new_id);
        if newsym.class == SymbolClass::Typedef || !newsym.is_function() {
            continue;
        }
        let old_id = old_symtabs.iter().find_map(|&ost| {
            if !store.symtab(ost).primary {
                return None;
            }
            store.lookup_block_symbol(
                ost,
                GLOBAL_BLOCK,
                &newsym.source_name,
                &newsym.linkage_name,
                Namespace::Var,
            )
        });
        if let Some(old_sym) = old_id {
            redirects.push(Redirect {
                new_sym: new_id,
                old_sym,
            });
        }
    }
}

fn collect_static_redirects(
    store: &mut SymbolStore,
    newst: refix_environ::SymtabId,
    old_module: ModuleId,
    redirects: &mut Vec<Redirect>,
) -> FixResult<()> {
    for new_id in store.symtab(newst).blocks[STATIC_BLOCK].symbols.clone() {
        let newsym = store.symbol(new_id);
        if newsym.class == SymbolClass::Typedef || !newsym.is_function() {
            continue;
        }
        let source = newsym.source_name.clone();
        let linkage = newsym.linkage_name.clone();

        let mut old_id = store.module_symtabs(old_module, true).into_iter().find_map(|ost| {
            if !store.symtab(ost).primary {
                return None;
            }
            store.lookup_block_symbol(ost, STATIC_BLOCK, &source, &linkage, Namespace::Var)
        });

        // Maybe this static was coalesced into some arbitrary symtab.
        if old_id.is_none() {
            old_id = store.search_for_coalesced_symbol(old_module, &linkage, Namespace::Var);
            if old_id == Some(new_id) {
                old_id = None;
            }
        }

        if let Some(old_sym) = old_id {
            redirects.push(Redirect {
                new_sym: new_id,
                old_sym,
            });
        }
    }
    Ok(())
}

/// Validate every planned rewrite before the first byte is written.
fn preflight_redirects(
    info: &FixInfo,
    store: &SymbolStore,
    isa: &dyn PatchIsa,
    redirects: &[Redirect],
) -> FixResult<()> {
    let size = isa.trampoline_size() as u64;
    for r in redirects {
        let old = store.symbol(r.old_sym);
        let block = old
            .block
            .map(|b| &store.symtab(old.symtab).blocks[b])
            .ok_or_else(|| {
                FixError::Internal(format!(
                    "function '{}' has no code extent",
                    old.source_name
                ))
            })?;
        if block.end.saturating_sub(block.start) < size {
            return Err(FixError::Restriction(format!(
                "Function '{}' is too small ({} bytes) to hold the {size}-byte \
                 redirection trampoline.",
                old.source_name,
                block.end.saturating_sub(block.start),
            )));
        }
        for thread in &info.active_threads {
            for func in &thread.funcs {
                let pc = func.frame.pc;
                if pc >= block.start && pc < block.start + size {
                    return Err(FixError::Restriction(format!(
                        "Thread {} is stopped at {pc:#x}, inside the code that fixing \
                         function '{}' would rewrite.",
                        thread.thread, old.source_name,
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Rewrite one old entry point and flip the obsolescence bookkeeping.
fn redirect_old_function(
    info: &mut FixInfo,
    store: &mut SymbolStore,
    inferior: &mut dyn Inferior,
    isa: &dyn PatchIsa,
    target: &Target,
    r: &Redirect,
) -> FixResult<()> {
    let old = store.symbol(r.old_sym);
    let old_block = old.block.map(|b| &store.symtab(old.symtab).blocks[b]);
    let old_start = old_block.map(|b| b.start).unwrap_or(old.address);

    let new = store.symbol(r.new_sym);
    let new_block = new.block.map(|b| &store.symtab(new.symtab).blocks[b]);
    let new_start = new_block.map(|b| b.start).unwrap_or(new.address);

    log::debug!(
        "fixed up {} (newaddr {new_start:#x}, oldaddr {old_start:#x})",
        new.source_name
    );

    write_trampoline(info, inferior, isa, target, old_start, new_start)?;

    store.symbol_mut(r.old_sym).obsolete = true;
    let old_minsym = store.lookup_minimal_symbol_by_pc(old_start);
    if let Some(ms) = old_minsym {
        store.minsym_mut(ms).obsolete = true;
    }
    let new_minsym = store.lookup_minimal_symbol_by_pc(new_start);

    let journal = info
        .most_recent_mut()
        .ok_or_else(|| FixError::Internal("no fix in progress to journal against".to_string()))?;
    journal.obsoleted.push(ObsoletedSym {
        old_sym: r.old_sym,
        new_sym: r.new_sym,
        old_minsym,
        new_minsym,
    });
    Ok(())
}
