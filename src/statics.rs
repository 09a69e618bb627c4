//! File-static indirection redirection.
//!
//! When compiled with indirect data references, the new compilation unit
//! reaches its file statics through a table of non-lazy symbol pointers.
//! After the bundle loads, each slot of that table that points into the
//! bundle itself is rewritten to point at the original instance of the
//! datum, so the running program keeps observing exactly one address per
//! datum. The obsolescence flags are inverted to match: the original data
//! symbol becomes authoritative again, the bundle's copy does not.

use crate::error::{FixError, FixResult};
use crate::inferior::Inferior;
use crate::registry::FixInfo;
use crate::target::Target;
use refix_environ::{MinsymId, ModuleId, SymbolId, SymbolStore, GLOBAL_BLOCK, STATIC_BLOCK};

/// Exact name the loader gives the non-lazy symbol pointer section.
pub const NL_SYMBOL_PTR_SECTION: &str = "LC_SEGMENT.__DATA.__nl_symbol_ptr";

/// One slot of the indirection table, with the symbols resolved so far.
#[derive(Clone, Debug)]
struct FileStaticFixup {
    /// Address of the slot itself.
    addr: u64,
    /// The address the slot currently holds.
    value: u64,
    new_sym: Option<SymbolId>,
    new_msym: Option<MinsymId>,
    original_sym: Option<SymbolId>,
    original_msym: Option<MinsymId>,
}

/// Redirect every intra-bundle indirection slot of the just-loaded module
/// back at the original instances.
pub fn redirect_file_statics(
    info: &mut FixInfo,
    store: &mut SymbolStore,
    inferior: &mut dyn Inferior,
    target: &Target,
) -> FixResult<()> {
    let new_module = info
        .most_recent()
        .ok_or_else(|| FixError::Internal("no fix in progress".to_string()))?
        .module;

    let mut entries = find_and_parse_nonlazy_ptr_sect(store, inferior, target, new_module)?;
    if entries.is_empty() {
        return Ok(());
    }

    find_new_static_symbols(store, new_module, &mut entries);
    find_orig_static_symbols(info, store, &mut entries)?;
    redirect_statics(store, inferior, target, &entries)
}

/// Locate and read the indirection table. Only slots whose current value
/// points inside the new module itself are interesting; the rest already
/// point where they should.
fn find_and_parse_nonlazy_ptr_sect(
    store: &SymbolStore,
    inferior: &mut dyn Inferior,
    target: &Target,
    new_module: ModuleId,
) -> FixResult<Vec<FileStaticFixup>> {
    let module = store
        .module(new_module)
        .ok_or_else(|| FixError::Internal("new module vanished".to_string()))?;
    let Some(section) = module
        .sections
        .iter()
        .find(|s| s.name == NL_SYMBOL_PTR_SECTION)
    else {
        return Ok(Vec::new());
    };
    let (start, size) = (section.addr, section.size);
    if size == 0 {
        return Ok(Vec::new());
    }

    let ptr = target.pointer_bytes as u64;
    if size % ptr != 0 {
        return Err(FixError::CorruptSection);
    }
    let count = (size / ptr) as usize;

    let mut buf = vec![0; size as usize];
    inferior.read_memory(start, &mut buf)?;

    let mut entries = Vec::new();
    for i in 0..count {
        let bytes = &buf[i * ptr as usize..(i + 1) * ptr as usize];
        let destination = target.read_uint(bytes);
        if destination == 0 || store.find_pc_section_module(destination) != Some(new_module) {
            continue;
        }
        entries.push(FileStaticFixup {
            addr: start + i as u64 * ptr,
            value: destination,
            new_sym: None,
            new_msym: None,
            original_sym: None,
            original_msym: None,
        });
    }
    Ok(entries)
}

/// Resolve each slot's target to a static-class symbol of the new module:
/// the static block first, then the global block.
fn find_new_static_symbols(
    store: &SymbolStore,
    new_module: ModuleId,
    entries: &mut [FileStaticFixup],
) {
    for entry in entries.iter_mut() {
        for st in store.module_symtabs(new_module, false) {
            if !store.symtab(st).primary {
                continue;
            }
            let found = store
                .find_static_by_address(st, STATIC_BLOCK, entry.value)
                .or_else(|| store.find_static_by_address(st, GLOBAL_BLOCK, entry.value));
            if let Some(sym) = found {
                entry.new_sym = Some(sym);
                entry.new_msym = store
                    .lookup_minimal_symbol(&store.symbol(sym).linkage_name, Some(new_module));
                break;
            }
        }
    }
}

/// Resolve each new symbol to its original: the original symtab's static
/// block, then its global block, then the coalesced-symbol search across
/// the whole original module.
fn find_orig_static_symbols(
    info: &FixInfo,
    store: &mut SymbolStore,
    entries: &mut [FileStaticFixup],
) -> FixResult<()> {
    let original_module = info.original_module(store)?;
    let original_symtab = info.original_symtab(store)?;

    for entry in entries.iter_mut() {
        let Some(new_id) = entry.new_sym else {
            continue;
        };
        let (source, linkage, namespace) = {
            let sym = store.symbol(new_id);
            (
                sym.source_name.clone(),
                sym.linkage_name.clone(),
                sym.namespace,
            )
        };

        let mut orig = store
            .lookup_block_symbol(original_symtab, STATIC_BLOCK, &source, &linkage, namespace)
            .or_else(|| {
                store.lookup_block_symbol(
                    original_symtab,
                    GLOBAL_BLOCK,
                    &source,
                    &linkage,
                    namespace,
                )
            });
        if orig.is_none() {
            orig = store.search_for_coalesced_symbol(original_module, &linkage, namespace);
        }

        if let Some(orig_id) = orig {
            entry.original_sym = Some(orig_id);
            entry.original_msym = store
                .lookup_minimal_symbol(&store.symbol(orig_id).linkage_name, Some(original_module));
            if entry.original_msym.is_none() {
                log::debug!("unable to find original msym for {linkage}");
            }
        }
    }
    Ok(())
}

/// Rewrite the resolved slots and invert obsolescence. Slots with either
/// side unresolved are skipped; the surrounding debugger cannot
/// disambiguate them, and a wrong redirection is worse than none.
fn redirect_statics(
    store: &mut SymbolStore,
    inferior: &mut dyn Inferior,
    target: &Target,
    entries: &[FileStaticFixup],
) -> FixResult<()> {
    for (i, entry) in entries.iter().enumerate() {
        if entry.addr == 0 {
            log::debug!("static entry addr for file static #{i} was zero");
        }
        if entry.value == 0 {
            log::debug!("destination addr for file static #{i} was zero");
        }
        if entry.new_sym.is_none() {
            log::debug!("could not find new symbol for static #{i}");
        }
        if entry.new_msym.is_none() {
            log::debug!("could not find new msymbol for static #{i}");
        }
        if entry.original_sym.is_none() {
            log::debug!("could not find original symbol for static #{i}");
        }
        if entry.original_msym.is_none() {
            log::debug!("could not find original msymbol for static #{i}");
        }

        let (Some(new_sym), Some(new_msym), Some(orig_sym), Some(orig_msym)) = (
            entry.new_sym,
            entry.new_msym,
            entry.original_sym,
            entry.original_msym,
        ) else {
            continue;
        };
        if entry.addr == 0 || entry.value == 0 {
            continue;
        }

        let original_addr = store.symbol(orig_sym).address;
        let buf = target.pointer_bytes_of(original_addr);
        inferior.write_memory(entry.addr, &buf)?;

        store.symbol_mut(orig_sym).obsolete = false;
        store.minsym_mut(orig_msym).obsolete = false;
        store.symbol_mut(new_sym).obsolete = true;
        store.minsym_mut(new_msym).obsolete = true;

        log::debug!(
            "redirected file static {} from {:#x} to {original_addr:#x}",
            store.symbol(orig_sym).source_name,
            store.symbol(new_sym).address,
        );
    }
    Ok(())
}
