//! Restriction checks: can this bundle be spliced into the running program?
//!
//! Four checks, each fatal on violation, all run against the symbol-only
//! pre-load before any inferior mutation: global invariants, file-static
//! invariants, per-function signature invariants (stricter while the
//! function is on some stack), and the C++/ZeroLink coupling.

use crate::error::{FixError, FixResult};
use crate::loader;
use crate::registry::FixInfo;
use crate::stacks::in_active_func;
use refix_environ::{
    ModuleId, Namespace, SymbolClass, SymbolStore, SymtabId, FIRST_LOCAL_BLOCK, GLOBAL_BLOCK,
    STATIC_BLOCK,
};

/// Run all restriction checks for the pre-loaded candidate `new_module`.
///
/// By the time this runs, the original module and canonical source name have
/// been identified, the stack snapshot exists, and the relevant psymtabs of
/// both the original and the candidate are expanded.
pub fn do_pre_load_checks(
    info: &FixInfo,
    store: &mut SymbolStore,
    new_module: ModuleId,
) -> FixResult<()> {
    if info.original_objfile_filename.is_none() || info.canonical_source_filename.is_none() {
        return Err(FixError::Internal(
            "pre-load checks: original objfile or canonical source filename not set".to_string(),
        ));
    }
    if info.src_filename.is_empty() || info.bundle_filename.is_empty() {
        return Err(FixError::Internal(
            "pre-load checks: source or bundle filename not set".to_string(),
        ));
    }

    check_restrictions_globals(info, store, new_module)?;
    check_restrictions_statics(info, store, new_module)?;
    check_restrictions_locals(info, store, new_module)?;
    check_restriction_cxx_zerolink(store, new_module)
}

fn check_restrictions_globals(
    info: &FixInfo,
    store: &SymbolStore,
    new_module: ModuleId,
) -> FixResult<()> {
    let old_module = info.original_module(store)?;
    let old_symtabs = store.module_symtabs(old_module, true);

    for newst in store.module_symtabs(new_module, true) {
        if !store.symtab(newst).primary {
            continue;
        }
        for &new_id in &store.symtab(newst).blocks[GLOBAL_BLOCK].symbols {
            let newsym = store.symbol(new_id);
            if newsym.class == SymbolClass::Typedef {
                continue;
            }

            let oldsym = old_symtabs.iter().find_map(|&ost| {
                store.lookup_block_symbol(
                    ost,
                    GLOBAL_BLOCK,
                    &newsym.source_name,
                    &newsym.linkage_name,
                    Namespace::Var,
                )
            });
            // A brand-new global is permitted.
            let Some(old_id) = oldsym else {
                continue;
            };
            let oldsym = store.symbol(old_id);

            match (oldsym.is_function(), newsym.is_function()) {
                (true, false) => {
                    return Err(FixError::Restriction(format!(
                        "Changing function '{}' to a variable is not supported.",
                        oldsym.source_name
                    )));
                }
                (false, true) => {
                    return Err(FixError::Restriction(format!(
                        "Changing variable '{}' to a function is not supported.",
                        oldsym.source_name
                    )));
                }
                // Function replacement happens later, in the redirector.
                (true, true) => continue,
                (false, false) => {
                    if oldsym.ty.display != newsym.ty.display {
                        return Err(FixError::Restriction(format!(
                            "Changing the type of global variable '{}' from '{}' to '{}' \
                             is not supported.",
                            oldsym.source_name, oldsym.ty.display, newsym.ty.display
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

fn check_restrictions_statics(
    info: &FixInfo,
    store: &mut SymbolStore,
    new_module: ModuleId,
) -> FixResult<()> {
    let old_module = info.original_module(store)?;

    for newst in store.module_symtabs(new_module, true) {
        if !store.symtab(newst).primary {
            continue;
        }
        for new_id in store.symtab(newst).blocks[STATIC_BLOCK].symbols.clone() {
            let newsym = store.symbol(new_id);
            // Struct-namespace symbols have no checks yet.
            if !matches!(newsym.namespace, Namespace::Var | Namespace::Methods) {
                continue;
            }
            if newsym.class == SymbolClass::Const {
                continue;
            }
            // Static functions are handled by the locals check.
            if newsym.is_function() {
                continue;
            }
            // Objective-C internal labels are not checked.
            if newsym.linkage_name.starts_with("_OBJC_") {
                continue;
            }

            let linkage = newsym.linkage_name.clone();
            let namespace = newsym.namespace;
            let class = newsym.class;

            let mut old_id = store.lookup_symbol_by_linkage(old_module, &linkage, namespace, true);

            // A static missing from the original's symtabs may be a C++
            // coalesced symbol hiding in an unexpanded psymtab. If the wider
            // search finds nothing either, it's a brand-new static: let it
            // pass.
            if old_id.is_none()
                && matches!(
                    class,
                    SymbolClass::Static | SymbolClass::Indirect | SymbolClass::ThreadLocalStatic
                )
            {
                old_id = store.search_for_coalesced_symbol(old_module, &linkage, namespace);
            }
            let Some(old_id) = old_id else {
                continue;
            };

            let oldsym = store.symbol(old_id);
            let newsym = store.symbol(new_id);
            if matches!(oldsym.class, SymbolClass::Const | SymbolClass::Typedef) {
                continue;
            }

            // A type that never resolved when the original was read gets the
            // benefit of the doubt.
            if oldsym.ty.is_unresolvable() {
                log::warn!(
                    "Type code for '{}' unresolvable, skipping type change checks.",
                    oldsym.source_name
                );
                continue;
            }
            if newsym.ty.is_unresolvable() {
                log::warn!(
                    "Type code for '{}' unresolvable, skipping type change checks.",
                    newsym.source_name
                );
                continue;
            }

            if oldsym.ty.display != newsym.ty.display {
                return Err(FixError::Restriction(format!(
                    "Changing the type of file static variable '{}' from '{}' to '{}' \
                     is not supported.",
                    oldsym.source_name, oldsym.ty.display, newsym.ty.display
                )));
            }
        }
    }
    Ok(())
}

fn check_restrictions_locals(
    info: &FixInfo,
    store: &mut SymbolStore,
    new_module: ModuleId,
) -> FixResult<()> {
    let old_module = info.original_module(store)?;

    for newst in store.module_symtabs(new_module, true) {
        if !store.symtab(newst).primary {
            continue;
        }
        for new_block in FIRST_LOCAL_BLOCK..store.symtab(newst).blocks.len() {
            let Some(func_id) = store.symtab(newst).blocks[new_block].function else {
                continue;
            };
            let funcname = store.symbol(func_id).linkage_name.clone();
            let active = in_active_func(&funcname, &info.active_threads);

            let mut found_match = false;
            for ost in store.module_symtabs(old_module, true) {
                if !store.symtab(ost).primary {
                    continue;
                }
                for old_block in FIRST_LOCAL_BLOCK..store.symtab(ost).blocks.len() {
                    let Some(old_func) = store.symtab(ost).blocks[old_block].function else {
                        continue;
                    };
                    if store.symbol(old_func).matches_name(&funcname) {
                        check_restrictions_function(
                            store,
                            &funcname,
                            active,
                            (ost, old_block),
                            (newst, new_block),
                        )?;
                        found_match = true;
                    }
                }
            }

            // The function may have been coalesced into another symtab of
            // the original module.
            if !found_match {
                if let Some(old_id) =
                    store.search_for_coalesced_symbol(old_module, &funcname, Namespace::Var)
                {
                    let old_symtab = store.symbol(old_id).symtab;
                    if let Some(old_block) = store.symbol(old_id).block {
                        if (old_symtab, old_block) != (newst, new_block) {
                            check_restrictions_function(
                                store,
                                &funcname,
                                active,
                                (old_symtab, old_block),
                                (newst, new_block),
                            )?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn check_restrictions_function(
    store: &SymbolStore,
    funcname: &str,
    active: bool,
    (old_st, old_block): (SymtabId, usize),
    (new_st, new_block): (SymtabId, usize),
) -> FixResult<()> {
    let old = &store.symtab(old_st).blocks[old_block];
    let new = &store.symtab(new_st).blocks[new_block];

    // Return types must match textually.
    let old_ret = old.function.map(|f| store.symbol(f).ty.display.as_str());
    let new_ret = new.function.map(|f| store.symbol(f).ty.display.as_str());
    if let (Some(old_ret), Some(new_ret)) = (old_ret, new_ret) {
        if old_ret != new_ret {
            return Err(FixError::Restriction(format!(
                "Function '{funcname}' was changed from returning '{old_ret}' to '{new_ret}', \
                 which is not supported."
            )));
        }
    }

    let count = |block: &refix_environ::Block, class: SymbolClass| {
        block
            .symbols
            .iter()
            .filter(|&&s| store.symbol(s).class == class)
            .count()
    };
    let old_args = count(old, SymbolClass::Arg);
    let new_args = count(new, SymbolClass::Arg);
    let old_locals = count(old, SymbolClass::Local);
    let new_locals = count(new, SymbolClass::Local);

    if old_args != new_args {
        return Err(FixError::Restriction(format!(
            "Changing number of arguments from {old_args} to {new_args} for function \
             '{funcname}' is not supported."
        )));
    }

    if active && old_locals != new_locals {
        return Err(FixError::Restriction(format!(
            "Changing number of local variables from {old_locals} to {new_locals} for \
             function '{funcname}' while active on the stack is not supported."
        )));
    }

    // Arguments are compared pairwise by position; the blocks are walked in
    // tandem by index.
    for (i, &old_id) in old.symbols.iter().enumerate() {
        if i >= new.symbols.len() {
            continue;
        }
        let oldsym = store.symbol(old_id);
        let newsym = store.symbol(new.symbols[i]);
        if oldsym.class == SymbolClass::Arg && oldsym.ty.display != newsym.ty.display {
            return Err(FixError::Restriction(format!(
                "In function '{funcname}', argument '{}' changed from type '{}' to \
                 type '{}', which is not supported.",
                oldsym.source_name, oldsym.ty.display, newsym.ty.display
            )));
        }
    }

    Ok(())
}

/// C++ bundles can only bind their coalesced/private symbols when the
/// inferior links through the ZeroLink shim; a traditionally linked C++
/// program cannot be fixed.
fn check_restriction_cxx_zerolink(store: &SymbolStore, new_module: ModuleId) -> FixResult<()> {
    if loader::inferior_is_zerolinked(store) {
        return Ok(());
    }
    for st in store.module_symtabs(new_module, false) {
        let symtab = store.symtab(st);
        if symtab.primary && symtab.language.is_cplus() {
            return Err(FixError::Restriction(
                "Target is a C++ program that is not using ZeroLink.  This is not \
                 supported.  To use Fix and Continue on a C++ program, enable ZeroLink."
                    .to_string(),
            ));
        }
    }
    Ok(())
}
