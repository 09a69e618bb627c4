//! Dynamic loader driver: mapping the bundle into the live process.
//!
//! The bundle is loaded by the inferior itself, via inferior function calls
//! to the dyld image-loading SPI, as if the program had executed:
//!
//! ```c
//! NSCreateObjectFileImageFromFile(path, &img);
//! handle = NSLinkModule(img, path,
//!                       NSLINKMODULE_OPTION_PRIVATE
//!                       | NSLINKMODULE_OPTION_DONT_CALL_MOD_INIT_ROUTINES
//!                       | NSLINKMODULE_OPTION_RETURN_ON_ERROR
//!                       | NSLINKMODULE_OPTION_BINDNOW);
//! ```
//!
//! The module the debugger learns about from that is identified by diffing
//! the module list against a pre-load snapshot.

use crate::error::{FixError, FixResult};
use crate::inferior::{CallArg, Inferior};
use crate::registry::{FixInfo, FixedObj};
use crate::target::Target;
use bitflags::bitflags;
use refix_environ::{ModuleId, SymbolStore};

/// Where the ZeroLink shim lives when the inferior uses it.
pub const ZEROLINK_FRAMEWORK: &str =
    "/System/Library/PrivateFrameworks/ZeroLink.framework/Versions/A/ZeroLink";

const ZL_FORCE_LINK: &str = "__zero_link_force_link_object_file";

const NS_OBJECT_FILE_IMAGE_SUCCESS: i64 = 1;

bitflags! {
    /// Options word for `NSLinkModule`.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct LinkOptions: i64 {
        const BINDNOW = 0x1;
        const PRIVATE = 0x2;
        const RETURN_ON_ERROR = 0x4;
        const DONT_CALL_MOD_INIT_ROUTINES = 0x8;
    }
}

/// Result codes of `__zero_link_force_link_object_file`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ZeroLinkResult {
    Unknown,
    BeingLinked,
    AlreadyLinked,
    JustLinked,
    Unrecognized(i64),
}

impl ZeroLinkResult {
    fn from_code(code: i64) -> ZeroLinkResult {
        match code {
            0 => ZeroLinkResult::Unknown,
            1 => ZeroLinkResult::BeingLinked,
            2 => ZeroLinkResult::AlreadyLinked,
            3 => ZeroLinkResult::JustLinked,
            other => ZeroLinkResult::Unrecognized(other),
        }
    }
}

/// Is the inferior a ZeroLink executable?
pub fn inferior_is_zerolinked(store: &SymbolStore) -> bool {
    let zerolinked = store.find_module_by_name(ZEROLINK_FRAMEWORK).is_some();
    if zerolinked {
        log::debug!("inferior is a ZeroLink executable");
    }
    zerolinked
}

fn c_string(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

/// If the inferior is zerolinked and the object file we're about to replace
/// hasn't been loaded yet, ask ZeroLink to map the original in first, so the
/// fixed version has something to supersede. Only the first fix of a source
/// needs this.
pub fn tell_zerolink(
    info: &FixInfo,
    store: &SymbolStore,
    inferior: &mut dyn Inferior,
) -> FixResult<()> {
    if !info.fixed_objects.is_empty() {
        return Ok(());
    }
    if !inferior_is_zerolinked(store) {
        return Ok(());
    }
    let Some(obj_name) = info.object_filename.as_deref() else {
        log::warn!("Inferior is a ZeroLink executable, but no .o file was provided.");
        return Ok(());
    };
    if store.lookup_minimal_symbol(ZL_FORCE_LINK, None).is_none() {
        log::warn!(
            "Inferior is apparently a ZeroLink app, but {ZL_FORCE_LINK} not found."
        );
        return Ok(());
    }

    let code = inferior.call_function(
        ZL_FORCE_LINK,
        &[CallArg::Bytes(c_string(obj_name)), CallArg::Int(0)],
    )?;

    match ZeroLinkResult::from_code(code) {
        ZeroLinkResult::AlreadyLinked | ZeroLinkResult::JustLinked => Ok(()),
        ZeroLinkResult::Unknown => {
            log::warn!("ZeroLink says object file '{obj_name}' is unknown.");
            Ok(())
        }
        ZeroLinkResult::BeingLinked => {
            log::warn!("ZeroLink says object file '{obj_name}' is mid-load.");
            Ok(())
        }
        ZeroLinkResult::Unrecognized(code) => {
            log::warn!(
                "Unrecognized result code {code} from ZeroLink for obj file '{obj_name}'."
            );
            Ok(())
        }
    }
}

/// Drive the dyld SPI through inferior calls. Returns whether `NSLinkModule`
/// produced a module handle; a create-image failure is an error of its own.
fn load_fixed_objfile(
    inferior: &mut dyn Inferior,
    target: &Target,
    name: &str,
) -> FixResult<bool> {
    // The image reference is returned through memory; reserve a pointer's
    // worth in the inferior for it.
    let image_ref_memory = inferior.allocate(target.pointer_bytes as u64)?;
    let path = c_string(name);

    let created = inferior.call_function(
        "NSCreateObjectFileImageFromFile",
        &[
            CallArg::Bytes(path.clone()),
            CallArg::Addr(image_ref_memory),
            CallArg::Int(0),
        ],
    )?;
    if created != NS_OBJECT_FILE_IMAGE_SUCCESS {
        return Err(FixError::ImageCreateFailed);
    }

    let mut buf = vec![0; target.pointer_bytes];
    inferior.read_memory(image_ref_memory, &mut buf)?;
    let image_ref = target.read_uint(&buf);

    let options = LinkOptions::PRIVATE
        | LinkOptions::DONT_CALL_MOD_INIT_ROUTINES
        | LinkOptions::RETURN_ON_ERROR
        | LinkOptions::BINDNOW;
    let handle = inferior.call_function(
        "NSLinkModule",
        &[
            CallArg::Addr(image_ref),
            CallArg::Bytes(path),
            CallArg::Int(options.bits()),
            CallArg::Int(0),
        ],
    )?;

    // NSLinkModule returns NULL on a failed load.
    Ok(handle != 0)
}

/// Given a pre-load snapshot of the module list, find the one module that
/// appeared with the bundle's name.
fn find_newly_added_module(
    store: &SymbolStore,
    pre_load: &[ModuleId],
    bundle: &str,
) -> Option<ModuleId> {
    store
        .modules()
        .find(|(id, m)| m.path == bundle && !pre_load.contains(id))
        .map(|(id, _)| id)
}

/// Load the bundle named by `info` into the live process and complete the
/// fix record: register the new `FixedObj`, expand the new module's
/// psymtabs, and mark the record complete.
pub fn get_fixed_file(
    info: &mut FixInfo,
    store: &mut SymbolStore,
    inferior: &mut dyn Inferior,
    target: &Target,
) -> FixResult<()> {
    let pre_load = store.module_ids();

    let loaded_ok = load_fixed_objfile(inferior, target, &info.bundle_filename)?;

    // Even on a failed link, dyld may have told the debugger about a new
    // module; pick it up either way so a bogus record can be torn out.
    inferior.sync_modules(store)?;
    let new_module = find_newly_added_module(store, &pre_load, &info.bundle_filename);

    if !loaded_ok {
        if let Some(module) = new_module {
            inferior.remove_module_from_records(store, module);
        }
        return Err(FixError::LoadFailed);
    }
    let Some(module) = new_module else {
        return Err(FixError::Internal(
            "Unable to load fixed object file.".to_string(),
        ));
    };

    info.fixed_objects
        .push(FixedObj::new(module, info.bundle_filename.clone()));
    info.most_recent_fix = Some(info.fixed_objects.len() - 1);

    // Restricting this expansion to the fixed source would miss changes in
    // headers, so the whole module is expanded.
    store.expand_all_psymtabs(module);

    info.complete = true;
    Ok(())
}
