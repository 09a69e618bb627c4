//! Dynamic-loader driver behavior: failure teardown, the ZeroLink
//! pre-hint, and the pre-load discipline.

use crate::support::*;
use anyhow::Result;
use refix::loader::ZEROLINK_FRAMEWORK;
use refix::{FixError, FixRequest};
use refix_environ::ModuleData;

#[test]
fn image_create_failure_is_reported_verbatim() {
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    world.inferior.image_create_result = 0;

    let err = world.fix(BUNDLE, SRC).unwrap_err();
    assert_eq!(err, FixError::ImageCreateFailed);
    assert!(err.to_string().starts_with("NSCreateObjectFileImageFromFile failed."));

    // Nothing was linked, nothing was written, no record survives.
    assert_eq!(world.inferior.writes, 0);
    assert_eq!(world.session.store().module_ids().len(), 1);
    assert!(world.session.registry().is_empty());
}

#[test]
fn link_failure_tears_the_bogus_module_out() {
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    // dyld notices the module, but NSLinkModule returns NULL.
    world.inferior.link_result = 0;

    let err = world.fix(BUNDLE, SRC).unwrap_err();
    assert_eq!(err, FixError::LoadFailed);
    assert!(err.to_string().contains("NSLinkModule"));

    // The half-registered module was removed from the debugger's records.
    assert!(world.session.store().find_module_by_name(BUNDLE).is_none());
    assert_eq!(world.inferior.writes, 0);
    assert!(world.session.registry().is_empty());
}

#[test]
fn preload_module_is_discarded_on_success_and_failure() -> Result<()> {
    // Success: only the app and the really-loaded bundle remain.
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    world.fix(BUNDLE, SRC)?;
    assert_eq!(world.session.store().module_ids().len(), 2);

    // Failure inside the restriction checks: only the app remains.
    let mut world = World::new();
    let mut bundle = bundle_module(BUNDLE, SRC, BUNDLE_BASE);
    bundle.psymtabs[0].symtab.functions[0].args.push(arg("c", "int"));
    world.stage_bundle(bundle);
    assert!(world.fix(BUNDLE, SRC).is_err());
    assert_eq!(world.session.store().module_ids().len(), 1);
    Ok(())
}

#[test]
fn dyld_spi_is_driven_in_order() -> Result<()> {
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    world.fix(BUNDLE, SRC)?;

    assert_eq!(
        world.inferior.calls,
        vec!["NSCreateObjectFileImageFromFile", "NSLinkModule"]
    );
    Ok(())
}

fn zerolinked_world() -> World {
    let mut world = World::new();
    let mut zl = ModuleData::new(ZEROLINK_FRAMEWORK);
    zl.minsyms.push(refix_environ::MinsymData {
        name: "__zero_link_force_link_object_file".to_string(),
        address: 0x7000_0000,
    });
    world.session.store_mut().add_module(zl);
    world
}

fn fix_with_object(world: &mut World, object: Option<&str>) -> refix::FixResult<()> {
    world
        .session
        .fix(
            &mut world.inferior,
            &FixRequest {
                bundle_filename: BUNDLE.to_string(),
                source_filename: SRC.to_string(),
                object_filename: object.map(str::to_string),
            },
        )
        .map(|_| ())
}

#[test]
fn zerolink_hint_runs_on_the_first_fix() -> Result<()> {
    let mut world = zerolinked_world();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    world.inferior.zerolink_result = 3; // JustLinked

    fix_with_object(&mut world, Some("/tmp/src.o"))?;
    assert_eq!(world.inferior.calls[0], "__zero_link_force_link_object_file");
    Ok(())
}

#[test]
fn zerolink_unknown_object_warns_but_proceeds() -> Result<()> {
    let mut world = zerolinked_world();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    world.inferior.zerolink_result = 0; // Unknown

    fix_with_object(&mut world, Some("/tmp/src.o"))?;
    Ok(())
}

#[test]
fn zerolink_without_an_object_file_skips_the_hint() -> Result<()> {
    let mut world = zerolinked_world();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));

    fix_with_object(&mut world, None)?;
    assert!(world
        .inferior
        .calls
        .iter()
        .all(|c| c != "__zero_link_force_link_object_file"));
    Ok(())
}

#[test]
fn zerolink_hint_is_skipped_on_a_second_fix() -> Result<()> {
    let mut world = zerolinked_world();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    fix_with_object(&mut world, Some("/tmp/src.o"))?;

    world.inferior.calls.clear();
    world.stage_bundle(bundle_module(BUNDLE2, SRC, BUNDLE2_BASE));
    world.fix(BUNDLE2, SRC)?;

    assert!(world
        .inferior
        .calls
        .iter()
        .all(|c| c != "__zero_link_force_link_object_file"));
    Ok(())
}

#[test]
fn failed_memory_writes_surface_as_io_errors() {
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    world.inferior.fail_writes = true;

    let err = world.fix(BUNDLE, SRC).unwrap_err();
    assert_eq!(err, FixError::Io("Can't redirect function".to_string()));
}
