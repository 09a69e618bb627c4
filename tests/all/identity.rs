//! Finding the original module for a source: full-path preference,
//! basename fallback, and the psymtab filters.

use crate::support::*;
use anyhow::Result;
use refix_environ::{ModuleData, PsymtabData, SymtabData};

#[test]
fn full_path_match_beats_an_earlier_basename_match() -> Result<()> {
    // A decoy library registered first knows the source only by basename;
    // the app knows it by full path. The full-path pass must win even
    // though the decoy comes first in module order.
    let mut decoy = ModuleData::new("/lib/decoy.dylib");
    decoy.psymtabs.push(PsymtabData {
        filename: "src.c".to_string(),
        fullname: None,
        texthigh: 0x500,
        symtab: SymtabData::new("src.c"),
    });

    let mut world = World::with_app(decoy);
    world.session.store_mut().add_module(app_module(SRC));
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));

    world.fix(BUNDLE, SRC)?;

    let info = world.session.registry().get(SRC).unwrap();
    assert_eq!(info.original_objfile_filename.as_deref(), Some(APP));
    assert_eq!(info.canonical_source_filename.as_deref(), Some(SRC));
    Ok(())
}

#[test]
fn basename_fallback_applies_when_no_full_path_matches() -> Result<()> {
    // The app's psymtab records only the basename.
    let mut app = app_module(SRC);
    app.psymtabs[0].filename = "src.c".to_string();
    app.psymtabs[0].fullname = None;

    let mut world = World::with_app(app);
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));

    world.fix(BUNDLE, SRC)?;

    let info = world.session.registry().get(SRC).unwrap();
    assert_eq!(info.original_objfile_filename.as_deref(), Some(APP));
    assert_eq!(info.canonical_source_filename.as_deref(), Some("src.c"));
    Ok(())
}

#[test]
fn empty_psymtabs_never_identify_the_original() -> Result<()> {
    // A psymtab that maps no code (a header-only unit) sits in front of the
    // real one; the scan must pass it by.
    let mut app = app_module(SRC);
    let empty = PsymtabData {
        filename: SRC.to_string(),
        fullname: Some(SRC.to_string()),
        texthigh: 0,
        symtab: SymtabData::new(SRC),
    };
    app.psymtabs.insert(0, empty);

    let mut world = World::with_app(app);
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));

    world.fix(BUNDLE, SRC)?;
    assert_eq!(
        world
            .session
            .trampoline_target(&mut world.inferior, OLD_FOO),
        Some(BUNDLE_BASE)
    );
    Ok(())
}

#[test]
fn identity_is_resolved_once_per_source() -> Result<()> {
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    world.fix(BUNDLE, SRC)?;

    // On a second fix the original identity is already recorded; fixing
    // again must not re-derive it (the original's psymtab is obsolete by
    // now, so a re-scan would misbehave).
    world.stage_bundle(bundle_module(BUNDLE2, SRC, BUNDLE2_BASE));
    world.fix(BUNDLE2, SRC)?;

    let info = world.session.registry().get(SRC).unwrap();
    assert_eq!(info.original_objfile_filename.as_deref(), Some(APP));
    Ok(())
}
