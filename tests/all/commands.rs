//! The `fix` command surface, run against real files on disk.

use crate::support::*;
use anyhow::Result;
use refix::commands::{fix_command, OutputKind};
use refix::FixError;

struct CommandWorld {
    world: World,
    _dir: tempfile::TempDir,
    bundle_path: String,
    source_path: String,
}

/// A world whose source and bundle actually exist on disk, with the app
/// module keyed to the real source path.
fn command_world() -> Result<CommandWorld> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("src.c");
    let bundle = dir.path().join("b.bundle");
    std::fs::write(&source, "int foo(int a, int b) { return a + b; }\n")?;
    std::fs::write(&bundle, b"\xfe\xed\xfa\xce")?;

    // The command layer canonicalizes the bundle path; key the staged
    // symbol data the same way.
    let bundle_path = std::fs::canonicalize(&bundle)?
        .to_str()
        .unwrap()
        .to_string();
    let source_path = source.to_str().unwrap().to_string();

    let mut world = World::with_app(app_module(&source_path));
    world.stage_bundle(bundle_module(&bundle_path, &source_path, BUNDLE_BASE));
    Ok(CommandWorld {
        world,
        _dir: dir,
        bundle_path,
        source_path,
    })
}

#[test]
fn fix_command_reports_success_on_the_console() -> Result<()> {
    let mut cw = command_world()?;
    let mut out = Vec::new();

    fix_command(
        &mut cw.world.session,
        &mut cw.world.inferior,
        &[&cw.bundle_path, &cw.source_path],
        OutputKind::Console,
        &mut out,
    )?;

    assert_eq!(String::from_utf8(out)?, "Fix succeeded.\n");
    Ok(())
}

#[test]
fn fix_command_emits_replaced_functions_for_machine_uis() -> Result<()> {
    let mut cw = command_world()?;
    cw.world
        .inferior
        .stop_thread_at(1, &[OLD_FOO + 0x40, MAIN_PC]);
    let mut out = Vec::new();

    fix_command(
        &mut cw.world.session,
        &mut cw.world.inferior,
        &[&cw.bundle_path, &cw.source_path],
        OutputKind::MachineReadable,
        &mut out,
    )?;

    let json: serde_json::Value = serde_json::from_slice(&out)?;
    let threads = json["replaced-functions"].as_array().unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["thread-id"], 1);
    assert_eq!(threads[0]["replaced"][0]["func"], "foo");
    Ok(())
}

#[test]
fn missing_files_produce_not_found_diagnostics() -> Result<()> {
    let mut cw = command_world()?;
    let mut out = Vec::new();

    let err = fix_command(
        &mut cw.world.session,
        &mut cw.world.inferior,
        &["/no/such/b.bundle", &cw.source_path],
        OutputKind::Console,
        &mut out,
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Bundle '/no/such/b.bundle' not found."
    );

    let err = fix_command(
        &mut cw.world.session,
        &mut cw.world.inferior,
        &[&cw.bundle_path, "/no/such/src.c"],
        OutputKind::Console,
        &mut out,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "Source file '/no/such/src.c' not found.");

    let err = fix_command(
        &mut cw.world.session,
        &mut cw.world.inferior,
        &[&cw.bundle_path, &cw.source_path, "/no/such/src.o"],
        OutputKind::Console,
        &mut out,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "Object '/no/such/src.o' not found.");

    assert!(out.is_empty());
    Ok(())
}

#[test]
fn malformed_argument_lists_are_usage_errors() -> Result<()> {
    let mut cw = command_world()?;
    let mut out = Vec::new();

    for args in [&[][..], &[cw.bundle_path.as_str()][..]] {
        let err = fix_command(
            &mut cw.world.session,
            &mut cw.world.inferior,
            args,
            OutputKind::Console,
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, FixError::Usage(_)));
        assert_eq!(
            err.to_string(),
            "Usage: fix bundle-filename source-filename [object-filename]"
        );
    }
    Ok(())
}
