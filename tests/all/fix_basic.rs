//! First-fix scenarios: trampolines installed, obsolescence flipped, the
//! replaced-functions report, and the journals.

use crate::support::*;
use anyhow::Result;

#[test]
fn first_fix_installs_trampolines() -> Result<()> {
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));

    let outcome = world.fix(BUNDLE, SRC)?;

    // No thread was in src.c, so nothing is reported.
    assert!(outcome.is_empty());

    // foo's original entry vectors to the new foo, bar's to the new bar.
    assert_eq!(
        world
            .session
            .trampoline_target(&mut world.inferior, OLD_FOO),
        Some(BUNDLE_BASE)
    );
    assert_eq!(
        world
            .session
            .trampoline_target(&mut world.inferior, OLD_BAR),
        Some(BUNDLE_BASE + 0x100)
    );
    // tiny had no replacement and was left alone.
    assert_eq!(
        world
            .session
            .trampoline_target(&mut world.inferior, OLD_TINY),
        None
    );

    // The old definitions are obsolete, the new ones are not.
    assert!(world.sym_obsolete(APP, "foo"));
    assert!(world.sym_obsolete(APP, "bar"));
    assert!(world.minsym_obsolete(APP, "foo"));
    assert!(world.minsym_obsolete(APP, "bar"));
    assert!(!world.sym_obsolete(BUNDLE, "foo"));
    assert!(!world.minsym_obsolete(BUNDLE, "foo"));

    // The pre-load module is gone; only the app and the real load remain.
    assert_eq!(world.session.store().module_ids().len(), 2);
    Ok(())
}

#[test]
fn trampoline_bytes_match_the_template() -> Result<()> {
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    world.fix(BUNDLE, SRC)?;

    // li r12 / addis r12,r12 / mtctr r12 / bctr / sentinel.
    let words: Vec<u32> = (0..5)
        .map(|i| world.inferior.peek_u32(OLD_FOO + i * 4))
        .collect();
    assert_eq!(words[0] & 0xffff_0000, 0x3980_0000);
    assert_eq!(words[1] & 0xffff_0000, 0x3d8c_0000);
    assert_eq!(words[2], 0x7d89_03a6);
    assert_eq!(words[3], 0x4e80_0420);
    assert_eq!(words[4], 0);

    // hi16/lo16 reassemble to the new entry.
    assert_eq!(words[0] & 0xffff, (BUNDLE_BASE & 0xffff) as u32);
    Ok(())
}

#[test]
fn fix_with_thread_stopped_in_replaced_function() -> Result<()> {
    let mut world = World::new();
    // Thread 1 is stopped in foo (past the trampoline window), called from
    // main; thread 2 idles elsewhere.
    world.inferior.stop_thread_at(1, &[OLD_FOO + 0x40, MAIN_PC]);
    world.inferior.stop_thread_at(2, &[MAIN_PC]);
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));

    let outcome = world.fix(BUNDLE, SRC)?;

    assert_eq!(outcome.replaced_functions.len(), 1);
    let thread = &outcome.replaced_functions[0];
    assert_eq!(thread.thread_id, 1);
    assert_eq!(thread.replaced.len(), 1);
    assert_eq!(thread.replaced[0].func, "foo");
    assert_eq!(thread.replaced[0].pc, OLD_FOO + 0x40);
    assert_eq!(thread.replaced[0].level, 0);
    assert_eq!(thread.replaced[0].file, SRC);

    // The fix still went through.
    assert_eq!(
        world
            .session
            .trampoline_target(&mut world.inferior, OLD_FOO),
        Some(BUNDLE_BASE)
    );
    Ok(())
}

#[test]
fn dead_threads_are_skipped_silently() -> Result<()> {
    let mut world = World::new();
    world.inferior.threads.push((7, None));
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));

    let outcome = world.fix(BUNDLE, SRC)?;
    assert!(outcome.is_empty());
    Ok(())
}

#[test]
fn journals_record_every_write() -> Result<()> {
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    world.fix(BUNDLE, SRC)?;

    let info = world.session.registry().get(SRC).expect("fix record");
    assert!(info.complete);
    let fixed = info.most_recent().expect("fixed object");
    assert_eq!(fixed.bundle_filename, BUNDLE);

    // Two functions, five words each.
    assert_eq!(fixed.datums.len(), 10);
    assert!(fixed.datums.iter().all(|d| d.size == 4));
    assert_eq!(fixed.datums[0].addr, OLD_FOO);
    assert_eq!(fixed.datums[0].old.as_slice(), &[0, 0, 0, 0]);

    // Both redirections flipped an obsolescence pair.
    assert_eq!(fixed.obsoleted.len(), 2);
    assert!(fixed.obsoleted.iter().all(|o| o.old_minsym.is_some()));
    Ok(())
}

#[test]
fn fixing_an_already_loaded_bundle_is_rejected() -> Result<()> {
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    world.fix(BUNDLE, SRC)?;

    let err = world.fix(BUNDLE, SRC).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Bundle '{BUNDLE}' has already been loaded.")
    );
    Ok(())
}

#[test]
fn unknown_source_file_is_rejected() {
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, "/tmp/elsewhere.c", BUNDLE_BASE));

    let err = world.fix(BUNDLE, "/tmp/elsewhere.c").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unable to find original source file elsewhere.c.  \
         Target built without debugging symbols?"
    );
    // The aborted request left no record behind.
    assert!(world.session.registry().is_empty());
}
