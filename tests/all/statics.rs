//! Non-lazy symbol pointer redirection.

use crate::support::*;
use anyhow::Result;
use refix::FixError;

#[test]
fn intra_bundle_slots_are_redirected_to_the_original() -> Result<()> {
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    // Slot 0 points at the bundle's own copy of counter; slot 1 points at
    // gvar in the app and must be left alone.
    world.write_nl_slots(BUNDLE_BASE, &[(BUNDLE_BASE + 0x2000) as u32, GVAR as u32]);

    world.fix(BUNDLE, SRC)?;

    // Slot 0 now holds the original counter's address.
    assert_eq!(world.inferior.peek_u32(BUNDLE_BASE + 0x2800), COUNTER as u32);
    // Slot 1 is untouched.
    assert_eq!(world.inferior.peek_u32(BUNDLE_BASE + 0x2804), GVAR as u32);

    // Obsolescence inverted: the original counter is authoritative, the
    // bundle's copy is not.
    assert!(!world.sym_obsolete(APP, "counter"));
    assert!(!world.minsym_obsolete(APP, "counter"));
    assert!(world.sym_obsolete(BUNDLE, "counter"));
    assert!(world.minsym_obsolete(BUNDLE, "counter"));
    Ok(())
}

#[test]
fn slots_without_a_resolvable_symbol_are_skipped() -> Result<()> {
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    // Slot 0 points into the bundle's data but at no known symbol.
    world.write_nl_slots(BUNDLE_BASE, &[(BUNDLE_BASE + 0x2040) as u32, 0]);

    world.fix(BUNDLE, SRC)?;

    // Nothing matched, nothing was rewritten.
    assert_eq!(
        world.inferior.peek_u32(BUNDLE_BASE + 0x2800),
        (BUNDLE_BASE + 0x2040) as u32
    );
    assert!(!world.sym_obsolete(BUNDLE, "counter"));
    Ok(())
}

#[test]
fn missing_pointer_section_is_fine() -> Result<()> {
    let mut world = World::new();
    let mut bundle = bundle_module(BUNDLE, SRC, BUNDLE_BASE);
    bundle.sections.retain(|s| s.name != refix::NL_SYMBOL_PTR_SECTION);
    world.stage_bundle(bundle);

    world.fix(BUNDLE, SRC)?;
    Ok(())
}

#[test]
fn misaligned_pointer_section_is_corrupt() {
    let mut world = World::new();
    let mut bundle = bundle_module(BUNDLE, SRC, BUNDLE_BASE);
    // 18 bytes is not a whole number of 32-bit pointers.
    bundle
        .sections
        .iter_mut()
        .find(|s| s.name == refix::NL_SYMBOL_PTR_SECTION)
        .unwrap()
        .size = 18;
    world.stage_bundle(bundle);

    let err = world.fix(BUNDLE, SRC).unwrap_err();
    assert_eq!(err, FixError::CorruptSection);
    assert_eq!(
        err.to_string(),
        "Incorrect __DATA, __nl_symbol_ptr section size!"
    );
}

#[test]
fn second_fix_redirects_its_own_slots_to_the_original() -> Result<()> {
    let mut world = World::new();
    world.stage_bundle(bundle_module(BUNDLE, SRC, BUNDLE_BASE));
    world.write_nl_slots(BUNDLE_BASE, &[(BUNDLE_BASE + 0x2000) as u32, 0]);
    world.fix(BUNDLE, SRC)?;

    world.stage_bundle(bundle_module(BUNDLE2, SRC, BUNDLE2_BASE));
    world.write_nl_slots(BUNDLE2_BASE, &[(BUNDLE2_BASE + 0x2000) as u32, 0]);
    world.fix(BUNDLE2, SRC)?;

    // Both generations point at the one original counter.
    assert_eq!(world.inferior.peek_u32(BUNDLE_BASE + 0x2800), COUNTER as u32);
    assert_eq!(world.inferior.peek_u32(BUNDLE2_BASE + 0x2800), COUNTER as u32);
    assert!(!world.sym_obsolete(APP, "counter"));
    assert!(world.sym_obsolete(BUNDLE, "counter"));
    assert!(world.sym_obsolete(BUNDLE2, "counter"));
    Ok(())
}
