//! Fuzz target for chosen-mask index selection.
//!
//! For any supported set, the selected slot is the best compiled target of
//! this architecture, or the scalar slot.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use targets::{
  TARGETS, TargetSet,
  chosen::{
    CHOSEN_MASK_TARGETS, SCALAR_INDEX, TABLE_LEN, chosen_mask_for, chosen_mask_targets, index_for,
    slot_index, slot_target,
  },
  config::FAMILY,
};

#[derive(Arbitrary, Debug)]
struct Input {
  supported: u32,
  compiled: u32,
}

fuzz_target!(|input: Input| {
  let supported = TargetSet::from_bits_retain(input.supported);

  // ─── This build's table ───
  let index = index_for(chosen_mask_for(supported), CHOSEN_MASK_TARGETS);
  assert!((1..TABLE_LEN).contains(&index), "index {index} out of table");

  let expected = (supported & TARGETS & FAMILY.range()).best();
  match expected.and_then(slot_index) {
    Some(slot) => assert_eq!(index, slot),
    None => assert_eq!(index, SCALAR_INDEX),
  }
  if index != SCALAR_INDEX {
    let t = slot_target(index).expect("non-scalar index names a target");
    assert!(supported.contains(t));
    assert!(TARGETS.contains(t));
  }

  // ─── Arbitrary compiled sets ───
  let compiled = TargetSet::from_bits_retain(input.compiled);
  let index = index_for(chosen_mask_for(supported), chosen_mask_targets(compiled));
  assert!((1..TABLE_LEN).contains(&index));
  if let Some(t) = slot_target(index).filter(|_| index != SCALAR_INDEX) {
    assert!(supported.contains(t) && compiled.contains(t));
  }
});
