//! The chosen-target cache and dispatch index.
//!
//! One `AtomicU32` records which target dispatch should use. Its layout is
//! chosen so that a dispatch is a load, an AND and a trailing-zero count:
//!
//! ```text
//!   bit 0                      uninitialized marker (value 1 = not resolved)
//!   bits 1..=MAX               this family's target bits, shifted down
//!   bit  MAX + 1               scalar fallback
//! ```
//!
//! where `MAX` is [`MAX_DYNAMIC_TARGETS`]. Index 0 of every dispatch table is
//! an init trampoline, indices `1..=MAX` are target slots in bit order, and
//! index `MAX + 1` is the scalar slot. An uninitialized cache therefore
//! always dispatches to the trampoline, which calls [`ChosenTarget::update`]
//! and re-dispatches.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::{
  config::{FAMILY, TARGETS},
  supported::supported_targets,
  target::{Target, TargetSet},
};

// ─────────────────────────────────────────────────────────────────────────────
// Layout
// ─────────────────────────────────────────────────────────────────────────────

/// Target slots per dispatch table for this architecture.
pub const MAX_DYNAMIC_TARGETS: usize = FAMILY.max_dynamic_targets() as usize;

/// Highest bit position of this architecture's target range.
pub const HIGHEST_TARGET_BIT: u32 = FAMILY.highest_bit();

/// Entries per dispatch table: init trampoline, target slots, scalar slot.
pub const TABLE_LEN: usize = MAX_DYNAMIC_TARGETS + 2;

/// Index of the scalar slot.
pub const SCALAR_INDEX: usize = MAX_DYNAMIC_TARGETS + 1;

/// Chosen-mask bit of the scalar slot.
pub const CHOSEN_MASK_SCALAR: u32 = 1 << SCALAR_INDEX;

/// Value of an uninitialized chosen-target cache.
pub const CHOSEN_UNINITIALIZED: u32 = 1;

/// Shifts this family's target bits into chosen-mask bits `1..=MAX`.
/// Bits outside the family are discarded.
#[inline(always)]
#[must_use]
pub const fn chosen_shift(bits: u32) -> u32 {
  let lowest = HIGHEST_TARGET_BIT + 1 - MAX_DYNAMIC_TARGETS as u32;
  let width_mask = (1u32 << MAX_DYNAMIC_TARGETS) - 1;
  ((bits >> lowest) & width_mask) << 1
}

/// Chosen-mask bits a table compiled for `targets` has slots for.
///
/// Includes the init slot and the scalar slot, which every table has.
#[inline]
#[must_use]
pub const fn chosen_mask_targets(targets: TargetSet) -> u32 {
  chosen_shift(targets.bits()) | CHOSEN_MASK_SCALAR | CHOSEN_UNINITIALIZED
}

/// [`chosen_mask_targets`] for this build's [`TARGETS`].
pub const CHOSEN_MASK_TARGETS: u32 = chosen_mask_targets(TARGETS);

/// Chosen-mask value for a CPU supporting `supported`.
#[inline]
#[must_use]
pub const fn chosen_mask_for(supported: TargetSet) -> u32 {
  chosen_shift(supported.bits()) | CHOSEN_MASK_SCALAR
}

/// Table index selected by `mask` for a table compiled for `compiled_mask`.
#[inline(always)]
#[must_use]
pub const fn index_for(mask: u32, compiled_mask: u32) -> usize {
  (mask & compiled_mask).trailing_zeros() as usize
}

/// Table slot of `target`, if this architecture has one.
///
/// Family targets map to `1..=MAX`; SCALAR maps to [`SCALAR_INDEX`] unless
/// scalar is the family itself (no SIMD architecture), where it also has a
/// target slot.
#[must_use]
pub const fn slot_index(target: Target) -> Option<usize> {
  let shifted = chosen_shift(target.bits());
  if shifted != 0 {
    return Some(shifted.trailing_zeros() as usize);
  }
  if matches!(target, Target::Scalar) {
    return Some(SCALAR_INDEX);
  }
  None
}

/// The target a table slot belongs to. `None` for the init slot and
/// reserved slots.
#[must_use]
pub const fn slot_target(index: usize) -> Option<Target> {
  if index == SCALAR_INDEX {
    return Some(Target::Scalar);
  }
  if index == 0 || index > MAX_DYNAMIC_TARGETS {
    return None;
  }
  let lowest = HIGHEST_TARGET_BIT + 1 - MAX_DYNAMIC_TARGETS as u32;
  Target::from_bit(1 << (index as u32 - 1 + lowest))
}

const _: () = {
  assert!(MAX_DYNAMIC_TARGETS >= 1);
  assert!(SCALAR_INDEX < 32, "chosen mask must fit in u32");
  assert!(CHOSEN_MASK_TARGETS & CHOSEN_MASK_SCALAR != 0);
};

// ─────────────────────────────────────────────────────────────────────────────
// ChosenTarget
// ─────────────────────────────────────────────────────────────────────────────

/// Cache of the dispatch decision.
///
/// There is one per process, returned by [`chosen_target`]. Separate
/// instances are useful in tests.
#[derive(Debug)]
pub struct ChosenTarget {
  mask: AtomicU32,
}

impl ChosenTarget {
  /// A cache in the uninitialized state.
  #[must_use]
  pub const fn new() -> Self {
    Self { mask: AtomicU32::new(CHOSEN_UNINITIALIZED) }
  }

  /// Resolves the cache from [`supported_targets`].
  pub fn update(&self) {
    let supported = supported_targets();
    let mask = chosen_mask_for(supported);
    tracing::debug!(target: "targets", %supported, mask, "chosen target updated");
    self.mask.store(mask, Ordering::Release);
  }

  /// Returns the cache to the uninitialized state; the next dispatch goes
  /// through the init trampoline.
  pub fn deinit(&self) {
    self.mask.store(CHOSEN_UNINITIALIZED, Ordering::Release);
  }

  #[inline]
  #[must_use]
  pub fn is_initialized(&self) -> bool {
    self.mask.load(Ordering::Acquire) != CHOSEN_UNINITIALIZED
  }

  /// Dispatch index for tables compiled with this build's [`TARGETS`].
  ///
  /// 0 while uninitialized, otherwise the best supported compiled target's
  /// slot, or [`SCALAR_INDEX`].
  #[inline(always)]
  #[must_use]
  pub fn get_index(&self) -> usize {
    index_for(self.mask.load(Ordering::Acquire), CHOSEN_MASK_TARGETS)
  }

  /// Dispatch index for a table compiled with a different target set.
  #[inline]
  #[must_use]
  pub fn get_index_in(&self, targets: TargetSet) -> usize {
    index_for(self.mask.load(Ordering::Acquire), chosen_mask_targets(targets))
  }

  /// The target [`get_index`](Self::get_index) currently selects, if
  /// initialized.
  #[must_use]
  pub fn target(&self) -> Option<Target> {
    slot_target(self.get_index())
  }

  /// Raw cache value, for diagnostics.
  #[must_use]
  pub fn raw(&self) -> u32 {
    self.mask.load(Ordering::Acquire)
  }
}

impl Default for ChosenTarget {
  fn default() -> Self {
    Self::new()
  }
}

static CHOSEN: ChosenTarget = ChosenTarget::new();

/// The process-wide chosen-target cache.
#[inline(always)]
#[must_use]
pub fn chosen_target() -> &'static ChosenTarget {
  &CHOSEN
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::ENABLED_BASELINE,
    supported::{disable_targets, set_supported_targets_for_test, supported_targets_called_for_test},
    test_util,
  };

  #[test]
  fn layout_constants() {
    assert_eq!(TABLE_LEN, MAX_DYNAMIC_TARGETS + 2);
    assert_eq!(CHOSEN_MASK_SCALAR, 1 << (MAX_DYNAMIC_TARGETS + 1));
    assert_eq!(chosen_shift(Target::Scalar.bits()) & CHOSEN_MASK_SCALAR, 0);
    assert_eq!(CHOSEN_MASK_TARGETS & 1, 1);
  }

  #[test]
  #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
  fn x86_slot_order() {
    assert_eq!(MAX_DYNAMIC_TARGETS, 10);
    assert_eq!(slot_index(Target::Avx3Dl), Some(3));
    assert_eq!(slot_index(Target::Avx3), Some(4));
    assert_eq!(slot_index(Target::Avx2), Some(5));
    assert_eq!(slot_index(Target::Sse4), Some(7));
    assert_eq!(slot_index(Target::Ssse3), Some(8));
    assert_eq!(slot_index(Target::Scalar), Some(11));
    assert_eq!(slot_index(Target::Neon), None);
    assert_eq!(slot_target(6), None, "reserved AVX slot");
    assert_eq!(slot_target(0), None);
  }

  #[test]
  #[cfg(target_arch = "aarch64")]
  fn arm_slot_order() {
    assert_eq!(MAX_DYNAMIC_TARGETS, 4);
    assert_eq!(slot_index(Target::Sve2), Some(1));
    assert_eq!(slot_index(Target::Sve), Some(2));
    assert_eq!(slot_target(3), None);
    assert_eq!(slot_index(Target::Neon), Some(4));
    assert_eq!(slot_index(Target::Scalar), Some(5));
  }

  #[test]
  fn slot_index_and_slot_target_agree() {
    for t in Target::ALL {
      if let Some(i) = slot_index(t) {
        assert!(i >= 1 && i < TABLE_LEN, "{t} -> {i}");
        assert_eq!(slot_target(i), Some(t));
      }
    }
  }

  #[test]
  fn fresh_cache_dispatches_to_init() {
    let chosen = ChosenTarget::new();
    assert!(!chosen.is_initialized());
    assert_eq!(chosen.get_index(), 0);
    assert_eq!(chosen.raw(), CHOSEN_UNINITIALIZED);
    assert_eq!(chosen.target(), None);
  }

  #[test]
  fn index_prefers_best_compiled_target() {
    let supported = TargetSet::ALL;
    let mask = chosen_mask_for(supported);
    let expected = (supported & TARGETS & FAMILY.range()).best().unwrap_or(Target::Scalar);
    assert_eq!(slot_target(index_for(mask, CHOSEN_MASK_TARGETS)), Some(expected));

    // A table compiled only for scalar always lands on the scalar side.
    let idx = index_for(mask, chosen_mask_targets(Target::Scalar.set()));
    assert_eq!(slot_target(idx), Some(Target::Scalar));
  }

  #[test]
  fn mock_round_trip_for_every_target() {
    let _g = test_util::lock();
    for t in TARGETS {
      let expected = slot_index(t).unwrap_or(SCALAR_INDEX);

      // Fresh update.
      set_supported_targets_for_test(t.set());
      assert!(!supported_targets_called_for_test());
      chosen_target().update();
      assert!(supported_targets_called_for_test());
      assert_eq!(chosen_target().get_index(), expected, "{t} after update");

      // Lazy re-resolution after deinit.
      chosen_target().deinit();
      assert_eq!(chosen_target().get_index(), 0);
      chosen_target().update();
      assert_eq!(chosen_target().get_index(), expected, "{t} after deinit");

      // Cached path: no mock change, just read again.
      assert_eq!(chosen_target().get_index(), expected, "{t} cached");
      assert_eq!(chosen_target().target(), Some(t));
    }
  }

  #[test]
  fn disabling_best_target_falls_back() {
    let _g = test_util::lock();
    set_supported_targets_for_test(TARGETS);
    let before = supported_targets();
    let Some(best) = before.difference(ENABLED_BASELINE).best() else {
      return;
    };
    disable_targets(best.set());
    assert_eq!(supported_targets(), before ^ best.set());
    chosen_target().update();
    assert_ne!(chosen_target().target(), Some(best));
  }

  #[test]
  fn disabling_everything_leaves_enabled_baseline() {
    let _g = test_util::lock();
    set_supported_targets_for_test(TargetSet::NONE);
    disable_targets(TargetSet::from_bits_retain(!0));
    assert_eq!(supported_targets(), ENABLED_BASELINE);
    chosen_target().update();
    let expected = (ENABLED_BASELINE & TARGETS & FAMILY.range()).best().unwrap_or(Target::Scalar);
    assert_eq!(chosen_target().target(), Some(expected));
  }

  #[test]
  fn stray_bits_never_select_missing_slots() {
    // A cache value with bits the table has no slot for still lands on a
    // compiled slot or scalar.
    let raw = chosen_mask_for(TargetSet::from_bits_retain(!0 & !TARGETS.bits()));
    let idx = index_for(raw, CHOSEN_MASK_TARGETS);
    assert!(idx == SCALAR_INDEX || slot_target(idx).is_some_and(|t| TARGETS.contains(t)));
  }
}
