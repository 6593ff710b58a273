//! Process-wide cache of the targets the CPU supports.
//!
//! # State
//!
//! - `SUPPORTED`: 0 until the first query, then the probe (or mock) result.
//!   Stored with release ordering and loaded with acquire ordering.
//! - `SUPPORTED_MASK`: starts as all ones; [`disable_targets`] narrows it.
//! - `MOCK`: non-zero replaces the CPU probe.
//!
//! Racing first callers may each probe; they compute and store the same
//! value. The mutators are meant for single-threaded setup (program start,
//! test fixtures); concurrent mutation is the caller's responsibility.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::{
  chosen::chosen_target,
  config::{self, ENABLED_BASELINE, ENABLED_TARGETS},
  detect,
  target::TargetSet,
};

static SUPPORTED: AtomicU32 = AtomicU32::new(0);
static SUPPORTED_MASK: AtomicU32 = AtomicU32::new(!0);
static MOCK: AtomicU32 = AtomicU32::new(0);

/// Returns the targets the current CPU supports, limited to
/// [`ENABLED_TARGETS`] and minus runtime-disabled ones.
///
/// The first call probes the CPU (or uses the mock installed by
/// [`set_supported_targets_for_test`]); later calls return the cached value.
/// Always includes SCALAR unless a mock says otherwise.
///
/// ```
/// use targets::{Target, supported_targets};
///
/// assert!(supported_targets().contains(Target::Scalar));
/// ```
#[must_use]
pub fn supported_targets() -> TargetSet {
  let mask =
    SUPPORTED_MASK.load(Ordering::Relaxed) & config::runtime_mask().bits() & ENABLED_TARGETS.bits();

  let cached = SUPPORTED.load(Ordering::Acquire);
  if cached != 0 {
    return TargetSet::from_bits_retain(cached & mask);
  }

  let mock = MOCK.load(Ordering::Relaxed);
  if mock != 0 {
    SUPPORTED.store(mock, Ordering::Release);
    tracing::debug!(target: "targets", supported = %TargetSet::from_bits_retain(mock), "using mocked targets");
    return TargetSet::from_bits_retain(mock & mask);
  }

  let probed = detect::detect_uncached();
  tracing::debug!(target: "targets", supported = %probed, "detected targets");
  record_probe(probed);
  TargetSet::from_bits_retain(probed.bits() & mask)
}

/// Caches a probe result, warning first if it misses baseline targets.
fn record_probe(probed: TargetSet) {
  check_baseline(probed);
  SUPPORTED.store(probed.bits(), Ordering::Release);
}

/// True if `probed` covers [`ENABLED_BASELINE`]. Otherwise warns and returns
/// false; the program keeps running either way.
fn check_baseline(probed: TargetSet) -> bool {
  if probed.contains_all(ENABLED_BASELINE) {
    return true;
  }
  warn_baseline_unsupported(probed);
  false
}

#[cold]
fn warn_baseline_unsupported(probed: TargetSet) {
  #[cfg(feature = "std")]
  std::eprintln!(
    "WARNING: CPU supports {:x} but software requires {:x}",
    probed.bits(),
    ENABLED_BASELINE.bits()
  );
  tracing::warn!(
    target: "targets",
    supported = %probed,
    required = %ENABLED_BASELINE,
    "CPU does not support every baseline target"
  );
}

/// Stops [`supported_targets`] from reporting `disabled`, except targets in
/// the enabled baseline (the rest of the program already requires those).
///
/// Replaces any previous call's mask. Resets the chosen-target cache so the
/// next dispatch re-resolves. Call before spawning threads that dispatch.
pub fn disable_targets(disabled: TargetSet) {
  let mask = config::disable_mask(disabled);
  SUPPORTED_MASK.store(mask.bits(), Ordering::Relaxed);
  tracing::debug!(target: "targets", %disabled, "disabled targets");
  chosen_target().deinit();
}

/// Replaces CPU detection with `targets`. An empty set restores detection.
///
/// Clears the supported-targets cache and the chosen-target cache, so the
/// next [`supported_targets`] call reports `targets` (masked) and the next
/// dispatch re-resolves.
pub fn set_supported_targets_for_test(targets: TargetSet) {
  SUPPORTED.store(0, Ordering::Release);
  MOCK.store(targets.bits(), Ordering::Relaxed);
  chosen_target().deinit();
}

/// True once [`supported_targets`] has filled the cache since the last
/// [`set_supported_targets_for_test`].
///
/// Lets tests confirm that dispatch actually consulted detection.
#[must_use]
pub fn supported_targets_called_for_test() -> bool {
  SUPPORTED.load(Ordering::Acquire) != 0
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{target::Target, test_util};

  #[test]
  fn mock_replaces_probe() {
    let _g = test_util::lock();
    set_supported_targets_for_test(Target::Avx2 | Target::Scalar);
    assert!(!supported_targets_called_for_test());
    assert_eq!(supported_targets(), (Target::Avx2 | Target::Scalar) & ENABLED_TARGETS);
    assert!(supported_targets_called_for_test());

    set_supported_targets_for_test(TargetSet::NONE);
    assert!(supported_targets().contains(Target::Scalar));
  }

  #[test]
  fn disable_masks_but_keeps_baseline() {
    let _g = test_util::lock();
    let all = TargetSet::ALL;
    set_supported_targets_for_test(all);

    disable_targets(TargetSet::from_bits_retain(!0));
    assert_eq!(supported_targets(), all & ENABLED_BASELINE);

    // Idempotent.
    disable_targets(TargetSet::from_bits_retain(!0));
    assert_eq!(supported_targets(), all & ENABLED_BASELINE);

    disable_targets(TargetSet::NONE);
    assert_eq!(supported_targets(), all & ENABLED_TARGETS);
  }

  #[test]
  fn disable_resets_chosen_target() {
    let _g = test_util::lock();
    set_supported_targets_for_test(TargetSet::NONE);
    chosen_target().update();
    assert!(chosen_target().is_initialized());
    disable_targets(TargetSet::NONE);
    assert!(!chosen_target().is_initialized());
  }

  #[test]
  fn cache_survives_mask_changes() {
    let _g = test_util::lock();
    set_supported_targets_for_test(Target::Sse4 | Target::Ssse3 | Target::Scalar);
    let _ = supported_targets();
    // Masking does not re-probe: the mock value stays cached.
    disable_targets(Target::Sse4.set());
    assert!(supported_targets_called_for_test());
    let expected = if ENABLED_BASELINE.contains(Target::Sse4) {
      Target::Sse4 | Target::Ssse3 | Target::Scalar
    } else {
      Target::Ssse3 | Target::Scalar
    };
    assert_eq!(supported_targets(), expected & ENABLED_TARGETS);
  }

  #[test]
  fn disabled_and_broken_targets_are_never_reported() {
    let _g = test_util::lock();
    set_supported_targets_for_test(TargetSet::ALL);
    let supported = supported_targets();
    assert_eq!(supported, ENABLED_TARGETS);
    assert!((supported & (config::DISABLED | config::BROKEN)).is_empty(), "{supported}");
    for t in TargetSet::ALL.difference(ENABLED_TARGETS) {
      assert!(!supported.contains(t), "{t} reported but not enabled");
    }
  }

  #[test]
  fn baseline_check() {
    assert!(check_baseline(ENABLED_BASELINE));
    assert!(check_baseline(TargetSet::ALL));

    let missing = TargetSet::ALL.difference(ENABLED_BASELINE.lowest_bit_set());
    assert!(!check_baseline(missing));
  }

  #[test]
  fn probe_missing_baseline_is_still_cached() {
    let _g = test_util::lock();
    let missing = TargetSet::ALL.difference(ENABLED_BASELINE.lowest_bit_set());
    record_probe(missing);
    assert!(supported_targets_called_for_test());
    assert_eq!(supported_targets(), missing & ENABLED_TARGETS);
    assert!(!supported_targets().contains_all(ENABLED_BASELINE));
  }
}
