//! Target configuration for this build.
//!
//! Evaluates the rules in [`crate::policy`] once, at compile time, for the
//! architecture, compiler, target features and Cargo features this crate was
//! built with.
//!
//! # Overrides
//!
//! Build time (read with `option_env!`, rebuilt when they change). Each takes
//! a target list such as `AVX3|AVX3_DL` or an integer such as `0x18`:
//!
//! - `TARGETS_DISABLED`: never compile or dispatch to these targets.
//! - `TARGETS_BROKEN`: replaces the computed broken set.
//! - `TARGETS_BASELINE`: replaces the baseline inferred from target features.
//!
//! Runtime (`std` only, read once):
//!
//! - `TARGETS_RUNTIME_DISABLE`: targets to drop from
//!   [`supported_targets`](crate::supported_targets), as if passed to
//!   [`disable_targets`](crate::disable_targets) before first use. Baseline
//!   targets are never dropped.

use crate::{
  arch::{Arch, BIG_ENDIAN},
  compiler::COMPILER,
  policy::{self, BaselineFeatures, FeatureInference, GroupOptions, Policy},
  target::{Family, Target, TargetSet},
};

// ─────────────────────────────────────────────────────────────────────────────
// Build-time overrides
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! env_override {
  ($var:literal) => {
    match option_env!($var) {
      Some(text) => match TargetSet::parse(text) {
        Ok(set) => Some(set),
        Err(_) => panic!(concat!("invalid target list in ", $var)),
      },
      None => None,
    }
  };
}

const DISABLED_OVERRIDE: Option<TargetSet> = env_override!("TARGETS_DISABLED");
const BROKEN_OVERRIDE: Option<TargetSet> = env_override!("TARGETS_BROKEN");
const BASELINE_OVERRIDE: Option<TargetSet> = env_override!("TARGETS_BASELINE");

// ─────────────────────────────────────────────────────────────────────────────
// Policy selection
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(all(
  not(any(rust_analyzer, doc)),
  any(
    all(feature = "compile-only-scalar", feature = "compile-only-static"),
    all(feature = "compile-only-scalar", feature = "compile-all-attainable"),
    all(feature = "compile-only-static", feature = "compile-all-attainable"),
  )
))]
compile_error!(
  "at most one of `compile-only-scalar`, `compile-only-static` and `compile-all-attainable` may be enabled"
);

/// Dispatch policy selected by Cargo features. This crate's own unit tests
/// compile every attainable target.
///
/// Under rust-analyzer and rustdoc, which usually enable every feature, the
/// first policy in this order wins instead of failing the build.
pub const POLICY: Policy = if cfg!(feature = "compile-only-scalar") {
  Policy::ScalarOnly
} else if cfg!(feature = "compile-only-static") {
  Policy::StaticOnly
} else if cfg!(any(feature = "compile-all-attainable", test)) {
  Policy::AllAttainable
} else {
  Policy::Default
};

// ─────────────────────────────────────────────────────────────────────────────
// Resolved sets
// ─────────────────────────────────────────────────────────────────────────────

/// The architecture of this build.
pub const ARCH: Arch = Arch::current();

/// The target family dispatch selects within.
pub const FAMILY: Family = ARCH.family();

/// Targets excluded by the user.
pub const DISABLED: TargetSet = match DISABLED_OVERRIDE {
  Some(set) => set,
  None => TargetSet::NONE,
};

/// Targets the compiler cannot build correctly.
pub const BROKEN: TargetSet = match BROKEN_OVERRIDE {
  Some(set) => set,
  None => policy::broken_targets(ARCH, COMPILER, BIG_ENDIAN),
};

/// Targets the compiler may use anywhere.
pub const BASELINE: TargetSet = match BASELINE_OVERRIDE {
  Some(set) => set,
  None => policy::baseline_targets(
    ARCH,
    BaselineFeatures::from_cfg(),
    GroupOptions::FROM_FEATURES,
    FeatureInference::PerFeature,
  ),
};

/// `x` minus [`DISABLED`] and [`BROKEN`].
#[inline]
#[must_use]
pub const fn enabled(x: TargetSet) -> TargetSet {
  policy::enabled_in(x, DISABLED, BROKEN)
}

/// The baseline after removing disabled and broken targets.
pub const ENABLED_BASELINE: TargetSet = enabled(BASELINE);

const _: () = assert!(
  !ENABLED_BASELINE.is_empty(),
  "no baseline target remains enabled; check TARGETS_DISABLED and TARGETS_BROKEN"
);

/// The single target that non-dispatched code is compiled for.
pub const STATIC_TARGET: Target = policy::static_target(POLICY, ENABLED_BASELINE);

/// Targets this build could dispatch to.
pub const ATTAINABLE: TargetSet = policy::attainable_targets(
  ARCH,
  ENABLED_BASELINE,
  DISABLED,
  BROKEN,
  cfg!(feature = "want-avx3-dl"),
);

/// Targets compiled for runtime dispatch.
pub const TARGETS: TargetSet = policy::dynamic_targets(POLICY, STATIC_TARGET, ATTAINABLE);

const _: () = assert!(
  TARGETS.contains(STATIC_TARGET),
  "the static target must be one of the dispatch targets"
);

/// Targets [`supported_targets`](crate::supported_targets) may report: the
/// dispatch targets plus the enabled baseline. Disabled and broken targets
/// are never reported, whatever the CPU says.
pub const ENABLED_TARGETS: TargetSet = TARGETS.union(ENABLED_BASELINE);

const _: () = assert!(
  ENABLED_TARGETS.intersection(DISABLED.union(BROKEN)).is_empty(),
  "disabled or broken targets must not be reportable"
);

// ─────────────────────────────────────────────────────────────────────────────
// Runtime overrides
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "std")]
fn read_runtime_disable() -> TargetSet {
  let Ok(value) = std::env::var("TARGETS_RUNTIME_DISABLE") else {
    return TargetSet::NONE;
  };
  let value = value.trim();
  if value.is_empty() {
    return TargetSet::NONE;
  }
  match TargetSet::parse(value) {
    Ok(set) => {
      tracing::debug!(target: "targets", disabled = %set, "TARGETS_RUNTIME_DISABLE");
      set
    }
    Err(err) => {
      tracing::warn!(target: "targets", %err, value, "ignoring invalid TARGETS_RUNTIME_DISABLE");
      TargetSet::NONE
    }
  }
}

/// Mask applied to the supported set on behalf of `TARGETS_RUNTIME_DISABLE`.
#[cfg(feature = "std")]
pub(crate) fn runtime_mask() -> TargetSet {
  use std::sync::OnceLock;
  static MASK: OnceLock<TargetSet> = OnceLock::new();
  *MASK.get_or_init(|| disable_mask(read_runtime_disable()))
}

#[cfg(not(feature = "std"))]
#[inline(always)]
pub(crate) fn runtime_mask() -> TargetSet {
  TargetSet::from_bits_retain(!0)
}

/// Mask that removes `disabled`, except targets in [`ENABLED_BASELINE`].
#[inline]
#[must_use]
pub const fn disable_mask(disabled: TargetSet) -> TargetSet {
  disabled.difference(ENABLED_BASELINE).complement()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unit_tests_compile_all_attainable() {
    if !cfg!(any(feature = "compile-only-scalar", feature = "compile-only-static")) {
      assert_eq!(POLICY, Policy::AllAttainable);
      assert_eq!(TARGETS, ATTAINABLE);
    }
  }

  #[test]
  fn resolved_sets_are_consistent() {
    assert!(BASELINE.contains_all(ENABLED_BASELINE));
    assert!((ENABLED_BASELINE & (DISABLED | BROKEN)).is_empty());
    assert!(TARGETS.contains(STATIC_TARGET));
    assert_eq!(STATIC_TARGET.set().count(), 1);
    assert!((TARGETS & (DISABLED | BROKEN)).is_empty());
  }

  #[test]
  fn dispatch_targets_stay_in_family() {
    let allowed = FAMILY.range() | Target::Scalar;
    assert!(allowed.contains_all(TARGETS), "{TARGETS} escapes {FAMILY:?}");
  }

  #[test]
  fn non_x86_targets_are_baseline() {
    if !ARCH.is_x86() {
      assert!(ENABLED_BASELINE.contains_all(TARGETS));
    }
  }

  #[test]
  fn disable_mask_keeps_baseline() {
    let mask = disable_mask(TargetSet::from_bits_retain(!0));
    assert_eq!(mask, ENABLED_BASELINE);
    assert_eq!(disable_mask(TargetSet::NONE), TargetSet::from_bits_retain(!0));
  }

  #[cfg(feature = "std")]
  #[test]
  fn runtime_mask_keeps_baseline() {
    assert!(runtime_mask().contains_all(ENABLED_BASELINE));
  }
}
