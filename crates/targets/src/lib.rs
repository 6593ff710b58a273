//! SIMD target selection: compile-time policy and runtime dispatch.
//!
//! This crate decides, per build, which SIMD targets get compiled, and, per
//! process, which of them to run.
//!
//! # Core Types
//!
//! - [`Target`]: one instruction-set level (SSE4, AVX2, NEON, ...), one bit each.
//! - [`TargetSet`]: a set of targets, usable in `const` context.
//! - [`isa::Isa`]: compile-time constants of one target, for generic kernels.
//!
//! # Build-time sets
//!
//! - [`BASELINE`] / [`ENABLED_BASELINE`]: what the compiler may use anywhere.
//! - [`STATIC_TARGET`]: the best enabled baseline target.
//! - [`TARGETS`]: what gets compiled for runtime dispatch.
//!
//! # Runtime
//!
//! ```
//! use targets::{Target, chosen_target, supported_targets};
//!
//! let supported = supported_targets();
//! assert!(supported.contains(Target::Scalar));
//!
//! chosen_target().update();
//! assert!(chosen_target().get_index() > 0);
//! ```
//!
//! Kernels usually go through [`dynamic_dispatch!`] instead of calling these
//! directly.
//!
//! # Cargo features
//!
//! - `std` (default): stderr warning on misconfigured CPUs and the
//!   `TARGETS_RUNTIME_DISABLE` environment override.
//! - `compile-only-scalar`, `compile-only-static`, `compile-all-attainable`:
//!   dispatch policy (at most one).
//! - `want-avx3-dl`: compile AVX3_DL as well.
//! - `disable-bmi2-fma`, `disable-f16c`, `disable-pclmul-aes`: drop those
//!   instructions from the x86 target requirements.

#![no_std]

#[cfg(any(feature = "std", test))]
extern crate std;

// ─────────────────────────────────────────────────────────────────────────────
// Core modules
// ─────────────────────────────────────────────────────────────────────────────

pub mod arch;
pub mod compiler;
pub mod isa;
pub mod policy;
pub mod target;

// ─────────────────────────────────────────────────────────────────────────────
// Build configuration and runtime selection
// ─────────────────────────────────────────────────────────────────────────────

pub mod chosen;
pub mod config;
pub mod detect;
pub mod dispatch;
mod supported;

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

pub use chosen::{ChosenTarget, MAX_DYNAMIC_TARGETS, chosen_target};
pub use config::{
  ATTAINABLE, BASELINE, BROKEN, DISABLED, ENABLED_BASELINE, ENABLED_TARGETS, POLICY, STATIC_TARGET, TARGETS,
  enabled,
};
pub use dispatch::DispatchTable;
pub use supported::{
  disable_targets, set_supported_targets_for_test, supported_targets, supported_targets_called_for_test,
};
pub use target::{ParseTargetError, Target, TargetSet};

#[cfg(test)]
pub(crate) mod test_util {
  use std::sync::{Mutex, MutexGuard, PoisonError};

  use crate::{TargetSet, disable_targets, set_supported_targets_for_test};

  static LOCK: Mutex<()> = Mutex::new(());

  /// Serializes tests that touch the process-wide caches and resets them to
  /// real detection with nothing disabled.
  pub(crate) fn lock() -> MutexGuard<'static, ()> {
    let guard = LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    set_supported_targets_for_test(TargetSet::NONE);
    disable_targets(TargetSet::NONE);
    guard
  }
}
