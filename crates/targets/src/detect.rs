//! Runtime CPU probe.
//!
//! Returns the targets the running CPU (and OS) can execute. Only x86 has a
//! real probe; elsewhere the enabled baseline is reported as-is.
//!
//! Results are not cached here; [`crate::supported`] owns the cache.

use crate::target::TargetSet;

pub mod x86;

/// Probes the CPU. Always includes SCALAR.
#[must_use]
pub(crate) fn detect_uncached() -> TargetSet {
  cfg_if::cfg_if! {
    if #[cfg(miri)] {
      // Miri cannot execute CPUID.
      crate::config::ENABLED_BASELINE
    } else if #[cfg(any(target_arch = "x86", target_arch = "x86_64"))] {
      x86::detect()
    } else {
      // TODO: probe NEON/SVE via HWCAP and RVV via hwprobe instead of
      // trusting the baseline.
      crate::config::ENABLED_BASELINE
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{config::ENABLED_BASELINE, target::Target};

  #[test]
  fn probe_includes_scalar() {
    assert!(detect_uncached().contains(Target::Scalar));
  }

  #[test]
  #[cfg(not(miri))]
  fn probe_covers_baseline() {
    // This binary is running, so the CPU handles everything it was built for.
    let supported = detect_uncached();
    assert!(
      supported.contains_all(ENABLED_BASELINE),
      "{supported} does not cover {ENABLED_BASELINE}"
    );
  }

  #[test]
  fn probe_is_deterministic() {
    assert_eq!(detect_uncached(), detect_uncached());
  }
}
