//! Architecture family detection.
//!
//! Every fact here is a `const` derived from `cfg!`, so it costs nothing at
//! runtime and can feed the target policy in [`crate::config`].

use crate::target::Family;

// ─────────────────────────────────────────────────────────────────────────────
// Family flags
// ─────────────────────────────────────────────────────────────────────────────

/// 32-bit x86.
pub const ARCH_X86_32: bool = cfg!(target_arch = "x86");
/// x86-64.
pub const ARCH_X86_64: bool = cfg!(target_arch = "x86_64");
/// Either x86 flavor.
pub const ARCH_X86: bool = ARCH_X86_32 || ARCH_X86_64;
/// 32 or 64-bit POWER.
pub const ARCH_PPC: bool = cfg!(any(target_arch = "powerpc", target_arch = "powerpc64"));
/// AArch64.
pub const ARCH_ARM_A64: bool = cfg!(target_arch = "aarch64");
/// 32-bit ARMv7 (including Thumb).
pub const ARCH_ARM_V7: bool = cfg!(target_arch = "arm");
/// Either ARM flavor.
pub const ARCH_ARM: bool = ARCH_ARM_A64 || ARCH_ARM_V7;
/// WebAssembly.
pub const ARCH_WASM: bool = cfg!(any(target_arch = "wasm32", target_arch = "wasm64"));
/// RISC-V (vector extension targets).
pub const ARCH_RVV: bool = cfg!(any(target_arch = "riscv32", target_arch = "riscv64"));

/// Big-endian byte order.
pub const BIG_ENDIAN: bool = cfg!(target_endian = "big");

/// True when compiled by rust-analyzer or rustdoc.
///
/// IDEs typically enable every Cargo feature at once, so build-configuration
/// checks that would reject such combinations are relaxed here.
pub const IS_IDE: bool = cfg!(any(rust_analyzer, doc));

const _: () = {
  assert!(!(ARCH_X86_32 && ARCH_X86_64), "x86-32 and x86-64 are exclusive");
  assert!(!(ARCH_ARM_A64 && ARCH_ARM_V7), "AArch64 and ARMv7 are exclusive");
  let families = ARCH_X86 as u32 + ARCH_PPC as u32 + ARCH_ARM as u32 + ARCH_WASM as u32 + ARCH_RVV as u32;
  assert!(families <= 1, "more than one architecture family detected");
};

/// Evaluates to `true` if the target feature is enabled for this build.
///
/// Unknown feature names evaluate to `false` instead of failing the build.
///
/// ```
/// let baseline_sse2 = targets::has_target_feature!("sse2");
/// # let _ = baseline_sse2;
/// ```
#[macro_export]
macro_rules! has_target_feature {
  ($feature:literal) => {
    cfg!(target_feature = $feature)
  };
}

// ─────────────────────────────────────────────────────────────────────────────
// Arch
// ─────────────────────────────────────────────────────────────────────────────

/// Concrete architecture of this build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_32,
  X86_64,
  Ppc,
  ArmA64,
  ArmV7,
  Wasm,
  RiscV,
  /// No SIMD family recognized; only the scalar target exists.
  Other,
}

impl Arch {
  /// The architecture this crate was compiled for.
  #[inline]
  #[must_use]
  pub const fn current() -> Self {
    if ARCH_X86_64 {
      Self::X86_64
    } else if ARCH_X86_32 {
      Self::X86_32
    } else if ARCH_ARM_A64 {
      Self::ArmA64
    } else if ARCH_ARM_V7 {
      Self::ArmV7
    } else if ARCH_PPC {
      Self::Ppc
    } else if ARCH_WASM {
      Self::Wasm
    } else if ARCH_RVV {
      Self::RiscV
    } else {
      Self::Other
    }
  }

  /// Target family whose bits this architecture dispatches over.
  #[inline]
  #[must_use]
  pub const fn family(self) -> Family {
    match self {
      Self::X86_32 | Self::X86_64 => Family::X86,
      Self::ArmA64 | Self::ArmV7 => Family::Arm,
      Self::Ppc => Family::Ppc,
      Self::Wasm => Family::Wasm,
      Self::RiscV => Family::Rvv,
      Self::Other => Family::Scalar,
    }
  }

  #[inline]
  #[must_use]
  pub const fn is_x86(self) -> bool {
    matches!(self, Self::X86_32 | Self::X86_64)
  }

  #[must_use]
  pub const fn name(self) -> &'static str {
    match self {
      Self::X86_32 => "x86",
      Self::X86_64 => "x86_64",
      Self::Ppc => "ppc",
      Self::ArmA64 => "aarch64",
      Self::ArmV7 => "armv7",
      Self::Wasm => "wasm",
      Self::RiscV => "riscv",
      Self::Other => "other",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn current_matches_flags() {
    let arch = Arch::current();
    assert_eq!(arch.is_x86(), ARCH_X86);
    assert_eq!(matches!(arch, Arch::ArmA64 | Arch::ArmV7), ARCH_ARM);
    assert_eq!(arch == Arch::Ppc, ARCH_PPC);
    assert_eq!(arch == Arch::Wasm, ARCH_WASM);
    assert_eq!(arch == Arch::RiscV, ARCH_RVV);
  }

  #[test]
  fn families_cover_every_arch() {
    assert_eq!(Arch::X86_32.family(), Family::X86);
    assert_eq!(Arch::X86_64.family(), Family::X86);
    assert_eq!(Arch::ArmA64.family(), Family::Arm);
    assert_eq!(Arch::ArmV7.family(), Family::Arm);
    assert_eq!(Arch::Other.family(), Family::Scalar);
  }

  #[test]
  #[allow(unexpected_cfgs)]
  fn has_target_feature_tolerates_unknown_names() {
    assert!(!has_target_feature!("definitely-not-a-feature"));
    #[cfg(target_arch = "x86_64")]
    assert!(has_target_feature!("sse2"));
  }
}
