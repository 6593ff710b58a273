//! Target policy: pure functions from build facts to target sets.
//!
//! Everything here is a `const fn` over explicit inputs so each rule can be
//! tested with synthetic architectures and compilers. [`crate::config`]
//! evaluates them once for the actual build.

use crate::{
  arch::Arch,
  compiler::{Backend, Compiler},
  target::{Target, TargetSet},
};

// ─────────────────────────────────────────────────────────────────────────────
// Broken targets
// ─────────────────────────────────────────────────────────────────────────────

/// Targets the compiler cannot correctly generate code for.
///
/// First matching rule wins:
///
/// | Condition                        | Broken                     |
/// |----------------------------------|----------------------------|
/// | x86 and LLVM < 7.0               | SSE4, AVX2, AVX3, AVX3_DL  |
/// | x86-32                           | AVX2, AVX3, AVX3_DL        |
/// | MSVC environment                 | AVX3, AVX3_DL              |
/// | big-endian ARMv7                 | NEON                       |
/// | LLVM < 11.0 or GCC < 10.0        | SVE, SVE2                  |
/// | Cranelift                        | AVX3, AVX3_DL, SVE, SVE2   |
#[must_use]
pub const fn broken_targets(arch: Arch, compiler: Compiler, big_endian: bool) -> TargetSet {
  const fn llvm_before(compiler: Compiler, version: u32) -> bool {
    compiler.is_llvm() && compiler.version < version
  }

  if arch.is_x86() && llvm_before(compiler, 700) {
    Target::Sse4.set().with(Target::Avx2).with(Target::Avx3).with(Target::Avx3Dl)
  } else if matches!(arch, Arch::X86_32) {
    Target::Avx2.set().with(Target::Avx3).with(Target::Avx3Dl)
  } else if compiler.msvc {
    Target::Avx3.set().with(Target::Avx3Dl)
  } else if matches!(arch, Arch::ArmV7) && big_endian {
    Target::Neon.set()
  } else if llvm_before(compiler, 1100) || (compiler.is_gcc() && compiler.version < 1000) {
    Target::Sve.set().with(Target::Sve2)
  } else if compiler.is_cranelift() {
    Target::Avx3.set().with(Target::Avx3Dl).with(Target::Sve).with(Target::Sve2)
  } else {
    TargetSet::NONE
  }
}

/// `x` minus everything disabled or broken.
#[inline]
#[must_use]
pub const fn enabled_in(x: TargetSet, disabled: TargetSet, broken: TargetSet) -> TargetSet {
  x.difference(disabled.union(broken))
}

// ─────────────────────────────────────────────────────────────────────────────
// Baseline
// ─────────────────────────────────────────────────────────────────────────────

/// Compiler-enabled target features relevant to baseline inference.
///
/// Mirrors `cfg!(target_feature = ...)`; see [`BaselineFeatures::from_cfg`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct BaselineFeatures {
  pub ssse3: bool,
  pub sse41: bool,
  pub sse42: bool,
  pub pclmulqdq: bool,
  pub aes: bool,
  pub avx: bool,
  pub avx2: bool,
  pub bmi1: bool,
  pub bmi2: bool,
  pub fma: bool,
  pub f16c: bool,
  pub avx512f: bool,
  pub avx512vl: bool,
  pub avx512dq: bool,
  pub avx512bw: bool,
  pub avx512vnni: bool,
  pub vpclmulqdq: bool,
  pub avx512vbmi2: bool,
  pub vaes: bool,
  pub avx512bitalg: bool,
  pub neon: bool,
  pub sve: bool,
  pub sve2: bool,
  pub simd128: bool,
  pub rvv: bool,
}

impl BaselineFeatures {
  /// Features enabled for this build (`-C target-feature`, `-C target-cpu`).
  #[must_use]
  pub const fn from_cfg() -> Self {
    macro_rules! detect {
      ($($field:ident => $feature:literal),+ $(,)?) => {
        Self { $($field: cfg!(target_feature = $feature),)+ }
      };
    }

    detect! {
      ssse3 => "ssse3",
      sse41 => "sse4.1",
      sse42 => "sse4.2",
      pclmulqdq => "pclmulqdq",
      aes => "aes",
      avx => "avx",
      avx2 => "avx2",
      bmi1 => "bmi1",
      bmi2 => "bmi2",
      fma => "fma",
      f16c => "f16c",
      avx512f => "avx512f",
      avx512vl => "avx512vl",
      avx512dq => "avx512dq",
      avx512bw => "avx512bw",
      avx512vnni => "avx512vnni",
      vpclmulqdq => "vpclmulqdq",
      avx512vbmi2 => "avx512vbmi2",
      vaes => "vaes",
      avx512bitalg => "avx512bitalg",
      neon => "neon",
      sve => "sve",
      sve2 => "sve2",
      simd128 => "simd128",
      rvv => "v",
    }
  }
}

/// Optional members of the x86 feature groups.
///
/// Turning one off (Cargo features `disable-bmi2-fma`, `disable-f16c`,
/// `disable-pclmul-aes`) lets a target be selected on CPUs or VMs that lack
/// those instructions; kernels must then avoid them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupOptions {
  pub require_bmi2_fma: bool,
  pub require_f16c: bool,
  pub require_pclmul_aes: bool,
}

impl GroupOptions {
  pub const ALL_REQUIRED: Self = Self {
    require_bmi2_fma: true,
    require_f16c: true,
    require_pclmul_aes: true,
  };

  /// Options selected by Cargo features.
  pub const FROM_FEATURES: Self = Self {
    require_bmi2_fma: !cfg!(feature = "disable-bmi2-fma"),
    require_f16c: !cfg!(feature = "disable-f16c"),
    require_pclmul_aes: !cfg!(feature = "disable-pclmul-aes"),
  };
}

/// How sub-features are inferred from what the toolchain reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureInference {
  /// Each feature is reported individually (rustc).
  PerFeature,
  /// Only the top-level switch is reported; lower levels are implied. AVX
  /// implies SSSE3 and SSE4 (including CLMUL and AES); AVX2 implies BMI2, FMA
  /// and F16C. This is how `/arch:AVX2`-style toolchains behave.
  Transitive,
}

/// Baseline targets: those the compiler may use anywhere without dispatch.
///
/// Always includes SCALAR. PPC8 is never part of the baseline because no
/// PPC8 code is generated yet.
#[must_use]
pub const fn baseline_targets(
  arch: Arch,
  mut f: BaselineFeatures,
  options: GroupOptions,
  inference: FeatureInference,
) -> TargetSet {
  let mut set = Target::Scalar.set();

  if arch.is_x86() {
    if matches!(inference, FeatureInference::Transitive) {
      if f.avx {
        f.ssse3 = true;
        f.sse41 = true;
        f.sse42 = true;
        f.pclmulqdq = true;
        f.aes = true;
      }
      if f.avx2 {
        f.bmi1 = true;
        f.bmi2 = true;
        f.fma = true;
        f.f16c = true;
      }
    }

    if f.ssse3 {
      set = set.with(Target::Ssse3);
    }

    let sse4 = f.ssse3
      && f.sse41
      && f.sse42
      && (!options.require_pclmul_aes || (f.pclmulqdq && f.aes));
    if sse4 {
      set = set.with(Target::Sse4);
    }

    let avx2 = sse4
      && f.avx
      && f.avx2
      && (!options.require_bmi2_fma || (f.bmi1 && f.bmi2 && f.fma))
      && (!options.require_f16c || f.f16c);
    if avx2 {
      set = set.with(Target::Avx2);
    }

    let avx3 = avx2 && f.avx512f && f.avx512vl && f.avx512dq && f.avx512bw;
    if avx3 {
      set = set.with(Target::Avx3);
    }

    let avx3_dl = avx3 && f.avx512vnni && f.vpclmulqdq && f.avx512vbmi2 && f.vaes && f.avx512bitalg;
    if avx3_dl {
      set = set.with(Target::Avx3Dl);
    }
  }

  if matches!(arch, Arch::ArmA64 | Arch::ArmV7) {
    if f.neon {
      set = set.with(Target::Neon);
    }
    if f.sve {
      set = set.with(Target::Sve);
    }
    if f.sve2 {
      set = set.with(Target::Sve2);
    }
  }

  if matches!(arch, Arch::Wasm) && f.simd128 {
    set = set.with(Target::Wasm);
  }

  if matches!(arch, Arch::RiscV) && f.rvv {
    set = set.with(Target::Rvv);
  }

  set
}

// ─────────────────────────────────────────────────────────────────────────────
// Static, attainable and dynamic targets
// ─────────────────────────────────────────────────────────────────────────────

/// Dispatch policy: which targets get compiled for runtime selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Policy {
  /// Only the scalar fallback (`compile-only-scalar`).
  ScalarOnly,
  /// Only the static target; no dispatch (`compile-only-static`).
  StaticOnly,
  /// Every attainable target (`compile-all-attainable`, and this crate's
  /// own unit tests).
  AllAttainable,
  /// Attainable targets no worse than the static target.
  Default,
}

impl Policy {
  #[must_use]
  pub const fn name(self) -> &'static str {
    match self {
      Self::ScalarOnly => "scalar-only",
      Self::StaticOnly => "static-only",
      Self::AllAttainable => "all-attainable",
      Self::Default => "default",
    }
  }
}

/// The single target that code outside dispatch is compiled for.
///
/// Best of the enabled baseline, or SCALAR under [`Policy::ScalarOnly`].
/// Falls back to SCALAR if the enabled baseline is empty.
#[must_use]
pub const fn static_target(policy: Policy, enabled_baseline: TargetSet) -> Target {
  if matches!(policy, Policy::ScalarOnly) {
    return Target::Scalar;
  }
  match enabled_baseline.best() {
    Some(t) => t,
    None => Target::Scalar,
  }
}

/// Targets this architecture could ever dispatch to, given the compiler.
///
/// x86 can reach every level from SSSE3 to AVX3; AVX3_DL only on request
/// (`want_avx3_dl`) or when already in the baseline. Other architectures have
/// no runtime detection, so only the enabled baseline is attainable.
#[must_use]
pub const fn attainable_targets(
  arch: Arch,
  enabled_baseline: TargetSet,
  disabled: TargetSet,
  broken: TargetSet,
  want_avx3_dl: bool,
) -> TargetSet {
  if !arch.is_x86() {
    return enabled_baseline;
  }
  let mut candidates = Target::Scalar
    .set()
    .with(Target::Ssse3)
    .with(Target::Sse4)
    .with(Target::Avx2)
    .with(Target::Avx3);
  if want_avx3_dl || enabled_baseline.contains(Target::Avx3Dl) {
    candidates = candidates.with(Target::Avx3Dl);
  }
  enabled_in(candidates, disabled, broken)
}

/// The dynamic target set: everything a dispatch table gets a slot for.
#[must_use]
pub const fn dynamic_targets(policy: Policy, static_target: Target, attainable: TargetSet) -> TargetSet {
  match policy {
    Policy::ScalarOnly => Target::Scalar.set(),
    Policy::StaticOnly => static_target.set(),
    Policy::AllAttainable => attainable,
    // Static target and every better one: bits at or below the static bit
    // are `2 * static - 1`.
    Policy::Default => {
      let at_or_below = (static_target.bits() << 1).wrapping_sub(1);
      attainable.intersection(TargetSet::from_bits_retain(at_or_below))
    }
  }
}
