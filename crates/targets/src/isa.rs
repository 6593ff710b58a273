//! Per-target constant bundles.
//!
//! Generic SIMD code is written once as `fn kernel<I: Isa>(..)` and
//! instantiated per target. Inside an instantiation exactly one bundle is in
//! scope: `I::ALIGN`, `I::MAX_BYTES`, `I::CAP_GE256` and friends all describe
//! the same target, so two targets' constants can never mix.
//!
//! ```
//! use targets::isa::{Avx2, Isa, Scalar};
//!
//! fn block_bytes<I: Isa>() -> usize {
//!   I::MAX_BYTES
//! }
//!
//! assert_eq!(block_bytes::<Avx2>(), 32);
//! assert_eq!(block_bytes::<Scalar>(), 8);
//! ```

use core::{fmt::Debug, hash::Hash};

use crate::target::Target;

// ─────────────────────────────────────────────────────────────────────────────
// TargetInfo
// ─────────────────────────────────────────────────────────────────────────────

/// Static description of one target's code generation environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetInfo {
  pub target: Target,
  /// Namespace tag for per-target symbols, e.g. `N_AVX2`.
  pub namespace: &'static str,
  /// Alignment in bytes of a full vector.
  pub align: usize,
  /// Largest vector size in bytes. For scalable targets (SVE, RVV) this is
  /// the architectural maximum, not the runtime length.
  pub max_bytes: usize,
  pub cap_integer64: bool,
  pub cap_float64: bool,
  /// Vectors of at least 256 bits.
  pub cap_ge256: bool,
  /// Vectors of at least 512 bits.
  pub cap_ge512: bool,
  /// Value for `#[target_feature(enable = ...)]`. Empty if the target needs
  /// no extra features beyond the architecture baseline.
  pub target_features: &'static str,
}

const fn info(
  target: Target,
  namespace: &'static str,
  align: usize,
  max_bytes: usize,
  caps: (bool, bool, bool, bool),
  target_features: &'static str,
) -> TargetInfo {
  TargetInfo {
    target,
    namespace,
    align,
    max_bytes,
    cap_integer64: caps.0,
    cap_float64: caps.1,
    cap_ge256: caps.2,
    cap_ge512: caps.3,
    target_features,
  }
}

// ─────────────────────────────────────────────────────────────────────────────
// x86 feature groups
// ─────────────────────────────────────────────────────────────────────────────
//
// The feature lists below are the only place x86 target features are spelled
// out. `__x86_features!` turns a target's group list either into
// `#[target_feature]` attributes on an item (used by `dynamic_dispatch!`) or,
// with `@str`, into the comma-separated string stored in `TargetInfo`. The
// optional groups follow the `disable-*` Cargo features of this crate, the
// same options CPU detection applies, so a target is never compiled with an
// instruction its selection did not check for.

const SSSE3_FEATURES: &str = crate::__x86_features!(Ssse3 @str);
const SSE4_FEATURES: &str = crate::__x86_features!(Sse4 @str);
const AVX2_FEATURES: &str = crate::__x86_features!(Avx2 @str);
const AVX3_FEATURES: &str = crate::__x86_features!(Avx3 @str);
const AVX3_DL_FEATURES: &str = crate::__x86_features!(Avx3Dl @str);

/// Feature groups of each x86 target, lowest first.
#[doc(hidden)]
#[macro_export]
macro_rules! __x86_features {
  (Ssse3 $($tail:tt)*) => {
    $crate::__x86_feature_list! { [ssse3] [] $($tail)* }
  };
  (Sse4 $($tail:tt)*) => {
    $crate::__x86_feature_list! { [ssse3 sse4 pclmul_aes] [] $($tail)* }
  };
  (Avx2 $($tail:tt)*) => {
    $crate::__x86_feature_list! { [ssse3 sse4 pclmul_aes avx2 bmi2_fma f16c] [] $($tail)* }
  };
  (Avx3 $($tail:tt)*) => {
    $crate::__x86_feature_list! { [ssse3 sse4 pclmul_aes avx2 bmi2_fma f16c avx3] [] $($tail)* }
  };
  (Avx3Dl $($tail:tt)*) => {
    $crate::__x86_feature_list! {
      [ssse3 sse4 pclmul_aes avx2 bmi2_fma f16c avx3 avx3_dl] [] $($tail)*
    }
  };
}

/// Resolves group names to feature strings, then emits the result.
#[doc(hidden)]
#[macro_export]
macro_rules! __x86_feature_list {
  ([] [$first:literal $($lit:literal)*] @str) => {
    concat!($first $(, ",", $lit)*)
  };
  ([] [$($lit:literal)*] $($item:tt)*) => {
    $(#[target_feature(enable = $lit)])*
    $($item)*
  };
  ([$group:ident $($rest:ident)*] $lits:tt $($tail:tt)*) => {
    $crate::__x86_group! { $group [$($rest)*] $lits $($tail)* }
  };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __x86_group {
  (ssse3 $($t:tt)*) => { $crate::__x86_group! { @push "sse2,ssse3" $($t)* } };
  (sse4 $($t:tt)*) => { $crate::__x86_group! { @push "sse4.1,sse4.2" $($t)* } };
  (pclmul_aes $($t:tt)*) => { $crate::__x86_pclmul_aes! { $($t)* } };
  (avx2 $($t:tt)*) => { $crate::__x86_group! { @push "avx,avx2,lzcnt" $($t)* } };
  (bmi2_fma $($t:tt)*) => { $crate::__x86_bmi2_fma! { $($t)* } };
  (f16c $($t:tt)*) => { $crate::__x86_f16c! { $($t)* } };
  (avx3 $($t:tt)*) => {
    $crate::__x86_group! { @push "avx512f,avx512vl,avx512dq,avx512bw" $($t)* }
  };
  (avx3_dl $($t:tt)*) => {
    $crate::__x86_group! {
      @push "avx512vnni,vpclmulqdq,avx512vbmi2,vaes,avx512bitalg" $($t)*
    }
  };
  (@push $new:literal $rest:tt [$($lit:literal)*] $($tail:tt)*) => {
    $crate::__x86_feature_list! { $rest [$($lit)* $new] $($tail)* }
  };
  (@skip $rest:tt $lits:tt $($tail:tt)*) => {
    $crate::__x86_feature_list! { $rest $lits $($tail)* }
  };
}

// ─── Optional groups ───

#[cfg(not(feature = "disable-pclmul-aes"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __x86_pclmul_aes {
  ($($t:tt)*) => { $crate::__x86_group! { @push "pclmulqdq,aes" $($t)* } };
}

#[cfg(feature = "disable-pclmul-aes")]
#[doc(hidden)]
#[macro_export]
macro_rules! __x86_pclmul_aes {
  ($($t:tt)*) => { $crate::__x86_group! { @skip $($t)* } };
}

#[cfg(not(feature = "disable-bmi2-fma"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __x86_bmi2_fma {
  ($($t:tt)*) => { $crate::__x86_group! { @push "bmi1,bmi2,fma" $($t)* } };
}

#[cfg(feature = "disable-bmi2-fma")]
#[doc(hidden)]
#[macro_export]
macro_rules! __x86_bmi2_fma {
  ($($t:tt)*) => { $crate::__x86_group! { @skip $($t)* } };
}

#[cfg(not(feature = "disable-f16c"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __x86_f16c {
  ($($t:tt)*) => { $crate::__x86_group! { @push "f16c" $($t)* } };
}

#[cfg(feature = "disable-f16c")]
#[doc(hidden)]
#[macro_export]
macro_rules! __x86_f16c {
  ($($t:tt)*) => { $crate::__x86_group! { @skip $($t)* } };
}

impl Target {
  /// The constant bundle for this target.
  #[must_use]
  pub const fn info(self) -> TargetInfo {
    // (integer64, float64, ge256, ge512)
    const SIMD128: (bool, bool, bool, bool) = (true, true, false, false);
    match self {
      Self::Scalar => info(self, "N_SCALAR", 8, 8, SIMD128, ""),
      Self::Ssse3 => info(self, "N_SSSE3", 16, 16, SIMD128, SSSE3_FEATURES),
      Self::Sse4 => info(self, "N_SSE4", 16, 16, SIMD128, SSE4_FEATURES),
      Self::Avx2 => info(self, "N_AVX2", 32, 32, (true, true, true, false), AVX2_FEATURES),
      Self::Avx3 => info(self, "N_AVX3", 64, 64, (true, true, true, true), AVX3_FEATURES),
      Self::Avx3Dl => info(self, "N_AVX3_DL", 64, 64, (true, true, true, true), AVX3_DL_FEATURES),
      // ARMv7 NEON has no f64 lanes.
      Self::Neon => info(self, "N_NEON", 16, 16, (true, cfg!(target_arch = "aarch64"), false, false), "neon"),
      Self::Sve => info(self, "N_SVE", 8, 256, SIMD128, "sve"),
      Self::Sve2 => info(self, "N_SVE2", 8, 256, SIMD128, "sve2"),
      Self::Ppc8 => info(self, "N_PPC8", 16, 16, SIMD128, "vsx,power8-vector"),
      Self::Wasm => info(self, "N_WASM", 16, 16, (false, false, false, false), "simd128"),
      Self::Rvv => info(self, "N_RVV", 8, 4096, SIMD128, "v"),
    }
  }
}

// ─────────────────────────────────────────────────────────────────────────────
// Isa
// ─────────────────────────────────────────────────────────────────────────────

mod sealed {
  pub trait Sealed {}
}

/// Compile-time handle for one target. Implemented by zero-sized types only.
pub trait Isa: sealed::Sealed + Copy + Default + Debug + Eq + Hash + Send + Sync + 'static {
  const TARGET: Target;
  const INFO: TargetInfo = Self::TARGET.info();
  const NAMESPACE: &'static str = Self::INFO.namespace;
  const ALIGN: usize = Self::INFO.align;
  const MAX_BYTES: usize = Self::INFO.max_bytes;
  const CAP_INTEGER64: bool = Self::INFO.cap_integer64;
  const CAP_FLOAT64: bool = Self::INFO.cap_float64;
  const CAP_GE256: bool = Self::INFO.cap_ge256;
  const CAP_GE512: bool = Self::INFO.cap_ge512;
  const TARGET_FEATURES: &'static str = Self::INFO.target_features;
}

macro_rules! isa_types {
  ($($(#[$meta:meta])* $name:ident => $target:ident;)+) => {
    $(
      $(#[$meta])*
      #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
      pub struct $name;

      impl sealed::Sealed for $name {}

      impl Isa for $name {
        const TARGET: Target = Target::$target;
      }
    )+
  };
}

isa_types! {
  /// Portable fallback, one lane per vector.
  Scalar => Scalar;
  Ssse3 => Ssse3;
  Sse4 => Sse4;
  Avx2 => Avx2;
  Avx3 => Avx3;
  Avx3Dl => Avx3Dl;
  Neon => Neon;
  Sve => Sve;
  Sve2 => Sve2;
  Ppc8 => Ppc8;
  Wasm => Wasm;
  Rvv => Rvv;
}

/// Maximum number of `T` lanes in one vector of `I`.
///
/// Scalar always has exactly one lane. Zero-sized `T` gets one lane per
/// byte.
#[inline(always)]
#[must_use]
pub const fn max_lanes<I: Isa, T>() -> usize {
  if I::TARGET as u32 == Target::Scalar as u32 {
    return 1;
  }
  if core::mem::size_of::<T>() == 0 {
    return I::MAX_BYTES;
  }
  let lanes = I::MAX_BYTES / core::mem::size_of::<T>();
  if lanes == 0 { 1 } else { lanes }
}
