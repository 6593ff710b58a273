//! x86 target detection via CPUID and XGETBV.
//!
//! Reading the registers ([`CpuidSnapshot::read`]) is separate from turning
//! them into targets ([`targets_from_cpuid`]), so the grouping rules can be
//! tested on any host with synthetic register values.

use crate::{
  policy::GroupOptions,
  target::{Target, TargetSet},
};

// ─────────────────────────────────────────────────────────────────────────────
// Feature flags
// ─────────────────────────────────────────────────────────────────────────────
//
// One bit per CPUID flag we care about. The layout is private; only the
// group masks below are used to derive targets.

const SSE: u64 = 1 << 0;
const SSE2: u64 = 1 << 1;
const SSE3: u64 = 1 << 2;
const SSSE3: u64 = 1 << 3;
const SSE41: u64 = 1 << 4;
const SSE42: u64 = 1 << 5;
const CLMUL: u64 = 1 << 6;
const AES: u64 = 1 << 7;
const AVX: u64 = 1 << 8;
const AVX2: u64 = 1 << 9;
const LZCNT: u64 = 1 << 10;
const BMI: u64 = 1 << 11;
const BMI2: u64 = 1 << 12;
const FMA: u64 = 1 << 13;
const F16C: u64 = 1 << 14;
const AVX512F: u64 = 1 << 15;
const AVX512VL: u64 = 1 << 16;
const AVX512DQ: u64 = 1 << 17;
const AVX512BW: u64 = 1 << 18;
const VNNI: u64 = 1 << 19;
const VPCLMULQDQ: u64 = 1 << 20;
const VBMI2: u64 = 1 << 21;
const VAES: u64 = 1 << 22;
const BITALG: u64 = 1 << 23;

/// Flags each target needs, including those of the targets below it.
const fn group_flags(target: Target, options: GroupOptions) -> u64 {
  let ssse3 = SSE | SSE2 | SSE3 | SSSE3;

  let mut sse4 = ssse3 | SSE41 | SSE42;
  if options.require_pclmul_aes {
    sse4 |= CLMUL | AES;
  }

  let mut avx2 = sse4 | AVX | AVX2 | LZCNT;
  if options.require_bmi2_fma {
    avx2 |= BMI | BMI2 | FMA;
  }
  if options.require_f16c {
    avx2 |= F16C;
  }

  let avx3 = avx2 | AVX512F | AVX512VL | AVX512DQ | AVX512BW;
  let avx3_dl = avx3 | VNNI | VPCLMULQDQ | VBMI2 | VAES | BITALG;

  match target {
    Target::Ssse3 => ssse3,
    Target::Sse4 => sse4,
    Target::Avx2 => avx2,
    Target::Avx3 => avx3,
    Target::Avx3Dl => avx3_dl,
    _ => 0,
  }
}

// ─── XCR0 state components ───
const XCR0_SSE: u64 = 1 << 1;
const XCR0_AVX: u64 = 1 << 2;
// opmask + ZMM_Hi256 + Hi16_ZMM
const XCR0_AVX512: u64 = 0xE0;

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Raw CPUID/XCR0 values consumed by [`targets_from_cpuid`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuidSnapshot {
  /// Highest standard leaf (leaf 0 EAX).
  pub max_leaf: u32,
  /// Highest extended leaf (leaf 0x8000_0000 EAX).
  pub max_ext_leaf: u32,
  pub leaf1_ecx: u32,
  pub leaf1_edx: u32,
  pub leaf7_ebx: u32,
  pub leaf7_ecx: u32,
  /// Leaf 0x8000_0001 ECX.
  pub ext1_ecx: u32,
  /// XCR0, present only when the OS enabled XSAVE (OSXSAVE).
  pub xcr0: Option<u64>,
}

#[inline(always)]
const fn bit(reg: u32, n: u32) -> bool {
  reg & (1 << n) != 0
}

impl CpuidSnapshot {
  /// Collects the CPUID feature flags we know about.
  #[must_use]
  pub const fn flags(&self) -> u64 {
    let mut flags = 0u64;

    macro_rules! check {
      ($reg:expr; $($n:literal => $flag:ident),+ $(,)?) => {
        $(if bit($reg, $n) { flags |= $flag; })+
      };
    }

    // ─── Leaf 1 ───
    check!(self.leaf1_edx; 25 => SSE, 26 => SSE2);
    check!(self.leaf1_ecx;
      0 => SSE3,
      1 => CLMUL,
      9 => SSSE3,
      12 => FMA,
      19 => SSE41,
      20 => SSE42,
      25 => AES,
      28 => AVX,
      29 => F16C,
    );

    // ─── Leaf 0x8000_0001 ───
    if self.max_ext_leaf >= 0x8000_0001 {
      check!(self.ext1_ecx; 5 => LZCNT);
    }

    // ─── Leaf 7 ───
    if self.max_leaf >= 7 {
      check!(self.leaf7_ebx;
        3 => BMI,
        5 => AVX2,
        8 => BMI2,
        16 => AVX512F,
        17 => AVX512DQ,
        30 => AVX512BW,
        31 => AVX512VL,
      );
      check!(self.leaf7_ecx;
        6 => VBMI2,
        9 => VAES,
        10 => VPCLMULQDQ,
        11 => VNNI,
        12 => BITALG,
      );
    }

    flags
  }

  /// Reads CPUID and XCR0 from the running CPU.
  #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
  #[allow(unused_unsafe)] // CPUID intrinsics are safe on recent toolchains.
  #[must_use]
  pub fn read() -> Self {
    #[cfg(target_arch = "x86")]
    use core::arch::x86::{__cpuid, __cpuid_count, _xgetbv};
    #[cfg(target_arch = "x86_64")]
    use core::arch::x86_64::{__cpuid, __cpuid_count, _xgetbv};

    // SAFETY: CPUID exists on every x86-64 CPU and on every 32-bit CPU that
    // can run SSE code, which `has_cpuid` checks before calling us.
    let leaf0 = unsafe { __cpuid(0) };
    // SAFETY: as above.
    let leaf1 = unsafe { __cpuid(1) };
    // SAFETY: as above; out-of-range extended leaves return garbage, not a fault.
    let ext0 = unsafe { __cpuid(0x8000_0000) };

    let mut snapshot = Self {
      max_leaf: leaf0.eax,
      max_ext_leaf: ext0.eax,
      leaf1_ecx: leaf1.ecx,
      leaf1_edx: leaf1.edx,
      ..Self::default()
    };

    if snapshot.max_ext_leaf >= 0x8000_0001 {
      // SAFETY: as above; the extended leaf is in range.
      snapshot.ext1_ecx = unsafe { __cpuid(0x8000_0001) }.ecx;
    }

    if snapshot.max_leaf >= 7 {
      // SAFETY: as above; leaf 7 is in range.
      let leaf7 = unsafe { __cpuid_count(7, 0) };
      snapshot.leaf7_ebx = leaf7.ebx;
      snapshot.leaf7_ecx = leaf7.ecx;
    }

    // OSXSAVE (leaf 1 ECX bit 27): the OS has enabled XGETBV.
    if bit(leaf1.ecx, 27) {
      // SAFETY: XGETBV is available when OSXSAVE is set (checked above).
      snapshot.xcr0 = Some(unsafe { _xgetbv(0) });
    }

    snapshot
  }
}

// ─────────────────────────────────────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────────────────────────────────────

/// Maps a CPUID snapshot to supported targets. Always includes SCALAR.
///
/// A target is supported only if every flag in its group is present. When
/// XCR0 is readable, targets whose register state the OS does not save are
/// removed:
///
/// - XMM state missing: every x86 SIMD target.
/// - YMM state missing: AVX2, AVX3, AVX3_DL.
/// - Opmask/ZMM state missing: AVX3, AVX3_DL.
#[must_use]
pub const fn targets_from_cpuid(snapshot: &CpuidSnapshot, options: GroupOptions) -> TargetSet {
  let flags = snapshot.flags();
  let mut set = Target::Scalar.set();

  let levels = [Target::Ssse3, Target::Sse4, Target::Avx2, Target::Avx3, Target::Avx3Dl];
  let mut i = 0;
  while i < levels.len() {
    let needed = group_flags(levels[i], options);
    if flags & needed == needed {
      set = set.with(levels[i]);
    }
    i += 1;
  }

  if let Some(xcr0) = snapshot.xcr0 {
    if xcr0 & XCR0_SSE == 0 {
      set = set
        .without(Target::Ssse3)
        .without(Target::Sse4)
        .without(Target::Avx2)
        .without(Target::Avx3)
        .without(Target::Avx3Dl);
    }
    if xcr0 & XCR0_AVX == 0 {
      set = set.without(Target::Avx2).without(Target::Avx3).without(Target::Avx3Dl);
    }
    if xcr0 & XCR0_AVX512 != XCR0_AVX512 {
      set = set.without(Target::Avx3).without(Target::Avx3Dl);
    }
  }

  set
}

/// Whether the CPUID instruction can be executed.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[inline]
fn has_cpuid() -> bool {
  // Every x86-64 CPU has CPUID. On 32-bit x86 we only trust it when the
  // build already assumes SSE, which postdates CPUID.
  cfg!(any(target_arch = "x86_64", target_feature = "sse"))
}

/// Probes the running CPU.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[must_use]
pub(crate) fn detect() -> TargetSet {
  if !has_cpuid() {
    tracing::debug!(target: "targets", "CPUID unavailable; scalar only");
    return Target::Scalar.set();
  }
  let snapshot = CpuidSnapshot::read();
  let supported = targets_from_cpuid(&snapshot, GroupOptions::FROM_FEATURES);
  tracing::debug!(
    target: "targets",
    max_leaf = snapshot.max_leaf,
    xcr0 = ?snapshot.xcr0,
    %supported,
    "probed x86 targets"
  );
  supported
}

#[cfg(test)]
mod tests {
  use super::*;

  const ALL_XCR0: Option<u64> = Some(0xE7);

  /// A CPU with every flag we check for set.
  fn icelake() -> CpuidSnapshot {
    CpuidSnapshot {
      max_leaf: 0x1B,
      max_ext_leaf: 0x8000_0008,
      // SSE3 CLMUL SSSE3 FMA SSE4.1 SSE4.2 AES OSXSAVE AVX F16C
      leaf1_ecx: 0x3A18_1203,
      leaf1_edx: (1 << 25) | (1 << 26),
      leaf7_ebx: (1 << 3) | (1 << 5) | (1 << 8) | (1 << 16) | (1 << 17) | (1 << 30) | (1 << 31),
      leaf7_ecx: (1 << 6) | (1 << 9) | (1 << 10) | (1 << 11) | (1 << 12),
      ext1_ecx: 1 << 5,
      xcr0: ALL_XCR0,
    }
  }

  fn targets(s: &CpuidSnapshot) -> TargetSet {
    targets_from_cpuid(s, GroupOptions::ALL_REQUIRED)
  }

  #[test]
  fn full_cpu_supports_every_x86_target() {
    use Target::*;
    assert_eq!(targets(&icelake()), Scalar | Ssse3 | Sse4 | Avx2 | Avx3 | Avx3Dl);
  }

  #[test]
  fn empty_cpu_is_scalar() {
    assert_eq!(targets(&CpuidSnapshot::default()), Target::Scalar.set());
  }

  #[test]
  fn missing_member_drops_group_and_above() {
    use Target::*;

    // No LZCNT: AVX2 and everything above it goes.
    let s = CpuidSnapshot { ext1_ecx: 0, ..icelake() };
    assert_eq!(targets(&s), Scalar | Ssse3 | Sse4);

    // No AES: SSE4 and above go, SSSE3 stays.
    let s = CpuidSnapshot { leaf1_ecx: icelake().leaf1_ecx & !(1 << 25), ..icelake() };
    assert_eq!(targets(&s), Scalar | Ssse3);

    // No BITALG: only AVX3_DL goes.
    let s = CpuidSnapshot { leaf7_ecx: icelake().leaf7_ecx & !(1 << 12), ..icelake() };
    assert_eq!(targets(&s), Scalar | Ssse3 | Sse4 | Avx2 | Avx3);
  }

  #[test]
  fn optional_members_can_be_relaxed() {
    let no_f16c = CpuidSnapshot { leaf1_ecx: icelake().leaf1_ecx & !(1 << 29), ..icelake() };
    assert!(!targets(&no_f16c).contains(Target::Avx2));

    let relaxed = GroupOptions { require_f16c: false, ..GroupOptions::ALL_REQUIRED };
    assert!(targets_from_cpuid(&no_f16c, relaxed).contains(Target::Avx2));

    let no_bmi2 = CpuidSnapshot { leaf7_ebx: icelake().leaf7_ebx & !(1 << 8), ..icelake() };
    let relaxed = GroupOptions { require_bmi2_fma: false, ..GroupOptions::ALL_REQUIRED };
    assert!(targets_from_cpuid(&no_bmi2, relaxed).contains(Target::Avx3Dl));
  }

  #[test]
  fn leaf7_ignored_when_out_of_range() {
    use Target::*;
    let s = CpuidSnapshot { max_leaf: 6, ..icelake() };
    assert_eq!(targets(&s), Scalar | Ssse3 | Sse4);
  }

  #[test]
  fn extended_leaf_ignored_when_out_of_range() {
    let s = CpuidSnapshot { max_ext_leaf: 0x8000_0000, ..icelake() };
    assert!(!targets(&s).contains(Target::Avx2));
  }

  #[test]
  fn xcr0_gates_register_state() {
    use Target::*;

    let no_xmm = CpuidSnapshot { xcr0: Some(0xE5), ..icelake() };
    assert_eq!(targets(&no_xmm), Scalar.set());

    let no_ymm = CpuidSnapshot { xcr0: Some(0xE3), ..icelake() };
    assert_eq!(targets(&no_ymm), Scalar | Ssse3 | Sse4);

    let no_zmm = CpuidSnapshot { xcr0: Some(0x07), ..icelake() };
    assert_eq!(targets(&no_zmm), Scalar | Ssse3 | Sse4 | Avx2);

    let partial_zmm = CpuidSnapshot { xcr0: Some(0x67), ..icelake() };
    assert_eq!(targets(&partial_zmm), Scalar | Ssse3 | Sse4 | Avx2);
  }

  #[test]
  fn no_osxsave_skips_xcr0_checks() {
    let s = CpuidSnapshot { xcr0: None, ..icelake() };
    assert_eq!(targets(&s), targets(&icelake()));
  }

  /// CPUID flag a `#[target_feature]` name stands for.
  fn flag_of(feature: &str) -> u64 {
    match feature {
      "sse2" => SSE2,
      "ssse3" => SSSE3,
      "sse4.1" => SSE41,
      "sse4.2" => SSE42,
      "pclmulqdq" => CLMUL,
      "aes" => AES,
      "avx" => AVX,
      "avx2" => AVX2,
      "lzcnt" => LZCNT,
      "bmi1" => BMI,
      "bmi2" => BMI2,
      "fma" => FMA,
      "f16c" => F16C,
      "avx512f" => AVX512F,
      "avx512vl" => AVX512VL,
      "avx512dq" => AVX512DQ,
      "avx512bw" => AVX512BW,
      "avx512vnni" => VNNI,
      "vpclmulqdq" => VPCLMULQDQ,
      "avx512vbmi2" => VBMI2,
      "vaes" => VAES,
      "avx512bitalg" => BITALG,
      other => panic!("unmapped target feature {other}"),
    }
  }

  #[test]
  fn codegen_features_are_checked_by_detection() {
    let levels = [Target::Ssse3, Target::Sse4, Target::Avx2, Target::Avx3, Target::Avx3Dl];
    for t in levels {
      let checked = group_flags(t, GroupOptions::FROM_FEATURES);
      let features = t.info().target_features;
      for feature in features.split(',') {
        assert_ne!(checked & flag_of(feature), 0, "{t} enables {feature} without detecting it");
      }
      // And every checked flag with a codegen name is enabled.
      for bit in 0..64 {
        let flag = 1u64 << bit;
        if checked & flag == 0 || matches!(flag, SSE | SSE3) {
          continue;
        }
        assert!(
          features.split(',').any(|f| flag_of(f) == flag),
          "{t} detects flag bit {bit} but does not enable it"
        );
      }
    }
  }

  #[test]
  fn avx2_without_bmi2_fma() {
    use crate::isa::{Avx2, Isa};

    // AVX2 and LZCNT present, BMI1/BMI2/FMA hidden (as some VMs do).
    let s = CpuidSnapshot {
      leaf1_ecx: icelake().leaf1_ecx & !(1 << 12),
      leaf7_ebx: 1 << 5,
      xcr0: Some(0x07),
      ..icelake()
    };
    let selected = targets_from_cpuid(&s, GroupOptions::FROM_FEATURES).contains(Target::Avx2);
    let enables_bmi2_fma = Avx2::TARGET_FEATURES.split(',').any(|f| matches!(f, "bmi1" | "bmi2" | "fma"));
    assert_eq!(selected, cfg!(feature = "disable-bmi2-fma"));
    assert_eq!(enables_bmi2_fma, !cfg!(feature = "disable-bmi2-fma"));
    assert!(!(selected && enables_bmi2_fma));
  }

  #[test]
  #[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), not(miri)))]
  fn live_probe_agrees_with_std_detection() {
    let supported = detect();
    if supported.contains(Target::Avx2) {
      assert!(std::arch::is_x86_feature_detected!("avx2"));
      assert!(std::arch::is_x86_feature_detected!("fma") || cfg!(feature = "disable-bmi2-fma"));
    }
    if supported.contains(Target::Sse4) {
      assert!(std::arch::is_x86_feature_detected!("sse4.2"));
    }
    if supported.contains(Target::Avx3) {
      assert!(std::arch::is_x86_feature_detected!("avx512bw"));
    }
  }
}
