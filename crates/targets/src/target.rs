//! Targets, target families and target sets.
//!
//! A [`Target`] is one instruction-set level we can generate code for. Each
//! target owns a single bit of a `u32`; within a [`Family`], a lower bit is a
//! better target. A [`TargetSet`] is any combination of those bits.
//!
//! # Bit Layout
//!
//! | Bits    | Family | Targets                                  |
//! |---------|--------|------------------------------------------|
//! | 0-9     | x86    | AVX3_DL (2), AVX3 (3), AVX2 (4), SSE4 (6), SSSE3 (7) |
//! | 10-13   | ARM    | SVE2 (10), SVE (11), NEON (13)           |
//! | 14-18   | PPC    | PPC8 (16)                                |
//! | 19-20   | WASM   | WASM (20)                                |
//! | 21-24   | RISC-V | RVV (24)                                 |
//! | 29      | -      | SCALAR                                   |
//!
//! Unassigned bits inside a family are reserved (bit 5 was AVX) and keep
//! their dispatch slot.

use core::{
  fmt,
  ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, Not},
  str::FromStr,
};

use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Target
// ─────────────────────────────────────────────────────────────────────────────

/// A single SIMD target. The discriminant is the target's bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum Target {
  /// AVX-512 with VNNI, VPCLMULQDQ, VBMI2, VAES and BITALG (Ice Lake).
  Avx3Dl = 1 << 2,
  /// AVX-512 F/VL/DQ/BW (Skylake-X).
  Avx3 = 1 << 3,
  /// AVX2 + BMI2 + FMA + F16C (Haswell).
  Avx2 = 1 << 4,
  /// SSE4.1/4.2 + CLMUL + AES (Westmere).
  Sse4 = 1 << 6,
  Ssse3 = 1 << 7,
  Sve2 = 1 << 10,
  Sve = 1 << 11,
  Neon = 1 << 13,
  Ppc8 = 1 << 16,
  Wasm = 1 << 20,
  Rvv = 1 << 24,
  Scalar = 1 << 29,
}

impl Target {
  /// Every target, best first within each family, scalar last.
  pub const ALL: [Self; 12] = [
    Self::Avx3Dl,
    Self::Avx3,
    Self::Avx2,
    Self::Sse4,
    Self::Ssse3,
    Self::Sve2,
    Self::Sve,
    Self::Neon,
    Self::Ppc8,
    Self::Wasm,
    Self::Rvv,
    Self::Scalar,
  ];

  #[inline(always)]
  #[must_use]
  pub const fn bits(self) -> u32 {
    self as u32
  }

  /// A set holding just this target.
  #[inline(always)]
  #[must_use]
  pub const fn set(self) -> TargetSet {
    TargetSet(self.bits())
  }

  /// Bit position of this target.
  #[inline]
  #[must_use]
  pub const fn index(self) -> u32 {
    self.bits().trailing_zeros()
  }

  /// Returns the target whose bit is exactly `bits`.
  #[must_use]
  pub const fn from_bit(bits: u32) -> Option<Self> {
    let mut i = 0;
    while i < Self::ALL.len() {
      if Self::ALL[i].bits() == bits {
        return Some(Self::ALL[i]);
      }
      i += 1;
    }
    None
  }

  #[must_use]
  pub const fn name(self) -> &'static str {
    match self {
      Self::Avx3Dl => "AVX3_DL",
      Self::Avx3 => "AVX3",
      Self::Avx2 => "AVX2",
      Self::Sse4 => "SSE4",
      Self::Ssse3 => "SSSE3",
      Self::Sve2 => "SVE2",
      Self::Sve => "SVE",
      Self::Neon => "NEON",
      Self::Ppc8 => "PPC8",
      Self::Wasm => "WASM",
      Self::Rvv => "RVV",
      Self::Scalar => "SCALAR",
    }
  }

  #[must_use]
  pub const fn family(self) -> Family {
    match self {
      Self::Avx3Dl | Self::Avx3 | Self::Avx2 | Self::Sse4 | Self::Ssse3 => Family::X86,
      Self::Sve2 | Self::Sve | Self::Neon => Family::Arm,
      Self::Ppc8 => Family::Ppc,
      Self::Wasm => Family::Wasm,
      Self::Rvv => Family::Rvv,
      Self::Scalar => Family::Scalar,
    }
  }

  /// Looks up a target by name, ignoring ASCII case and treating `-` as `_`.
  #[must_use]
  pub const fn from_name(name: &[u8]) -> Option<Self> {
    let mut i = 0;
    while i < Self::ALL.len() {
      if name_matches(name, Self::ALL[i].name().as_bytes()) {
        return Some(Self::ALL[i]);
      }
      i += 1;
    }
    None
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Target {
  type Err = ParseTargetError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.is_empty() {
      return Err(ParseTargetError::Empty);
    }
    Self::from_name(s.as_bytes()).ok_or(ParseTargetError::UnknownTarget)
  }
}

const fn name_matches(input: &[u8], name: &[u8]) -> bool {
  if input.len() != name.len() {
    return false;
  }
  let mut i = 0;
  while i < input.len() {
    let c = match input[i] {
      b'-' => b'_',
      c => c.to_ascii_uppercase(),
    };
    if c != name[i] {
      return false;
    }
    i += 1;
  }
  true
}

// ─────────────────────────────────────────────────────────────────────────────
// Family
// ─────────────────────────────────────────────────────────────────────────────

/// A group of targets that can coexist in one binary.
///
/// Each family owns a contiguous bit range. Dispatch only ever selects among
/// the current family's targets plus scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Family {
  X86,
  Arm,
  Ppc,
  Wasm,
  Rvv,
  Scalar,
}

impl Family {
  pub const ALL: [Self; 6] = [Self::X86, Self::Arm, Self::Ppc, Self::Wasm, Self::Rvv, Self::Scalar];

  /// Highest (worst) bit position reserved for this family.
  #[must_use]
  pub const fn highest_bit(self) -> u32 {
    match self {
      Self::X86 => 9,
      Self::Arm => 13,
      Self::Ppc => 18,
      Self::Wasm => 20,
      Self::Rvv => 24,
      Self::Scalar => 29,
    }
  }

  /// Number of bits (and dispatch slots) reserved for this family.
  #[must_use]
  pub const fn max_dynamic_targets(self) -> u32 {
    match self {
      Self::X86 => 10,
      Self::Arm => 4,
      Self::Ppc => 5,
      Self::Wasm => 2,
      Self::Rvv => 4,
      Self::Scalar => 1,
    }
  }

  /// Lowest (best) bit position reserved for this family.
  #[must_use]
  pub const fn lowest_bit(self) -> u32 {
    self.highest_bit() + 1 - self.max_dynamic_targets()
  }

  /// Mask covering the family's bit range.
  #[must_use]
  pub const fn range(self) -> TargetSet {
    let width = self.max_dynamic_targets();
    TargetSet::from_bits_retain(((1u32 << width) - 1) << self.lowest_bit())
  }

  /// Targets assigned to this family, best first.
  #[must_use]
  pub const fn targets(self) -> TargetSet {
    let mut set = TargetSet::NONE;
    let mut i = 0;
    while i < Target::ALL.len() {
      let t = Target::ALL[i];
      if t.family() as u8 == self as u8 {
        set = set.with(t);
      }
      i += 1;
    }
    set
  }
}

const _: () = {
  let mut i = 0;
  while i < Family::ALL.len() {
    let a = Family::ALL[i];
    assert!(a.highest_bit() < 32, "family range exceeds 32 bits");
    assert!(
      a.range().contains_all(a.targets()),
      "target outside its family range"
    );
    let mut j = i + 1;
    while j < Family::ALL.len() {
      let b = Family::ALL[j];
      assert!(a.range().intersection(b.range()).is_empty(), "family ranges overlap");
      j += 1;
    }
    i += 1;
  }
};

// ─────────────────────────────────────────────────────────────────────────────
// TargetSet
// ─────────────────────────────────────────────────────────────────────────────

/// A set of targets: a `u32` with one bit per [`Target`].
///
/// All operations are `const`, so target policy can be computed at compile
/// time.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TargetSet(u32);

impl TargetSet {
  pub const NONE: Self = Self(0);

  /// Every defined target.
  pub const ALL: Self = {
    let mut set = Self::NONE;
    let mut i = 0;
    while i < Target::ALL.len() {
      set = set.with(Target::ALL[i]);
      i += 1;
    }
    set
  };

  /// Keeps only the bits of defined targets.
  #[inline]
  #[must_use]
  pub const fn from_bits(bits: u32) -> Self {
    Self(bits & Self::ALL.0)
  }

  /// Wraps raw bits, including reserved ones. Used for masks.
  #[inline]
  #[must_use]
  pub const fn from_bits_retain(bits: u32) -> Self {
    Self(bits)
  }

  #[inline(always)]
  #[must_use]
  pub const fn bits(self) -> u32 {
    self.0
  }

  #[inline(always)]
  #[must_use]
  pub const fn contains(self, target: Target) -> bool {
    self.0 & target.bits() != 0
  }

  /// True if every bit of `other` is present.
  #[inline(always)]
  #[must_use]
  pub const fn contains_all(self, other: Self) -> bool {
    self.0 & other.0 == other.0
  }

  #[inline]
  #[must_use]
  pub const fn with(self, target: Target) -> Self {
    Self(self.0 | target.bits())
  }

  #[inline]
  #[must_use]
  pub const fn without(self, target: Target) -> Self {
    Self(self.0 & !target.bits())
  }

  #[inline]
  #[must_use]
  pub const fn union(self, other: Self) -> Self {
    Self(self.0 | other.0)
  }

  #[inline]
  #[must_use]
  pub const fn intersection(self, other: Self) -> Self {
    Self(self.0 & other.0)
  }

  #[inline]
  #[must_use]
  pub const fn difference(self, other: Self) -> Self {
    Self(self.0 & !other.0)
  }

  #[inline]
  #[must_use]
  pub const fn symmetric_difference(self, other: Self) -> Self {
    Self(self.0 ^ other.0)
  }

  /// Flips every bit, reserved ones included.
  #[inline]
  #[must_use]
  pub const fn complement(self) -> Self {
    Self(!self.0)
  }

  #[inline]
  #[must_use]
  pub const fn is_empty(self) -> bool {
    self.0 == 0
  }

  #[inline]
  #[must_use]
  pub const fn count(self) -> u32 {
    self.0.count_ones()
  }

  /// Lowest set bit (`x & -x`), or empty.
  #[inline]
  #[must_use]
  pub const fn lowest_bit_set(self) -> Self {
    Self(self.0 & self.0.wrapping_neg())
  }

  /// Best target in the set: the one with the lowest bit.
  ///
  /// Returns `None` if the set is empty or its lowest bit is reserved.
  #[inline]
  #[must_use]
  pub const fn best(self) -> Option<Target> {
    Target::from_bit(self.lowest_bit_set().0)
  }

  /// Iterates defined targets from best (lowest bit) to worst.
  #[inline]
  #[must_use]
  pub const fn iter(self) -> Iter {
    Iter(Self::from_bits(self.0).0)
  }

  /// Parses a target list in `const` context.
  ///
  /// Accepts names separated by `|`, `,`, `+` or whitespace (`"AVX2|sse4"`),
  /// or a single decimal or `0x` hexadecimal integer. Integers may only name
  /// defined target bits.
  pub const fn parse(text: &str) -> Result<Self, ParseTargetError> {
    let bytes = text.as_bytes();
    let mut set = Self::NONE;
    let mut tokens = 0;
    let mut start = 0;

    while start < bytes.len() {
      while start < bytes.len() && is_separator(bytes[start]) {
        start += 1;
      }
      if start == bytes.len() {
        break;
      }
      let mut end = start;
      while end < bytes.len() && !is_separator(bytes[end]) {
        end += 1;
      }
      let (head, _) = bytes.split_at(end);
      let (_, token) = head.split_at(start);

      if token[0].is_ascii_digit() {
        let bits = match parse_int(token) {
          Some(bits) => bits,
          None => return Err(ParseTargetError::InvalidNumber),
        };
        if bits & !Self::ALL.0 != 0 {
          return Err(ParseTargetError::UnknownBits(bits & !Self::ALL.0));
        }
        set = set.union(Self(bits));
      } else {
        match Target::from_name(token) {
          Some(t) => set = set.with(t),
          None => return Err(ParseTargetError::UnknownTarget),
        }
      }
      tokens += 1;
      start = end;
    }

    if tokens == 0 {
      return Err(ParseTargetError::Empty);
    }
    Ok(set)
  }
}

const fn is_separator(b: u8) -> bool {
  matches!(b, b'|' | b',' | b'+') || b.is_ascii_whitespace()
}

const fn parse_int(token: &[u8]) -> Option<u32> {
  let (radix, digits) = match token {
    [b'0', b'x' | b'X', rest @ ..] => (16, rest),
    _ => (10, token),
  };
  if digits.is_empty() {
    return None;
  }
  let mut value: u32 = 0;
  let mut i = 0;
  while i < digits.len() {
    let d = match digits[i] {
      c @ b'0'..=b'9' => (c - b'0') as u32,
      c @ b'a'..=b'f' if radix == 16 => (c - b'a' + 10) as u32,
      c @ b'A'..=b'F' if radix == 16 => (c - b'A' + 10) as u32,
      b'_' => {
        i += 1;
        continue;
      }
      _ => return None,
    };
    value = match value.checked_mul(radix) {
      Some(v) => match v.checked_add(d) {
        Some(v) => v,
        None => return None,
      },
      None => return None,
    };
    i += 1;
  }
  Some(value)
}

/// Iterator over a [`TargetSet`], best target first.
#[derive(Clone, Debug)]
pub struct Iter(u32);

impl Iterator for Iter {
  type Item = Target;

  #[inline]
  fn next(&mut self) -> Option<Target> {
    if self.0 == 0 {
      return None;
    }
    let lowest = self.0 & self.0.wrapping_neg();
    self.0 &= !lowest;
    Target::from_bit(lowest)
  }

  #[inline]
  fn size_hint(&self) -> (usize, Option<usize>) {
    let n = self.0.count_ones() as usize;
    (n, Some(n))
  }
}

impl ExactSizeIterator for Iter {}

impl IntoIterator for TargetSet {
  type Item = Target;
  type IntoIter = Iter;

  fn into_iter(self) -> Iter {
    self.iter()
  }
}

impl From<Target> for TargetSet {
  #[inline]
  fn from(target: Target) -> Self {
    Self(target.bits())
  }
}

impl FromIterator<Target> for TargetSet {
  fn from_iter<I: IntoIterator<Item = Target>>(iter: I) -> Self {
    iter.into_iter().fold(Self::NONE, Self::with)
  }
}

impl FromStr for TargetSet {
  type Err = ParseTargetError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

// ─── Operators ───

impl BitOr for TargetSet {
  type Output = Self;

  #[inline]
  fn bitor(self, rhs: Self) -> Self {
    self.union(rhs)
  }
}

impl BitOr<Target> for TargetSet {
  type Output = Self;

  #[inline]
  fn bitor(self, rhs: Target) -> Self {
    self.with(rhs)
  }
}

impl BitOr for Target {
  type Output = TargetSet;

  #[inline]
  fn bitor(self, rhs: Self) -> TargetSet {
    TargetSet(self.bits() | rhs.bits())
  }
}

impl BitOrAssign for TargetSet {
  #[inline]
  fn bitor_assign(&mut self, rhs: Self) {
    *self = self.union(rhs);
  }
}

impl BitAnd for TargetSet {
  type Output = Self;

  #[inline]
  fn bitand(self, rhs: Self) -> Self {
    self.intersection(rhs)
  }
}

impl BitAndAssign for TargetSet {
  #[inline]
  fn bitand_assign(&mut self, rhs: Self) {
    *self = self.intersection(rhs);
  }
}

impl BitXor for TargetSet {
  type Output = Self;

  #[inline]
  fn bitxor(self, rhs: Self) -> Self {
    self.symmetric_difference(rhs)
  }
}

impl Not for TargetSet {
  type Output = Self;

  #[inline]
  fn not(self) -> Self {
    self.complement()
  }
}

// ─── Formatting ───

impl fmt::Display for TargetSet {
  /// Formats as `AVX2|SSE4|SCALAR`, best first. Reserved bits are appended
  /// in hex; the empty set prints as `none`.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_empty() {
      return f.write_str("none");
    }
    let mut first = true;
    for t in self.iter() {
      if !first {
        f.write_str("|")?;
      }
      f.write_str(t.name())?;
      first = false;
    }
    let reserved = self.0 & !Self::ALL.0;
    if reserved != 0 {
      if !first {
        f.write_str("|")?;
      }
      write!(f, "{reserved:#x}")?;
    }
    Ok(())
  }
}

impl fmt::Debug for TargetSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "TargetSet({self})")
  }
}

impl fmt::LowerHex for TargetSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::LowerHex::fmt(&self.0, f)
  }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error parsing a [`Target`] or [`TargetSet`].
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseTargetError {
  #[error("empty target list")]
  Empty,
  #[error("unknown target name")]
  UnknownTarget,
  #[error("invalid target bit number")]
  InvalidNumber,
  #[error("bits {0:#x} do not name any target")]
  UnknownBits(u32),
}

#[cfg(test)]
mod tests {
  extern crate alloc;
  use alloc::{string::ToString, vec::Vec};

  use super::*;

  #[test]
  fn bits_match_layout() {
    assert_eq!(Target::Avx3Dl.bits(), 4);
    assert_eq!(Target::Avx3.bits(), 8);
    assert_eq!(Target::Avx2.bits(), 16);
    assert_eq!(Target::Sse4.bits(), 64);
    assert_eq!(Target::Ssse3.bits(), 128);
    assert_eq!(Target::Sve2.bits(), 0x400);
    assert_eq!(Target::Sve.bits(), 0x800);
    assert_eq!(Target::Neon.bits(), 0x2000);
    assert_eq!(Target::Ppc8.bits(), 0x1_0000);
    assert_eq!(Target::Wasm.bits(), 0x10_0000);
    assert_eq!(Target::Rvv.bits(), 0x100_0000);
    assert_eq!(Target::Scalar.bits(), 0x2000_0000);
  }

  #[test]
  fn family_ranges_are_disjoint_and_hold_their_targets() {
    let mut seen = TargetSet::NONE;
    for family in Family::ALL {
      let range = family.range();
      assert!((seen & range).is_empty(), "{family:?} overlaps an earlier family");
      assert!(family.highest_bit() < 32);
      seen |= range;
      for t in family.targets() {
        assert!(range.contains(t), "{t} outside {family:?}");
        assert_eq!(t.family(), family);
      }
    }
    assert_eq!(Family::X86.lowest_bit(), 0);
    assert_eq!(Family::Arm.lowest_bit(), 10);
    assert_eq!(Family::Ppc.lowest_bit(), 14);
    assert_eq!(Family::Wasm.lowest_bit(), 19);
    assert_eq!(Family::Rvv.lowest_bit(), 21);
    assert_eq!(Family::Scalar.range(), TargetSet::from(Target::Scalar));
  }

  #[test]
  fn all_is_best_first_within_family() {
    for pair in Target::ALL.windows(2) {
      if pair[0].family() == pair[1].family() {
        assert!(pair[0].bits() < pair[1].bits(), "{} before {}", pair[0], pair[1]);
      }
    }
  }

  #[test]
  fn best_is_lowest_bit() {
    let set = Target::Scalar | Target::Sse4;
    assert_eq!(set.best(), Some(Target::Sse4));
    assert_eq!((set | Target::Avx2).best(), Some(Target::Avx2));
    assert_eq!(TargetSet::NONE.best(), None);
    assert_eq!(TargetSet::from_bits_retain(1 << 5).best(), None);
  }

  #[test]
  fn iter_is_best_first() {
    let set: TargetSet = [Target::Scalar, Target::Ssse3, Target::Avx3].into_iter().collect();
    let order: Vec<_> = set.iter().collect();
    assert_eq!(order, [Target::Avx3, Target::Ssse3, Target::Scalar]);
    assert_eq!(set.iter().len(), 3);
  }

  #[test]
  fn from_bits_drops_reserved() {
    let set = TargetSet::from_bits((1 << 5) | Target::Avx2.bits());
    assert_eq!(set, TargetSet::from(Target::Avx2));
    assert_eq!(TargetSet::from_bits(!0), TargetSet::ALL);
    assert_eq!(TargetSet::ALL.count(), 12);
  }

  #[test]
  fn parses_names() {
    assert_eq!("avx2".parse::<Target>(), Ok(Target::Avx2));
    assert_eq!("AVX3-DL".parse::<Target>(), Ok(Target::Avx3Dl));
    assert_eq!(" sse4 ".parse::<Target>(), Ok(Target::Sse4));
    assert_eq!("".parse::<Target>(), Err(ParseTargetError::Empty));
    assert_eq!("avx".parse::<Target>(), Err(ParseTargetError::UnknownTarget));
  }

  #[test]
  fn parses_sets() {
    assert_eq!("AVX2|SSE4".parse(), Ok(Target::Avx2 | Target::Sse4));
    assert_eq!("avx3, avx3_dl".parse(), Ok(Target::Avx3 | Target::Avx3Dl));
    assert_eq!("0x18".parse(), Ok(Target::Avx3 | Target::Avx2));
    assert_eq!("24".parse(), Ok(Target::Avx3 | Target::Avx2));
    assert_eq!("0x20".parse::<TargetSet>(), Err(ParseTargetError::UnknownBits(0x20)));
    assert_eq!("0xZZ".parse::<TargetSet>(), Err(ParseTargetError::InvalidNumber));
    assert_eq!(" | ".parse::<TargetSet>(), Err(ParseTargetError::Empty));
    assert_eq!("neon|mmx".parse::<TargetSet>(), Err(ParseTargetError::UnknownTarget));
  }

  #[test]
  fn parse_is_const() {
    const SET: TargetSet = match TargetSet::parse("neon sve") {
      Ok(set) => set,
      Err(_) => panic!("bad list"),
    };
    assert_eq!(SET, Target::Neon | Target::Sve);
  }

  #[test]
  fn display_round_trips() {
    let set = Target::Avx2 | Target::Sse4 | Target::Scalar;
    assert_eq!(set.to_string(), "AVX2|SSE4|SCALAR");
    assert_eq!(set.to_string().parse(), Ok(set));
    assert_eq!(TargetSet::NONE.to_string(), "none");
    assert_eq!(TargetSet::from_bits_retain(0x21).to_string(), "0x21");
    assert_eq!(
      TargetSet::from_bits_retain(Target::Avx2.bits() | 1).to_string(),
      "AVX2|0x1"
    );
  }

  #[test]
  fn error_messages() {
    assert_eq!(ParseTargetError::UnknownBits(0x20).to_string(), "bits 0x20 do not name any target");
  }
}

// ─────────────────────────────────────────────────────────────────────────────
// Property-Based Tests (proptest)
// ─────────────────────────────────────────────────────────────────────────────
