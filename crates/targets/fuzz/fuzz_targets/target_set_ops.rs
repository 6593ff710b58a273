//! Fuzz target for `TargetSet` algebra.
//!
//! Checks the set laws and that `best`/`iter` agree with bit order.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use targets::{Target, TargetSet};

#[derive(Arbitrary, Debug)]
struct Input {
  a: u32,
  b: u32,
  c: u32,
}

fuzz_target!(|input: Input| {
  let a = TargetSet::from_bits_retain(input.a);
  let b = TargetSet::from_bits_retain(input.b);
  let c = TargetSet::from_bits_retain(input.c);

  // ─── Lattice laws ───
  assert_eq!(a | b, b | a);
  assert_eq!(a & b, b & a);
  assert_eq!((a | b) | c, a | (b | c));
  assert_eq!((a & b) & c, a & (b & c));
  assert_eq!(a & (b | c), (a & b) | (a & c));
  assert_eq!(!(a | b), !a & !b);
  assert_eq!(a.difference(b), a & !b);
  assert_eq!(a ^ b, a.difference(b) | b.difference(a));
  assert!((a | b).contains_all(a));
  assert!(a.contains_all(a & b));

  // ─── Defined bits ───
  let known = TargetSet::from_bits(input.a);
  assert!(TargetSet::ALL.contains_all(known));
  assert_eq!(known.iter().len() as u32, known.count());

  // ─── Ordering ───
  let mut prev: Option<Target> = None;
  for t in known {
    assert!(known.contains(t));
    if let Some(p) = prev {
      assert!(p.bits() < t.bits(), "iteration must go best first");
    }
    prev = Some(t);
  }
  assert_eq!(known.best(), known.iter().next());
  if let Some(best) = known.best() {
    assert_eq!(known.without(best).with(best), known);
    assert!(!known.without(best).contains(best));
  }
});
