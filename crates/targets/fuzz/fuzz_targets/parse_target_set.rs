//! Fuzz target for target-list parsing.
//!
//! Parsing never panics, and `Display` output parses back to the same set.

#![no_main]

use libfuzzer_sys::fuzz_target;
use targets::TargetSet;

fuzz_target!(|data: &[u8]| {
  let Ok(text) = core::str::from_utf8(data) else {
    return;
  };

  // ─── Arbitrary text ───
  if let Ok(set) = TargetSet::parse(text) {
    assert!(TargetSet::ALL.contains_all(set), "parse produced reserved bits");
    assert_eq!(text.parse::<TargetSet>(), Ok(set));
  }

  // ─── Display round trip ───
  if data.len() >= 4 {
    let bits = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let set = TargetSet::from_bits(bits);
    if !set.is_empty() {
      assert_eq!(TargetSet::parse(&set.to_string()), Ok(set));
    }
  }
});
