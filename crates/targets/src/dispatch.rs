//! Dispatch tables and the `dynamic_dispatch!` macro.
//!
//! A dispatch table holds one function pointer per slot of the chosen-target
//! layout (see [`crate::chosen`]):
//!
//! ```text
//!   [0]            init trampoline
//!   [1..=MAX]      target slots in bit order (None if not compiled)
//!   [MAX + 1]      scalar slot
//! ```
//!
//! Calling through the table is a relaxed-cost atomic load, a mask, a
//! trailing-zero count and an indirect call.

use core::fmt;

use crate::{
  chosen::{MAX_DYNAMIC_TARGETS, SCALAR_INDEX, TABLE_LEN, slot_index},
  config::{STATIC_TARGET, TARGETS},
  target::Target,
};

/// Per-function table of target implementations.
///
/// Normally built by [`dynamic_dispatch!`](crate::dynamic_dispatch); `F` is
/// an `unsafe fn` pointer type.
pub struct DispatchTable<F> {
  init: F,
  targets: [Option<F>; MAX_DYNAMIC_TARGETS],
  scalar: F,
}

impl<F: Copy> DispatchTable<F> {
  /// Number of slots, including init and scalar.
  pub const LEN: usize = TABLE_LEN;

  #[must_use]
  pub const fn new(init: F, targets: [Option<F>; MAX_DYNAMIC_TARGETS], scalar: F) -> Self {
    Self { init, targets, scalar }
  }

  /// The function in slot `index`, if that slot is populated.
  #[inline]
  #[must_use]
  pub fn slot(&self, index: usize) -> Option<F> {
    match index {
      0 => Some(self.init),
      i if i == SCALAR_INDEX => Some(self.scalar),
      i => self.targets.get(i.wrapping_sub(1)).copied().flatten(),
    }
  }

  /// The function for a dispatch index. Empty or out-of-range slots resolve
  /// to the scalar slot; [`ChosenTarget::get_index`] never selects them.
  ///
  /// [`ChosenTarget::get_index`]: crate::ChosenTarget::get_index
  #[inline(always)]
  #[must_use]
  pub fn get(&self, index: usize) -> F {
    match self.slot(index) {
      Some(f) => f,
      None => self.scalar,
    }
  }

  /// Number of populated target slots.
  #[must_use]
  pub fn compiled_targets(&self) -> usize {
    self.targets.iter().filter(|slot| slot.is_some()).count()
  }
}

impl<F> fmt::Debug for DispatchTable<F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let populated: [bool; MAX_DYNAMIC_TARGETS] = core::array::from_fn(|i| self.targets[i].is_some());
    f.debug_struct("DispatchTable").field("targets", &populated).finish_non_exhaustive()
  }
}

/// Implementation for the scalar slot.
///
/// `scalar` when SCALAR is compiled; otherwise the static target's entry,
/// which every CPU running this binary supports.
#[must_use]
pub const fn scalar_slot<F: Copy>(targets: &[Option<F>; MAX_DYNAMIC_TARGETS], scalar: F) -> F {
  if TARGETS.contains(Target::Scalar) {
    return scalar;
  }
  match slot_index(STATIC_TARGET) {
    Some(i) if i >= 1 && i <= MAX_DYNAMIC_TARGETS => match targets[i - 1] {
      Some(f) => f,
      None => scalar,
    },
    _ => scalar,
  }
}

/// Slot contents for `target`: `f` if the target is compiled, else empty.
#[doc(hidden)]
#[inline(always)]
#[must_use]
pub const fn compiled<F: Copy>(target: Target, f: F) -> Option<F> {
  if TARGETS.contains(target) { Some(f) } else { None }
}

/// Declares a function that dispatches to the best compiled target.
///
/// Given a generic implementation `fn imp<I: Isa>(args) -> R`, generates
/// `fn name(args) -> R` that instantiates `imp` once per target in
/// [`TARGETS`](crate::TARGETS) and calls the instantiation for the best
/// target the CPU supports. x86 instantiations are compiled with the
/// target's `#[target_feature]` set. The first call resolves the
/// chosen-target cache.
///
/// ```
/// use targets::{dynamic_dispatch, isa::Isa};
///
/// fn sum_impl<I: Isa>(xs: &[u32]) -> u64 {
///   xs.iter().map(|&x| u64::from(x)).sum()
/// }
///
/// dynamic_dispatch! {
///   /// Sums `xs` with the best available target.
///   pub fn sum(xs: &[u32]) -> u64 = sum_impl;
/// }
///
/// assert_eq!(sum(&[1, 2, 3]), 6);
/// ```
#[macro_export]
macro_rules! dynamic_dispatch {
  (
    $(#[$meta:meta])*
    $vis:vis fn $name:ident($($arg:ident: $ty:ty),* $(,)?) = $($imp:ident)::+;
  ) => {
    $crate::dynamic_dispatch! {
      $(#[$meta])*
      $vis fn $name($($arg: $ty),*) -> () = $($imp)::+;
    }
  };
  (
    $(#[$meta:meta])*
    $vis:vis fn $name:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty = $($imp:ident)::+;
  ) => {
    $(#[$meta])*
    #[inline]
    $vis fn $name($($arg: $ty),*) -> $ret {
      type Entry = unsafe fn($($ty),*) -> $ret;

      unsafe fn init($($arg: $ty),*) -> $ret {
        $crate::chosen_target().update();
        let f = TABLE.get($crate::chosen_target().get_index());
        // SAFETY: `update` only selects targets the CPU supports, and never
        // index 0, so this does not recurse.
        unsafe { f($($arg),*) }
      }

      unsafe fn scalar($($arg: $ty),*) -> $ret {
        $($imp)::+::<$crate::isa::Scalar>($($arg),*)
      }

      // ─── x86 ───
      // Feature attributes come from the same table as `Isa::TARGET_FEATURES`.
      $crate::__x86_features! { Ssse3
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        unsafe fn ssse3($($arg: $ty),*) -> $ret {
          $($imp)::+::<$crate::isa::Ssse3>($($arg),*)
        }
      }
      $crate::__x86_features! { Sse4
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        unsafe fn sse4($($arg: $ty),*) -> $ret {
          $($imp)::+::<$crate::isa::Sse4>($($arg),*)
        }
      }
      $crate::__x86_features! { Avx2
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        unsafe fn avx2($($arg: $ty),*) -> $ret {
          $($imp)::+::<$crate::isa::Avx2>($($arg),*)
        }
      }
      $crate::__x86_features! { Avx3
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        unsafe fn avx3($($arg: $ty),*) -> $ret {
          $($imp)::+::<$crate::isa::Avx3>($($arg),*)
        }
      }
      $crate::__x86_features! { Avx3Dl
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        unsafe fn avx3_dl($($arg: $ty),*) -> $ret {
          $($imp)::+::<$crate::isa::Avx3Dl>($($arg),*)
        }
      }
      #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
      const SLOTS: [Option<Entry>; $crate::MAX_DYNAMIC_TARGETS] = {
        use $crate::{Target, dispatch::compiled};
        [
          None,
          None,
          compiled(Target::Avx3Dl, avx3_dl as Entry),
          compiled(Target::Avx3, avx3 as Entry),
          compiled(Target::Avx2, avx2 as Entry),
          None,
          compiled(Target::Sse4, sse4 as Entry),
          compiled(Target::Ssse3, ssse3 as Entry),
          None,
          None,
        ]
      };

      // ─── ARM ───
      // Outside x86 every compiled target is part of the baseline, so no
      // extra target features are needed.
      #[cfg(any(target_arch = "aarch64", target_arch = "arm"))]
      unsafe fn sve2($($arg: $ty),*) -> $ret {
        $($imp)::+::<$crate::isa::Sve2>($($arg),*)
      }
      #[cfg(any(target_arch = "aarch64", target_arch = "arm"))]
      unsafe fn sve($($arg: $ty),*) -> $ret {
        $($imp)::+::<$crate::isa::Sve>($($arg),*)
      }
      #[cfg(any(target_arch = "aarch64", target_arch = "arm"))]
      unsafe fn neon($($arg: $ty),*) -> $ret {
        $($imp)::+::<$crate::isa::Neon>($($arg),*)
      }
      #[cfg(any(target_arch = "aarch64", target_arch = "arm"))]
      const SLOTS: [Option<Entry>; $crate::MAX_DYNAMIC_TARGETS] = {
        use $crate::{Target, dispatch::compiled};
        [
          compiled(Target::Sve2, sve2 as Entry),
          compiled(Target::Sve, sve as Entry),
          None,
          compiled(Target::Neon, neon as Entry),
        ]
      };

      // ─── PPC ───
      #[cfg(any(target_arch = "powerpc", target_arch = "powerpc64"))]
      unsafe fn ppc8($($arg: $ty),*) -> $ret {
        $($imp)::+::<$crate::isa::Ppc8>($($arg),*)
      }
      #[cfg(any(target_arch = "powerpc", target_arch = "powerpc64"))]
      const SLOTS: [Option<Entry>; $crate::MAX_DYNAMIC_TARGETS] =
        [None, None, $crate::dispatch::compiled($crate::Target::Ppc8, ppc8 as Entry), None, None];

      // ─── WASM ───
      #[cfg(any(target_arch = "wasm32", target_arch = "wasm64"))]
      unsafe fn wasm($($arg: $ty),*) -> $ret {
        $($imp)::+::<$crate::isa::Wasm>($($arg),*)
      }
      #[cfg(any(target_arch = "wasm32", target_arch = "wasm64"))]
      const SLOTS: [Option<Entry>; $crate::MAX_DYNAMIC_TARGETS] =
        [None, $crate::dispatch::compiled($crate::Target::Wasm, wasm as Entry)];

      // ─── RISC-V ───
      #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
      unsafe fn rvv($($arg: $ty),*) -> $ret {
        $($imp)::+::<$crate::isa::Rvv>($($arg),*)
      }
      #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
      const SLOTS: [Option<Entry>; $crate::MAX_DYNAMIC_TARGETS] =
        [None, None, None, $crate::dispatch::compiled($crate::Target::Rvv, rvv as Entry)];

      // ─── Scalar-only architectures ───
      #[cfg(not(any(
        target_arch = "x86",
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "arm",
        target_arch = "powerpc",
        target_arch = "powerpc64",
        target_arch = "wasm32",
        target_arch = "wasm64",
        target_arch = "riscv32",
        target_arch = "riscv64",
      )))]
      const SLOTS: [Option<Entry>; $crate::MAX_DYNAMIC_TARGETS] =
        [$crate::dispatch::compiled($crate::Target::Scalar, scalar as Entry)];

      static TABLE: $crate::DispatchTable<Entry> = $crate::DispatchTable::new(
        init as Entry,
        SLOTS,
        $crate::dispatch::scalar_slot(&SLOTS, scalar as Entry),
      );

      let f = TABLE.get($crate::chosen_target().get_index());
      // SAFETY: the chosen index only selects compiled targets the CPU
      // supports (or the init trampoline, which resolves that first).
      unsafe { f($($arg),*) }
    }
  };
}
