//! Code generator identification.
//!
//! The build script forwards rustc's release, LLVM version and codegen backend
//! as environment variables; this module parses them in `const` context so the
//! broken-target rules in [`crate::policy`] can be evaluated at compile time.

/// rustc code generation backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
  Llvm,
  Cranelift,
  Gcc,
}

impl Backend {
  /// Parses the build script's backend tag.
  #[must_use]
  pub const fn from_tag(tag: &str) -> Option<Self> {
    match tag.as_bytes() {
      b"llvm" => Some(Self::Llvm),
      b"cranelift" => Some(Self::Cranelift),
      b"gcc" => Some(Self::Gcc),
      _ => None,
    }
  }

  #[must_use]
  pub const fn name(self) -> &'static str {
    match self {
      Self::Llvm => "llvm",
      Self::Cranelift => "cranelift",
      Self::Gcc => "gcc",
    }
  }
}

/// Identity of the compiler that built this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Compiler {
  pub backend: Backend,
  /// Backend version as `major * 100 + minor`, 0 if unknown.
  ///
  /// LLVM version for [`Backend::Llvm`], libgccjit version for
  /// [`Backend::Gcc`]. Cranelift has no meaningful version here.
  pub version: u32,
  /// Targeting the MSVC environment. Independent of the backend: LLVM
  /// compiling for `*-pc-windows-msvc` sets both.
  pub msvc: bool,
}

impl Compiler {
  /// Builds the compiler description from the build script's values.
  ///
  /// # Panics
  ///
  /// Panics (at compile time, when used in a `const`) if the backend tag is
  /// unrecognized.
  #[must_use]
  pub const fn from_build_env(
    backend: Option<&str>,
    llvm_version: Option<&str>,
    rustc_release: Option<&str>,
    gcc_version: Option<&str>,
    msvc: bool,
  ) -> Self {
    let backend = match backend {
      None => Backend::Llvm,
      Some(tag) => match Backend::from_tag(tag) {
        Some(b) => b,
        None => panic!("unrecognized codegen backend"),
      },
    };

    let version = match backend {
      Backend::Llvm => match parse_version(llvm_version) {
        Some(v) => v,
        None => match parse_version(rustc_release) {
          Some(release) => llvm_for_rustc(release),
          None => 0,
        },
      },
      Backend::Gcc => match parse_version(gcc_version) {
        Some(v) => v,
        None => 0,
      },
      Backend::Cranelift => 0,
    };

    Self { backend, version, msvc }
  }

  #[inline]
  #[must_use]
  pub const fn is_llvm(self) -> bool {
    matches!(self.backend, Backend::Llvm)
  }

  #[inline]
  #[must_use]
  pub const fn is_gcc(self) -> bool {
    matches!(self.backend, Backend::Gcc)
  }

  #[inline]
  #[must_use]
  pub const fn is_cranelift(self) -> bool {
    matches!(self.backend, Backend::Cranelift)
  }
}

/// The compiler that built this crate.
pub const COMPILER: Compiler = Compiler::from_build_env(
  option_env!("TARGETS_CODEGEN_BACKEND"),
  option_env!("TARGETS_LLVM_VERSION"),
  option_env!("TARGETS_RUSTC_RELEASE"),
  option_env!("TARGETS_GCC_VERSION"),
  cfg!(target_env = "msvc"),
);

// ─────────────────────────────────────────────────────────────────────────────
// Version parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parses `major[.minor[...]]` into `major * 100 + minor`.
///
/// Returns `None` for missing, empty or non-numeric input. Trailing components
/// and suffixes such as `-nightly` or `-rust-1.89.0-stable` are ignored.
#[must_use]
pub const fn parse_version(text: Option<&str>) -> Option<u32> {
  let Some(text) = text else {
    return None;
  };
  let bytes = text.as_bytes();

  let mut i = 0;
  let mut major = 0u32;
  let mut digits = 0;
  while i < bytes.len() && bytes[i].is_ascii_digit() {
    major = major * 10 + (bytes[i] - b'0') as u32;
    digits += 1;
    i += 1;
  }
  if digits == 0 || digits > 4 {
    return None;
  }

  let mut minor = 0u32;
  if i < bytes.len() && bytes[i] == b'.' {
    i += 1;
    let mut minor_digits = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() && minor_digits < 2 {
      minor = minor * 10 + (bytes[i] - b'0') as u32;
      minor_digits += 1;
      i += 1;
    }
  }
  Some(major * 100 + minor)
}

/// rustc release (as `1 * 100 + minor`) → first bundled LLVM major, newest first.
const RUSTC_LLVM_LADDER: &[(u32, u32)] = &[
  (187, 20),
  (182, 19),
  (178, 18),
  (173, 17),
  (170, 16),
  (165, 15),
  (160, 14),
  (156, 13),
  (152, 12),
  (147, 11),
  (144, 10),
  (138, 9),
  (134, 8),
  (130, 7),
];

/// Estimates the LLVM version from a rustc release when rustc does not
/// report one (vendor builds with a custom `-vV`).
#[must_use]
pub const fn llvm_for_rustc(rustc: u32) -> u32 {
  let mut i = 0;
  while i < RUSTC_LLVM_LADDER.len() {
    let (release, llvm) = RUSTC_LLVM_LADDER[i];
    if rustc >= release {
      return llvm * 100;
    }
    i += 1;
  }
  600
}
