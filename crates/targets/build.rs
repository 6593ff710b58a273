//! Build script: exports code generator facts to the crate.
//!
//! rustc does not expose its LLVM version or codegen backend to `cfg`, so we
//! read them here and forward them with `cargo:rustc-env`:
//!
//! - `TARGETS_RUSTC_RELEASE`: e.g. `1.89.0`
//! - `TARGETS_LLVM_VERSION`: e.g. `20.1` (empty when rustc does not report one)
//! - `TARGETS_CODEGEN_BACKEND`: `llvm`, `cranelift` or `gcc`

use std::{env, process::Command};

/// Build-time target overrides, read by the crate with `option_env!`.
const OVERRIDE_VARS: &[&str] = &[
  "TARGETS_BASELINE",
  "TARGETS_BROKEN",
  "TARGETS_DISABLED",
  "TARGETS_GCC_VERSION",
];

struct RustcInfo {
  release: String,
  llvm: Option<String>,
}

fn rustc_info() -> RustcInfo {
  let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
  let output = Command::new(&rustc)
    .arg("-vV")
    .output()
    .unwrap_or_else(|e| panic!("failed to run `{rustc} -vV`: {e}"));
  let stdout = String::from_utf8_lossy(&output.stdout);

  let mut release = String::new();
  let mut llvm = None;
  for line in stdout.lines() {
    if let Some(v) = line.strip_prefix("release:") {
      release = v.trim().to_string();
    } else if let Some(v) = line.strip_prefix("LLVM version:") {
      llvm = Some(v.trim().to_string());
    }
  }
  RustcInfo { release, llvm }
}

/// Returns the `-Zcodegen-backend` value from the encoded rustflags, if any.
fn codegen_backend_flag() -> Option<String> {
  let flags = env::var("CARGO_ENCODED_RUSTFLAGS").unwrap_or_default();
  let mut args = flags.split('\x1f');
  while let Some(arg) = args.next() {
    let value = if let Some(rest) = arg.strip_prefix("-Zcodegen-backend=") {
      Some(rest.to_string())
    } else if arg == "-Z" {
      args.next().and_then(|next| next.strip_prefix("codegen-backend=")).map(str::to_string)
    } else {
      None
    };
    if value.is_some() {
      return value;
    }
  }
  None
}

fn classify_backend(flag: Option<&str>) -> &'static str {
  let Some(name) = flag else {
    return "llvm";
  };
  let lower = name.to_ascii_lowercase();
  if lower == "llvm" {
    "llvm"
  } else if lower.contains("cranelift") {
    "cranelift"
  } else if lower.contains("gcc") {
    "gcc"
  } else {
    panic!("unsupported codegen backend `{name}`: expected llvm, cranelift or gcc");
  }
}

fn llvm_major(version: &str) -> Option<u32> {
  version.split('.').next()?.trim().parse().ok()
}

fn main() {
  println!("cargo:rerun-if-changed=build.rs");
  println!("cargo:rerun-if-env-changed=CARGO_ENCODED_RUSTFLAGS");
  for var in OVERRIDE_VARS {
    println!("cargo:rerun-if-env-changed={var}");
  }
  println!("cargo:rustc-check-cfg=cfg(rust_analyzer)");

  let info = rustc_info();
  let backend = classify_backend(codegen_backend_flag().as_deref());

  println!("cargo:rustc-env=TARGETS_RUSTC_RELEASE={}", info.release);
  println!("cargo:rustc-env=TARGETS_LLVM_VERSION={}", info.llvm.as_deref().unwrap_or(""));
  println!("cargo:rustc-env=TARGETS_CODEGEN_BACKEND={backend}");

  // LLVM before 7 miscompiles SSE4 and later x86 code paths.
  let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
  let scalar_only = env::var_os("CARGO_FEATURE_COMPILE_ONLY_SCALAR").is_some();
  let old_llvm = info.llvm.as_deref().and_then(llvm_major).is_some_and(|major| major < 7);
  if backend == "llvm" && old_llvm && (arch == "x86" || arch == "x86_64") && !scalar_only {
    println!(
      "cargo:warning=LLVM {} cannot compile SSE4 or later x86 targets; only SSSE3 and scalar \
       paths are built. Enable the `compile-only-scalar` feature to silence this warning.",
      info.llvm.as_deref().unwrap_or("?")
    );
  }
}
