//! Linker script placement and build-time node settings
//!
//! `BROKER_HOST`, `BROKER_PORT`, `THING_NAME` and `DATA_TOPIC` are read from
//! the environment, falling back to a `.env` file next to this crate or at
//! the workspace root. Unset values fall back to the defaults in
//! `src/settings.rs`.

use std::env;
use std::fs;
use std::path::PathBuf;

const SETTINGS: &[&str] = &["BROKER_HOST", "BROKER_PORT", "THING_NAME", "DATA_TOPIC"];

fn main() {
    let out = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo"));
    fs::copy("memory.x", out.join("memory.x")).expect("memory.x must exist");
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=memory.x");

    // A missing .env is fine; the environment or the defaults apply
    if let Ok(path) = dotenvy::dotenv() {
        println!("cargo:rerun-if-changed={}", path.display());
    }

    for key in SETTINGS {
        println!("cargo:rerun-if-env-changed={key}");
        if let Ok(value) = env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }
}
