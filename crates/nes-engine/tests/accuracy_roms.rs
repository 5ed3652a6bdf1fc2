//! Frame-hash checks against the public accuracy test ROMs.
//!
//! The ROMs are not shipped; point `NES_TEST_ROMS` at a directory holding
//! them and run `cargo test -- --ignored`.

use std::path::PathBuf;

use md5::{Digest, Md5};
use nes_engine::prelude::*;

const TIMEOUT_FRAMES: u32 = 600;

fn rom_path(name: &str) -> Option<PathBuf> {
    let dir = std::env::var_os("NES_TEST_ROMS")?;
    Some(PathBuf::from(dir).join(name))
}

/// MD5 of the frame buffer, each pixel as little-endian u16.
fn frame_hash(console: &Console) -> String {
    let mut hasher = Md5::new();
    for pixel in console.frame_buffer().unwrap_or_default() {
        hasher.update(pixel.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn run_until_hash(name: &str, expected: &str) {
    let Some(path) = rom_path(name) else {
        eprintln!("NES_TEST_ROMS not set, skipping {name}");
        return;
    };
    let raw = std::fs::read(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));

    let mut console = Console::default();
    console.load(&raw, None).unwrap();
    for _ in 0..TIMEOUT_FRAMES {
        console.step_frame().unwrap();
        if frame_hash(&console) == expected {
            return;
        }
    }
    panic!(
        "{name}: no frame hashed to {expected} within {TIMEOUT_FRAMES} frames (last {})",
        frame_hash(&console)
    );
}

#[test]
#[ignore = "needs NES_TEST_ROMS"]
fn cpu_dummy_reads() {
    run_until_hash("cpu_dummy_reads.nes", "1800909d1611a51a804dbdeb7b73aeca");
}
