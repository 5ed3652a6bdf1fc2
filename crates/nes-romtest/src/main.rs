/*
   Headless runner for accuracy test ROMs. A ROM passes either by writing a
   result code to a status byte (blargg-style, $6000 by default) or by
   producing a frame whose MD5 matches --hash.
*/
use std::env;
use std::fs;
use std::process;

use log::{debug, info, warn};
use md5::{Digest, Md5};
use nes_engine::prelude::*;

const STATUS_RUNNING: u8 = 0x80;
const STATUS_NEEDS_RESET: u8 = 0x81;
const RESET_DELAY_FRAMES: u32 = 6;

struct Options {
    rom_path: String,
    frames: u32,
    result_addr: u16,
    hash: Option<String>,
    region: Option<Region>,
    verbose: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Passed,
    Failed(u8),
    TimedOut,
}

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {program} [-v] [-f|--frames N] [-r|--result-addr HEX] [--hash MD5] \
         [--region ntsc|pal|dendy] <rom.nes>"
    );
    process::exit(2);
}

fn parse_args() -> Options {
    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "nes-romtest".to_string());
    let mut options = Options {
        rom_path: String::new(),
        frames: 1800,
        result_addr: 0x6000,
        hash: None,
        region: None,
        verbose: false,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-v" | "--verbose" => options.verbose = true,
            "-f" | "--frames" | "--timeout-frames" => {
                let Some(frames) = args.next().and_then(|v| v.parse().ok()) else {
                    usage(&program);
                };
                options.frames = frames;
            }
            "-r" | "--result-addr" => {
                let Some(addr) = args
                    .next()
                    .and_then(|v| u16::from_str_radix(v.trim_start_matches('$'), 16).ok())
                else {
                    usage(&program);
                };
                options.result_addr = addr;
            }
            "--hash" => {
                let Some(hash) = args.next() else {
                    usage(&program);
                };
                options.hash = Some(hash.to_ascii_lowercase());
            }
            "--region" => {
                options.region = match args.next().as_deref() {
                    Some("ntsc") => Some(Region::Ntsc),
                    Some("pal") => Some(Region::Pal),
                    Some("dendy") => Some(Region::Dendy),
                    _ => usage(&program),
                };
            }
            _ if arg.starts_with('-') => usage(&program),
            _ => options.rom_path = arg,
        }
    }

    if options.rom_path.is_empty() {
        usage(&program);
    }
    options
}

fn frame_hash(console: &Console) -> String {
    let mut hasher = Md5::new();
    for pixel in console.frame_buffer().unwrap_or_default() {
        hasher.update(pixel.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Text the ROM left at `result_addr + 4`, NUL-terminated.
fn result_text(console: &Console, result_addr: u16) -> String {
    let mut text = String::new();
    let mut addr = result_addr.wrapping_add(4);
    while let Some(byte) = console.peek(addr) {
        if byte == 0 || text.len() >= 1024 {
            break;
        }
        text.push(byte as char);
        addr = addr.wrapping_add(1);
    }
    text
}

fn has_signature(console: &Console, result_addr: u16) -> bool {
    (1..=3)
        .map(|i| console.peek(result_addr.wrapping_add(i)))
        .eq([Some(0xDEu8), Some(0xB0), Some(0x61)])
}

fn run(console: &mut Console, options: &Options) -> Result<Outcome, ConsoleError> {
    let mut reset_countdown: Option<u32> = None;

    for frame in 0..options.frames {
        console.step_frame()?;

        if let Some(expected) = &options.hash {
            let hash = frame_hash(console);
            debug!("frame {frame}: {hash}");
            if &hash == expected {
                info!("frame {frame} matched {expected}");
                return Ok(Outcome::Passed);
            }
            continue;
        }

        if !has_signature(console, options.result_addr) {
            continue;
        }
        match console.peek(options.result_addr) {
            Some(STATUS_RUNNING) => {}
            Some(STATUS_NEEDS_RESET) => {
                let countdown = reset_countdown.get_or_insert(RESET_DELAY_FRAMES);
                if *countdown == 0 {
                    debug!("frame {frame}: ROM requested a reset");
                    reset_countdown = None;
                    console.reset(true)?;
                } else {
                    *countdown -= 1;
                }
            }
            Some(0) => return Ok(Outcome::Passed),
            Some(code) => return Ok(Outcome::Failed(code)),
            None => {}
        }
    }
    Ok(Outcome::TimedOut)
}

fn main() {
    let options = parse_args();

    let default_level = if options.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let raw = match fs::read(&options.rom_path) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Failed to read ROM '{}': {}", options.rom_path, e);
            process::exit(2);
        }
    };

    let mut config = ConsoleConfig::default();
    if let Some(region) = options.region {
        config = config.with_region(region);
    }
    let mut console = Console::new(config);
    if let Err(e) = console.load(&raw, None) {
        eprintln!("Failed to load ROM '{}': {}", options.rom_path, e);
        process::exit(2);
    }
    info!(
        "running {} ({:?}) for up to {} frames",
        options.rom_path,
        console.region().unwrap_or_default(),
        options.frames
    );

    let outcome = match run(&mut console, &options) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Emulation stopped at frame {}: {}", console.frame_count(), e);
            process::exit(1);
        }
    };

    let text = result_text(&console, options.result_addr);
    if !text.trim().is_empty() {
        println!("{}", text.trim_end());
    }

    match outcome {
        Outcome::Passed => println!("PASS after {} frames", console.frame_count()),
        Outcome::Failed(code) => {
            println!("FAIL (code {code})");
            process::exit(1);
        }
        Outcome::TimedOut => {
            if options.hash.is_some() {
                warn!("last frame hash {}", frame_hash(&console));
            }
            println!("TIMEOUT after {} frames", options.frames);
            process::exit(1);
        }
    }
}
