//! Remove a watermark from a single image.
//!
//! Usage:
//! ```sh
//! cargo run --example remove_watermark -- calib_48.png calib_96.png input.jpg output.jpg
//! ```

use std::env;
use std::process;

use alphamark::{ProcessOptions, WatermarkEngine};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        eprintln!("Usage: {} <calib_small> <calib_large> <input> <output>", args[0]);
        process::exit(1);
    }

    let engine = WatermarkEngine::from_files(args[1].as_ref(), args[2].as_ref(), 255.0)
        .expect("failed to initialize engine");
    let opts = ProcessOptions::default();
    let result = engine.process_file(args[3].as_ref(), args[4].as_ref(), &opts);

    if result.skipped {
        println!("Skipped: {}", result.message);
    } else if result.success {
        println!("Done: {}", result.message);
    } else {
        eprintln!("Error: {}", result.message);
        process::exit(1);
    }
}
