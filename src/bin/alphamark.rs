use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use alphamark::{
    default_output_path, MaskSize, Mode, ProcessOptions, ProcessResult, WatermarkEngine,
};

#[derive(Parser)]
#[command(
    name = "alphamark",
    about = "Add, remove, and detect fixed-pattern translucent watermarks",
    version,
    after_help = "Simple usage: alphamark -s calib_48.png -l calib_96.png <image>\n\n\
                  Removal runs detection first and skips images with no watermark;\n\
                  use --force to process unconditionally."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input image file or directory
    input: String,

    /// Output file or directory (default: {name}_cleaned.{ext})
    #[arg(short, long)]
    output: Option<String>,

    /// Small (48x48) calibration capture
    #[arg(short = 's', long, value_name = "PATH")]
    calib_small: PathBuf,

    /// Large (96x96) calibration capture
    #[arg(short = 'l', long, value_name = "PATH")]
    calib_large: PathBuf,

    /// Logo foreground intensity (255 for a white watermark)
    #[arg(long, default_value = "255.0")]
    logo_value: f32,

    /// Add a watermark instead of removing one
    #[arg(short, long)]
    add: bool,

    /// Skip watermark detection, process unconditionally
    #[arg(short, long)]
    force: bool,

    /// Detection confidence threshold (0.0-1.0)
    #[arg(short, long, default_value = "0.25")]
    threshold: f32,

    /// Force 48x48 watermark size (for images <= 1024px)
    #[arg(long)]
    force_small: bool,

    /// Force 96x96 watermark size (for images > 1024px)
    #[arg(long)]
    force_large: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if quiet {
        "error"
    } else if verbose {
        "alphamark=debug"
    } else {
        "alphamark=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    if cli.force_small && cli.force_large {
        eprintln!("Error: Cannot specify both --force-small and --force-large");
        process::exit(1);
    }

    if !(0.0..=1.0).contains(&cli.threshold) {
        eprintln!("Error: Threshold must be between 0.0 and 1.0");
        process::exit(1);
    }

    init_tracing(cli.verbose, cli.quiet);

    let force_size = if cli.force_small {
        Some(MaskSize::Small)
    } else if cli.force_large {
        Some(MaskSize::Large)
    } else {
        None
    };

    let opts = ProcessOptions {
        mode: if cli.add { Mode::Add } else { Mode::Remove },
        force: cli.force,
        threshold: cli.threshold,
        force_size,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let engine = match WatermarkEngine::from_files(&cli.calib_small, &cli.calib_large, cli.logo_value)
    {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize engine: {e}");
            process::exit(1);
        }
    };

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.input);
        process::exit(1);
    }

    if !opts.quiet && opts.mode == Mode::Remove {
        if opts.force {
            eprintln!("WARNING: Force mode - processing ALL images without detection!");
        } else {
            eprintln!(
                "Auto-detection enabled (threshold: {:.0}%)",
                opts.threshold * 100.0
            );
        }
        eprintln!();
    }

    let results = if input_path.is_dir() {
        let output_dir = if let Some(o) = &cli.output {
            PathBuf::from(o)
        } else {
            eprintln!("Error: Output directory is required for batch processing");
            eprintln!("Usage: alphamark <input_dir> -o <output_dir> -s <calib> -l <calib>");
            process::exit(1);
        };
        engine.process_directory(input_path, &output_dir, &opts)
    } else {
        let output_path = match &cli.output {
            Some(o) => PathBuf::from(o),
            None => default_output_path(input_path),
        };
        vec![engine.process_file(input_path, &output_path, &opts)]
    };

    let mut success_count = 0u32;
    let mut skip_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, &opts);
        if r.skipped {
            skip_count += 1;
        } else if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !opts.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if skip_count > 0 {
            eprint!(", Skipped: {skip_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn print_result(result: &ProcessResult, opts: &ProcessOptions) {
    if opts.quiet && result.success {
        return;
    }

    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.skipped {
        if !opts.quiet {
            eprintln!("[SKIP] {filename}: {}", result.message);
        }
    } else if result.success {
        if !opts.quiet {
            if result.confidence > 0.0 {
                eprintln!(
                    "[OK] {filename} ({:.0}% confidence)",
                    result.confidence * 100.0
                );
            } else {
                eprintln!("[OK] {filename}");
            }
        }
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }

    if opts.verbose && !result.message.is_empty() {
        eprintln!("  -> {}", result.message);
    }
}
