//! deskshot developer CLI
//!
//! Captures the screen, a region, a window or a monitor to an image file, and
//! searches the screen (or an image file) for a reference image.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use deskshot::capture::CaptureTarget;
use deskshot::config::{self, LoggingConfig};
use deskshot::matching::{self, CancellationToken, MatchConfig};
use deskshot::{CaptureOptions, CaptureRegion, Capturer, PixelBuffer, WindowRef, logging, paths};

#[derive(Parser)]
#[command(name = "deskshot", about = "Screen capture and template matching", version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture the screen and write it to an image file
    Capture {
        /// Virtual-desktop rectangle to capture
        #[arg(
            long,
            num_args = 4,
            value_names = ["X", "Y", "WIDTH", "HEIGHT"],
            allow_hyphen_values = true,
            conflicts_with_all = ["window", "hwnd", "monitor"]
        )]
        region: Option<Vec<i32>>,

        /// Capture the client area of the first window whose title contains this text
        #[arg(long, conflicts_with_all = ["hwnd", "monitor"])]
        window: Option<String>,

        /// Capture the client area of a window by native handle
        #[arg(long, conflicts_with = "monitor")]
        hwnd: Option<isize>,

        /// Capture a monitor by enumeration index
        #[arg(long)]
        monitor: Option<usize>,

        /// Encode as PNG
        #[arg(long, conflicts_with = "lossy")]
        lossless: bool,

        /// Encode as JPEG
        #[arg(long)]
        lossy: bool,

        /// JPEG quality (1-100)
        #[arg(long)]
        quality: Option<u8>,

        /// Output width
        #[arg(long)]
        width: Option<u32>,

        /// Output height
        #[arg(long)]
        height: Option<u32>,

        /// Leave the pointer out of the image
        #[arg(long)]
        no_cursor: bool,

        /// Output file (defaults to a timestamped file in screenshots/)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print a data: URL instead of writing a file
        #[arg(long, conflicts_with = "output")]
        data_url: bool,
    },

    /// Locate a reference image on screen or in an image file
    Find {
        /// Reference image
        reference: PathBuf,

        /// Search this image instead of the primary screen
        #[arg(long)]
        image: Option<PathBuf>,

        /// Minimum correlation score
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Threads used for the search
        #[arg(long)]
        workers: Option<usize>,

        /// Report at most this many matches
        #[arg(long)]
        max: Option<usize>,

        /// Print matches as JSON
        #[arg(long)]
        json: bool,
    },

    /// List connected monitors
    Monitors {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        tracing::error!("[PANIC]{} {}", location, msg);
        eprintln!("[PANIC]{} {}", location, msg);
    }));
}

fn main() -> Result<()> {
    install_panic_hook();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(paths::config_path);
    let outcome = config::init_config(&config_path);
    let app_config = config::get_config();
    let logging_config = if cli.verbose {
        LoggingConfig {
            level: "debug".to_string(),
            ..app_config.logging.clone()
        }
    } else {
        app_config.logging.clone()
    };
    logging::init_logging(&logging_config);
    outcome.log();

    if let Err(e) = paths::ensure_directories() {
        tracing::warn!("Could not create output directories: {}", e);
    }

    match cli.command {
        Commands::Capture {
            region,
            window,
            hwnd,
            monitor,
            lossless,
            lossy,
            quality,
            width,
            height,
            no_cursor,
            output,
            data_url,
        } => {
            let target = capture_target(region, window, hwnd, monitor)?;
            let mut options = target.default_options();
            if lossless {
                options = options.lossless();
            }
            if lossy {
                options = options.lossy();
            }
            if let Some(quality) = quality {
                options = options.with_quality(quality);
            }
            if width.is_some() || height.is_some() {
                options = options.with_target(width, height);
            }
            if no_cursor {
                options = options.with_cursor(false);
            }
            run_capture(&target, options, output, data_url)
        }
        Commands::Find {
            reference,
            image,
            threshold,
            workers,
            max,
            json,
        } => {
            let mut match_config = MatchConfig::from_config(&config::get_config().matching);
            if let Some(threshold) = threshold {
                match_config = match_config.with_threshold(threshold);
            }
            if let Some(workers) = workers {
                match_config.workers = workers.max(1);
            }
            match_config.max_results = max;
            run_find(&reference, image.as_deref(), &match_config, json)
        }
        Commands::Monitors { json } => run_monitors(json),
    }
}

fn capture_target(
    region: Option<Vec<i32>>,
    window: Option<String>,
    hwnd: Option<isize>,
    monitor: Option<usize>,
) -> Result<CaptureTarget> {
    if let Some(values) = region {
        let [x, y, w, h] = values[..] else {
            anyhow::bail!("--region takes exactly four values");
        };
        return Ok(CaptureTarget::Region(CaptureRegion::new(x, y, w, h)?));
    }
    if let Some(title) = window {
        return Ok(CaptureTarget::Window(WindowRef::Title(title)));
    }
    if let Some(handle) = hwnd {
        return Ok(CaptureTarget::Window(WindowRef::Handle(handle)));
    }
    if let Some(index) = monitor {
        return Ok(CaptureTarget::Monitor(index));
    }
    Ok(CaptureTarget::Primary)
}

fn run_capture(
    target: &CaptureTarget,
    options: CaptureOptions,
    output: Option<PathBuf>,
    data_url: bool,
) -> Result<()> {
    let capturer = Capturer::new();
    let shot = capturer.capture_target(target, Some(options))?;

    if data_url {
        println!("{}", shot.to_data_url());
        return Ok(());
    }

    let path = match output {
        Some(path) => {
            shot.save(&path)?;
            path
        }
        None => shot.save_to_dir(&paths::screenshots_dir())?,
    };
    println!(
        "{} ({}x{}, {} bytes, {})",
        path.display(),
        shot.width,
        shot.height,
        shot.bytes.len(),
        shot.strategy
    );
    Ok(())
}

fn run_find(
    reference_path: &Path,
    image: Option<&Path>,
    match_config: &MatchConfig,
    json: bool,
) -> Result<()> {
    let reference = matching::load_reference(reference_path)?;

    let (source, origin) = match image {
        Some(path) => {
            let img = image::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            (PixelBuffer::from_rgba_image(img.to_rgba8())?, None)
        }
        None => {
            let frame = Capturer::new().capture_buffer(false)?;
            (frame.pixels, Some(frame.region))
        }
    };

    let matches = matching::find_with(&source, &reference, match_config, &CancellationToken::new())?;
    let matches: Vec<_> = match origin {
        Some(origin) => matches.iter().map(|m| m.to_screen(&origin)).collect(),
        None => matches,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("No matches for {}", reference_path.display());
        return Ok(());
    }
    for m in &matches {
        let (cx, cy) = m.center();
        println!(
            "({}, {}) {}x{} center=({}, {}) confidence={:.3}",
            m.x,
            m.y,
            m.width,
            m.height,
            cx,
            cy,
            m.display_confidence()
        );
    }
    Ok(())
}

fn run_monitors(json: bool) -> Result<()> {
    let monitors = Capturer::new().monitors()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&monitors)?);
        return Ok(());
    }

    println!("Monitors detected: {}", monitors.len());
    for m in &monitors {
        println!(
            "  [{}] {} {}x{} at ({}, {}) scale {}x {}",
            m.index,
            m.name,
            m.bounds.width,
            m.bounds.height,
            m.bounds.x,
            m.bounds.y,
            m.scale_factor,
            if m.is_primary { "(primary)" } else { "" }
        );
    }
    Ok(())
}
