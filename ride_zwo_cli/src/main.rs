use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueHint};
use ride_zwo::{
    convert, parse_activity, render_zwo, Params, Remainder, SegmentEnd, Workout, DEFAULT_FTP_W,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Build a Zwift structured workout (.zwo) from a recorded activity",
    long_about = None
)]
struct Cli {
    /// Activity JSON with `time` and `watts` streams (stdin when omitted)
    #[arg(long = "in-file", visible_alias = "in_file", value_hint = ValueHint::FilePath)]
    in_file: Option<PathBuf>,

    /// Functional threshold power in watts
    #[arg(long)]
    ftp: Option<String>,

    /// Output .zwo path (`-` for stdout, defaults next to the input)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Workout name written into the file
    #[arg(long)]
    name: Option<String>,

    /// Optional JSON file with pipeline parameters
    #[arg(long, value_hint = ValueHint::FilePath)]
    params: Option<PathBuf>,

    /// Number of distinct power levels
    #[arg(long)]
    clusters: Option<usize>,

    /// Minimum interval duration (seconds)
    #[arg(long)]
    min_duration: Option<u64>,

    /// Power floor applied after resampling (watts)
    #[arg(long)]
    min_power: Option<f64>,

    /// Median filter window (odd number of samples)
    #[arg(long)]
    median_window: Option<usize>,

    /// Clustering seed
    #[arg(long)]
    seed: Option<u64>,

    /// Count the final sample into the last segment
    #[arg(long, action = ArgAction::SetTrue)]
    inclusive_end: bool,

    /// Keep a trailing interval shorter than the minimum duration
    #[arg(long, action = ArgAction::SetTrue)]
    keep_remainder: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Profile major stages with timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    handle_convert(cli)
}

fn handle_convert(cli: Cli) -> Result<()> {
    let params = build_params(&cli)?;
    let ftp = resolve_ftp(cli.ftp.as_deref());

    let t_load = Instant::now();
    let input = read_input(cli.in_file.as_deref())?;
    let source = source_label(cli.in_file.as_deref());
    let activity =
        parse_activity(&input).with_context(|| format!("failed to load activity from {}", source))?;
    let load_elapsed = t_load.elapsed();
    debug!(
        samples = activity.time.len(),
        "loaded activity from {}", source
    );

    let t_convert = Instant::now();
    let conversion = convert(&activity, &params)
        .with_context(|| format!("failed to convert activity from {}", source))?;
    let convert_elapsed = t_convert.elapsed();
    info!(
        "Resampled {} s into {} power levels, {} segments, {} intervals",
        conversion.uniform.len(),
        conversion.levels.len(),
        conversion.segments.len(),
        conversion.intervals.len()
    );
    if conversion.intervals.is_empty() {
        warn!("No interval reached the minimum duration; the workout will be empty");
    }

    let mut workout = Workout::new(conversion.intervals, ftp);
    if let Some(name) = cli.name.as_deref() {
        workout = workout.with_name(name);
    }
    let xml = render_zwo(&workout);

    let t_write = Instant::now();
    let output = output_path(cli.in_file.as_deref(), cli.output.as_deref());
    match output.as_deref() {
        Some(path) if path != Path::new("-") => {
            fs::write(path, xml).with_context(|| format!("failed to write {}", path.display()))?;
            info!("Created Zwift structured workout file '{}'", path.display());
        }
        _ => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(xml.as_bytes())
                .context("failed to write workout to stdout")?;
        }
    }

    if cli.profile {
        info!(
            "Timings: load={:.3}s convert={:.3}s write={:.3}s",
            load_elapsed.as_secs_f64(),
            convert_elapsed.as_secs_f64(),
            t_write.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

fn build_params(cli: &Cli) -> Result<Params> {
    let mut params = match cli.params.as_deref() {
        Some(path) => load_params(path)?,
        None => Params::default(),
    };
    if let Some(n) = cli.clusters {
        params.n_clusters = n;
    }
    if let Some(d) = cli.min_duration {
        params.min_duration_s = d;
    }
    if let Some(p) = cli.min_power {
        params.min_power_w = p;
    }
    if let Some(w) = cli.median_window {
        params.median_window = w;
    }
    if let Some(seed) = cli.seed {
        params.seed = seed;
    }
    if cli.inclusive_end {
        params.segment_end = SegmentEnd::Inclusive;
    }
    if cli.keep_remainder {
        params.remainder = Remainder::Emit;
    }
    params.validate()?;
    Ok(params)
}

fn load_params(path: &Path) -> Result<Params> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read params {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not a valid params file", path.display()))
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) if path != Path::new("-") => {
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))
        }
        _ => {
            let mut buf = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut buf)
                .context("failed to read activity from stdin")?;
            Ok(buf)
        }
    }
}

fn source_label(path: Option<&Path>) -> String {
    match path {
        Some(path) if path != Path::new("-") => path.display().to_string(),
        _ => "stdin".to_string(),
    }
}

/// Parse the FTP flag, falling back to 300 W when it is missing or unusable.
fn resolve_ftp(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else {
        info!("No FTP provided, using default FTP of {}W", DEFAULT_FTP_W);
        return DEFAULT_FTP_W;
    };
    match raw.trim().parse::<f64>() {
        Ok(ftp) if ftp.is_finite() && ftp > 0.0 => ftp,
        Ok(_) => {
            warn!(
                "FTP must be a positive number, using default FTP of {}W",
                DEFAULT_FTP_W
            );
            DEFAULT_FTP_W
        }
        Err(_) => {
            warn!(
                "FTP must be a numerical value, using default FTP of {}W",
                DEFAULT_FTP_W
            );
            DEFAULT_FTP_W
        }
    }
}

/// `None` means stdout.
fn output_path(input: Option<&Path>, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let input = input.filter(|p| *p != Path::new("-"))?;
    Some(input.with_extension("zwo"))
}
