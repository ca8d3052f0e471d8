use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::process::exit;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use thinkgear_rs::logging::init_rust_logging_with;
use thinkgear_rs::protocol::DEFAULT_BAUD_RATE;
use thinkgear_rs::{Headset, HeadsetConfig, Sample};

#[derive(Parser, Debug)]
#[command(name = "thinkgear-dump", about = "Decode ThinkGear headset frames and print samples")]
struct Args {
    /// Serial device (e.g., /dev/ttyUSB0 or COM3)
    port: Option<String>,
    /// Replay a raw byte capture instead of opening a serial port
    #[arg(long, conflicts_with = "port")]
    file: Option<PathBuf>,
    /// Serial baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
    /// Stop after this many samples
    #[arg(long)]
    count: Option<usize>,
    /// Print one JSON object per sample
    #[arg(long)]
    json: bool,
    /// Only print stat packets (band powers, eSense values)
    #[arg(long)]
    stat_only: bool,
    /// Log level (overrides THINKGEAR_LOG / RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    init_rust_logging_with(args.log_level.as_deref());

    let mut headset = match (&args.port, &args.file) {
        (_, Some(path)) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open capture {}", path.display()))?;
            info!("replaying capture {}", path.display());
            Headset::from_reader(BufReader::new(file))
        }
        (Some(port), None) => {
            let config = HeadsetConfig {
                baud_rate: args.baud,
                ..HeadsetConfig::new(port.as_str())
            };
            info!("opening {} at {} baud", config.path, config.baud_rate);
            Headset::open_serial(&config)
                .with_context(|| format!("Failed to open serial port {port}"))?
        }
        (None, None) => bail!("either a serial port or --file is required"),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut printed = 0usize;
    let is_file = args.file.is_some();

    while args.count.map_or(true, |n| printed < n) {
        let sample = match headset.read_sample()? {
            Some(sample) => sample,
            // EOF ends a replay; a serial timeout just means the headset is quiet.
            None if is_file => break,
            None => continue,
        };
        if args.stat_only && !sample.is_stat_packet {
            continue;
        }
        print_sample(&mut out, &sample, args.json)?;
        printed += 1;
    }

    let stats = headset.parser().stats();
    info!(
        "done: frames={}, checksum_errors={}, truncated={}, unknown_codes={}",
        stats.frames,
        stats.checksum_errors,
        stats.truncated_scans + stats.aborted_scans,
        stats.unknown_codes
    );
    Ok(())
}

fn print_sample(out: &mut impl Write, sample: &Sample, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *out, sample)?;
        writeln!(out)?;
        return Ok(());
    }

    if sample.is_stat_packet {
        let p = &sample.eeg_power;
        writeln!(
            out,
            "signal={:3} att={:3} med={:3} hr={:3} blink={:3} misfit={} | delta={} theta={} lalpha={} halpha={} lbeta={} hbeta={} lgamma={} mgamma={}",
            sample.poor_signal,
            sample.attention,
            sample.meditation,
            sample.heart_rate,
            sample.blink_strength,
            sample.earphone_misfit,
            p.delta,
            p.theta,
            p.low_alpha,
            p.high_alpha,
            p.low_beta,
            p.high_beta,
            p.low_gamma,
            p.mid_gamma
        )?;
    } else {
        writeln!(out, "raw={}", sample.raw_wave)?;
    }
    Ok(())
}
