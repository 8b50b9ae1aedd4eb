// src/main.rs
mod config;
mod decoder_csv;
mod engine;
mod orderbook;
mod parser;
mod replay;
mod snapshot;

use crate::config::AppConfig;
use anyhow::Context;
use log::{error, info};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

struct Args {
    input: PathBuf,
    config: Option<PathBuf>,
    debug: bool,
    max_events: u64,
}

fn parse_args() -> Option<Args> {
    let mut input = None;
    let mut config = None;
    let mut debug = false;
    let mut max_events = u64::MAX;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--debug" => debug = true,
            "--max-events" => max_events = it.next()?.parse().ok()?,
            "--config" => config = Some(PathBuf::from(it.next()?)),
            _ => input = Some(PathBuf::from(arg)),
        }
    }

    Some(Args {
        input: input?,
        config,
        debug,
        max_events,
    })
}

fn print_usage() {
    eprintln!("Usage: mbp-reconstruct <input_mbo_file.csv>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --debug           Echo parsed events to the log; build no book");
    eprintln!("  --max-events N    Process only the first N events (debug mode)");
    eprintln!("  --config PATH     Optional TOML run configuration");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  mbp-reconstruct data/mbo.csv > output/mbp.csv");
}

fn init_logger(json_logs: bool) {
    if json_logs {
        let mut b =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        b.format(|buf, record| {
            use std::io::Write;
            let ts = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
            writeln!(
                buf,
                "{{\"ts\":\"{}\",\"level\":\"{}\",\"target\":\"{}\",\"msg\":\"{}\"}}",
                ts,
                record.level(),
                record.target(),
                record.args().to_string().replace('"', "'")
            )
        })
        .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }
}

fn run(args: &Args, cfg: &AppConfig) -> anyhow::Result<()> {
    let data = std::fs::read(&args.input)
        .with_context(|| format!("read input {:?}", args.input))?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if args.debug {
        info!("running in debug mode");
        let seen = replay::debug_events(&data, args.max_events, &mut out)?;
        out.flush()?;
        info!("echoed {seen} events");
        return Ok(());
    }

    let t0 = Instant::now();
    let report = replay::run(
        &data,
        cfg.book.pool_capacity,
        cfg.general.progress_interval,
        &mut out,
    )?;
    out.flush()?;
    report.log(t0.elapsed());
    Ok(())
}

fn main() {
    let args = match parse_args() {
        Some(a) => a,
        None => {
            print_usage();
            std::process::exit(1);
        }
    };

    // Load config before the logger so the JSON formatting choice applies.
    let cfg = match &args.config {
        Some(p) => match AppConfig::from_file(p) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error: failed to load config {p:?}: {e:?}");
                std::process::exit(1);
            }
        },
        None => AppConfig::default(),
    };
    init_logger(cfg.general.json_logs);

    info!("input file: {:?}", args.input);
    if let Err(e) = run(&args, &cfg) {
        error!("reconstruction failed: {e:?}");
        std::process::exit(1);
    }
    info!("reconstruction completed");
}
