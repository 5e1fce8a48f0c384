use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use probehose::cli::Args;
use probehose::engine::ProbeEngine;
use probehose::{config, utils};
use rand::seq::SliceRandom;
use std::io::{self, BufRead};
use std::process;

const BANNER: &str = r#"                     __          __
    ____  _________  / /_  ___   / /_  ____  ________
   / __ \/ ___/ __ \/ __ \/ _ \ / __ \/ __ \/ ___/ _ \
  / /_/ / /  / /_/ / /_/ /  __// / / / /_/ (__  )  __/
 / .___/_/   \____/_.___/\___//_/ /_/\____/____/\___/
/_/
          Bulk HTTP path enumeration
"#;

const DEFAULT_NAMES: &str = include_str!("../data/common.txt");

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug {
        log::LevelFilter::Debug
    } else if args.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if !args.quiet {
        println!("{}", BANNER);
    }

    let config = config::from_args(&args)?;

    let names = match &args.names_file {
        Some(path) => utils::load_names(path)?,
        None => utils::parse_names(DEFAULT_NAMES),
    };

    let mut domains = args.domain.clone();
    if let Some(path) = &args.domains_file {
        domains.extend(utils::load_domains(path)?);
    }
    if args.use_stdin() {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = line?;
            let line = line.trim();
            if !line.is_empty() {
                domains.push(line.to_string());
            }
        }
    }
    // Avoid hammering targets in input order.
    domains.shuffle(&mut rand::thread_rng());

    if domains.is_empty() && config.queue.is_none() {
        eprintln!(
            "No input provided. Give domains (arguments, -d FILE or a pipe) or connect a job queue with -b"
        );
        process::exit(1);
    }

    let engine = ProbeEngine::new(config).await?;

    let handle = engine.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, draining in-flight probes");
            handle.stop();
        }
    });

    let stats = engine.run(domains, names).await?;
    info!(
        "Run completed: {} tasks, {} hits in {:.2}s",
        stats.completed,
        stats.hits,
        stats.duration.as_secs_f64()
    );

    Ok(())
}
