use anyhow::Result;
use clap::Parser;
use log::info;
use probehose::queue::{BeanstalkQueue, QueueConn};
use probehose::types::QueueConfig;
use probehose::utils;
use rand::seq::SliceRandom;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;

/// Cap on the serialized size of one job, so a single reservation never
/// hands a worker an unreasonable amount of work.
const MAX_BATCH_BYTES: usize = 32 * 1024;

#[derive(Parser, Debug)]
#[command(
    name = "probehose-makework",
    about = "Batch domains into probehose queue jobs"
)]
struct Args {
    /// One or more target domains
    #[arg(value_name = "DOMAIN")]
    domain: Vec<String>,

    /// Load target domains from a file
    #[arg(short = 'd', long = "domains", value_name = "FILE")]
    domains_file: Option<PathBuf>,

    /// Beanstalk server to add jobs to
    #[arg(short = 'b', long = "beanstalk", value_name = "HOST[:PORT]", required = true)]
    beanstalk: String,

    /// Beanstalk tube to add jobs to
    #[arg(long = "tube-fetch", value_name = "NAME", default_value = "probehose_jobs")]
    tube_fetch: String,

    /// Extra KEY=VALUE variables attached to every job
    #[arg(short = 'x', long = "extra", value_name = "K=V")]
    extra: Vec<String>,

    /// Log informational messages
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let extra = utils::parse_extra(&args.extra)?;

    let mut domains = args.domain.clone();
    if let Some(path) = &args.domains_file {
        domains.extend(utils::load_domains(path)?);
    }
    if domains.is_empty() {
        eprintln!("No domains to publish. Give domains as arguments or with -d FILE");
        process::exit(1);
    }
    domains.shuffle(&mut rand::thread_rng());

    let (host, port) = utils::parse_queue_addr(&args.beanstalk, QueueConfig::default().port)?;
    let mut queue = BeanstalkQueue::connect(&host, port)?;
    queue.use_tube(&args.tube_fetch)?;

    let mut batch: Vec<String> = Vec::new();
    let mut batch_len = 0usize;
    let mut jobs = 0usize;
    for domain in &domains {
        let url = utils::normalize_domain(domain);
        batch_len += url.len();
        batch.push(url);
        if batch_len > MAX_BATCH_BYTES {
            publish(&mut queue, &batch, &extra)?;
            jobs += 1;
            batch.clear();
            batch_len = 0;
        }
    }
    if !batch.is_empty() {
        publish(&mut queue, &batch, &extra)?;
        jobs += 1;
    }

    info!("Published {} jobs for {} domains", jobs, domains.len());
    Ok(())
}

fn publish(
    queue: &mut BeanstalkQueue,
    domains: &[String],
    extra: &HashMap<String, String>,
) -> Result<()> {
    let mut payload = Map::new();
    payload.insert("domains".to_string(), json!(domains));
    if !extra.is_empty() {
        payload.insert("extra".to_string(), json!(extra));
    }
    queue.put(Value::Object(payload).to_string().as_bytes())?;
    Ok(())
}
