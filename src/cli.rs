use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "probehose",
    about = "Bulk HTTP path prober, spaffer of requests and collector of info",
    long_about = "probehose bulk-probes many (domain x path) combinations over HTTP and\nreports which paths resolve to real resources. Domains come from arguments,\na file, a pipe, or a shared beanstalk job queue so multiple workers can\ncooperate on one enumeration run."
)]
pub struct Args {
    /// One or more target domains
    #[arg(value_name = "DOMAIN")]
    pub domain: Vec<String>,

    /// Load target domains from a file
    #[arg(short = 'd', long = "domains", value_name = "FILE")]
    pub domains_file: Option<PathBuf>,

    /// Load candidate path names from a file (built-in list by default)
    #[arg(short = 'n', long = "names", value_name = "FILE")]
    pub names_file: Option<PathBuf>,

    /// Append results, as JSON lines, to this file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Save hit bodies into this directory
    #[arg(short = 's', long = "storage", value_name = "DIRECTORY")]
    pub storage: Option<PathBuf>,

    /// Show a progress bar
    #[arg(short = 'p', long = "progress")]
    pub progress: bool,

    /// Don't print results to the console
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Log informational messages
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Log debugging messages
    #[arg(long = "debug")]
    pub debug: bool,

    /// Connect to this beanstalk server for jobs
    #[arg(short = 'b', long = "beanstalk", value_name = "HOST[:PORT]")]
    pub beanstalk: Option<String>,

    /// Beanstalk tube to fetch jobs from
    #[arg(long = "tube-fetch", value_name = "NAME", default_value = "probehose_jobs")]
    pub tube_fetch: String,

    /// Beanstalk tube to publish results to
    #[arg(long = "tube-resp", value_name = "NAME", default_value = "probehose_resp")]
    pub tube_resp: String,

    /// Extra KEY=VALUE variables merged into every result
    #[arg(short = 'x', long = "extra", value_name = "K=V")]
    pub extra: Vec<String>,

    /// Maximum number of HTTP Location redirects per probe
    #[arg(long = "redirects", value_name = "N")]
    pub redirects: Option<usize>,

    /// HTTP User-Agent (random realistic agent by default)
    #[arg(short = 'A', long = "agent", value_name = "UA")]
    pub agent: Option<String>,

    /// Concurrent probe tasks
    #[arg(short = 'C', long = "concurrency", value_name = "N")]
    pub concurrency: Option<usize>,

    /// Timeout for each HTTP request, in seconds
    #[arg(short = 'T', long = "timeout", value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_path: Option<String>,
}

impl Args {
    /// Domains can also arrive on a pipe.
    pub fn use_stdin(&self) -> bool {
        self.domain.is_empty()
            && self.domains_file.is_none()
            && !atty::is(atty::Stream::Stdin)
    }
}
