use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use hemmer_provider_bigip::{
    init_logging, provider, serve_on_with_options, serve_with_options, FileRotation, LogFormat,
    LogSink, LoggingConfig, ServeOptions, DEFAULT_MAX_LOG_FILES,
};

/// Hemmer provider for F5 BigIP LTM.
///
/// Started by the Hemmer host; prints a handshake line on stdout and serves
/// gRPC until SIGTERM or SIGINT.
#[derive(Debug, Parser)]
#[command(name = "hemmer-provider-bigip")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Default log level (trace, debug, info, warn, error)
    #[arg(long, env = "BIGIP_PROVIDER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Per-target filter such as `hemmer_provider_bigip::client=debug` (repeatable)
    #[arg(long = "log-filter", env = "BIGIP_PROVIDER_LOG_FILTER", value_delimiter = ',')]
    log_filters: Vec<String>,

    /// Log encoding: text or json
    #[arg(long, env = "BIGIP_PROVIDER_LOG_FORMAT", default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Log destination: stderr, file:<path> or syslog:<host:port>
    #[arg(long, env = "BIGIP_PROVIDER_LOG_SINK", default_value_t = LogSink::Stderr)]
    log_sink: LogSink,

    /// Rotation of a file sink: daily, hourly or never
    #[arg(long, env = "BIGIP_PROVIDER_LOG_ROTATION", default_value_t = FileRotation::Daily)]
    log_rotation: FileRotation,

    /// Rotated log files to keep (0 keeps all)
    #[arg(long, env = "BIGIP_PROVIDER_LOG_MAX_FILES", default_value_t = DEFAULT_MAX_LOG_FILES)]
    log_max_files: usize,

    /// Listen on a fixed address instead of an ephemeral localhost port
    #[arg(long, env = "BIGIP_PROVIDER_LISTEN")]
    listen: Option<SocketAddr>,

    /// Seconds to wait for in-flight requests after a shutdown signal
    #[arg(long, env = "BIGIP_PROVIDER_SHUTDOWN_TIMEOUT_SECS", default_value_t = 30)]
    shutdown_timeout_secs: u64,
}

impl Args {
    fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            filters: self.log_filters.clone(),
            format: self.log_format,
            sink: self.log_sink.clone(),
            rotation: self.log_rotation,
            max_files: self.log_max_files,
        }
    }

    fn serve_options(&self) -> ServeOptions {
        ServeOptions::new().with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args.logging())?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting BigIP provider");

    let options = args.serve_options();
    match args.listen {
        Some(addr) => serve_on_with_options(provider(), addr, options).await,
        None => serve_with_options(provider(), options).await,
    }
}
