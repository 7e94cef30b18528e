//! Logging and tracing setup for the provider binary.
//!
//! Logs never go to **stdout**: it carries the handshake line the host reads.
//! The subscriber is built from an explicit [`LoggingConfig`] and can write to
//! stderr, a rotating file, or a remote syslog collector over UDP. File logs
//! roll over daily by default and keep the last seven files.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: when set, replaces the configured level and filters
//!   (e.g. `info`, `hemmer_provider_bigip::client=debug`)
//!
//! # Examples
//!
//! ```bash
//! # Debug logs for the REST client only
//! hemmer-provider-bigip --log-filter hemmer_provider_bigip::client=debug
//!
//! # JSON lines to a file, rotated hourly, 48 files kept
//! hemmer-provider-bigip --log-format json --log-sink file:/var/log/bigip-provider.log \
//!     --log-rotation hourly --log-max-files 48
//!
//! # Ship to a syslog collector
//! hemmer-provider-bigip --log-sink syslog:logs.example.com:514
//! ```

use std::fmt;
use std::io::{self, Write};
use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::{Level, Metadata};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter};
use tracing_subscriber::layer::Layered;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt as tfmt, prelude::*, EnvFilter, Layer, Registry};

/// Tag placed in front of every syslog message.
const SYSLOG_TAG: &str = "hemmer-provider-bigip";

/// Syslog facility `user` (1), shifted into the priority value.
const SYSLOG_FACILITY_USER: u8 = 1 << 3;

/// Rotated log files kept by default.
pub const DEFAULT_MAX_LOG_FILES: usize = 7;

/// Errors raised while installing the log subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A level or filter directive does not parse.
    #[error("Invalid log filter '{directive}': {reason}")]
    Filter {
        /// The offending directive.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// Unknown output format.
    #[error("Invalid log format '{0}': expected 'text' or 'json'")]
    Format(String),

    /// Unknown or malformed sink.
    #[error("Invalid log sink '{0}': expected 'stderr', 'file:<path>' or 'syslog:<host:port>'")]
    Sink(String),

    /// Unknown rotation period.
    #[error("Invalid log rotation '{0}': expected 'daily', 'hourly' or 'never'")]
    Rotation(String),

    /// The sink could not be opened.
    #[error("Failed to open log sink {sink}: {source}")]
    Io {
        /// The sink being opened.
        sink: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The rolling file appender could not be created.
    #[error("Failed to open log file {sink}: {source}")]
    Appender {
        /// The sink being opened.
        sink: String,
        /// Appender error.
        #[source]
        source: InitError,
    },

    /// A global subscriber is already installed.
    #[error("Failed to install the log subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Output encoding for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(LoggingError::Format(s.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// How often a file sink starts a new file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileRotation {
    /// One file per day, suffixed `.YYYY-MM-DD`.
    #[default]
    Daily,
    /// One file per hour, suffixed `.YYYY-MM-DD-HH`.
    Hourly,
    /// A single file at the configured path.
    Never,
}

impl FileRotation {
    fn rotation(self) -> Rotation {
        match self {
            Self::Daily => Rotation::DAILY,
            Self::Hourly => Rotation::HOURLY,
            Self::Never => Rotation::NEVER,
        }
    }
}

impl FromStr for FileRotation {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "hourly" => Ok(Self::Hourly),
            "never" => Ok(Self::Never),
            _ => Err(LoggingError::Rotation(s.to_string())),
        }
    }
}

impl fmt::Display for FileRotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => f.write_str("daily"),
            Self::Hourly => f.write_str("hourly"),
            Self::Never => f.write_str("never"),
        }
    }
}

/// Where log events are written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogSink {
    /// Standard error.
    #[default]
    Stderr,
    /// Append to a rotating file, created if missing.
    File(PathBuf),
    /// RFC 3164 datagrams to a syslog collector (`host:port`).
    Syslog(String),
}

impl FromStr for LogSink {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("stderr") {
            return Ok(Self::Stderr);
        }
        match s.split_once(':') {
            Some(("file", path)) if !path.is_empty() => Ok(Self::File(PathBuf::from(path))),
            Some(("syslog", addr)) if is_host_port(addr) => Ok(Self::Syslog(addr.to_string())),
            _ => Err(LoggingError::Sink(s.to_string())),
        }
    }
}

fn is_host_port(addr: &str) -> bool {
    addr.rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
}

impl fmt::Display for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stderr => f.write_str("stderr"),
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::Syslog(addr) => write!(f, "syslog:{}", addr),
        }
    }
}

/// Subscriber configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default level for every target.
    pub level: String,
    /// Extra `target=level` directives.
    pub filters: Vec<String>,
    /// Output encoding.
    pub format: LogFormat,
    /// Output destination.
    pub sink: LogSink,
    /// Rotation period of a file sink.
    pub rotation: FileRotation,
    /// Rotated files kept by a file sink; 0 keeps every file.
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            filters: Vec::new(),
            format: LogFormat::default(),
            sink: LogSink::default(),
            rotation: FileRotation::default(),
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

impl LoggingConfig {
    /// Build the event filter, letting `RUST_LOG` win when it is set.
    pub fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
        self.filter_from(rust_log.as_deref())
    }

    fn filter_from(&self, rust_log: Option<&str>) -> Result<EnvFilter, LoggingError> {
        if let Some(env) = rust_log.map(str::trim).filter(|s| !s.is_empty()) {
            return EnvFilter::try_new(env).map_err(|e| LoggingError::Filter {
                directive: env.to_string(),
                reason: e.to_string(),
            });
        }

        let mut filter = EnvFilter::default().add_directive(parse_directive(&self.level)?);
        for directive in &self.filters {
            filter = filter.add_directive(parse_directive(directive)?);
        }
        Ok(filter)
    }
}

fn parse_directive(s: &str) -> Result<Directive, LoggingError> {
    s.trim().parse::<Directive>().map_err(|e| LoggingError::Filter {
        directive: s.to_string(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber described by `config`.
///
/// Fails instead of panicking when a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = config.env_filter()?;
    let (writer, ansi) = make_writer(config)?;

    let layer: Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync> = match config.format {
        LogFormat::Text => tfmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        LogFormat::Json => tfmt::layer()
            .json()
            .with_writer(writer)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };

    tracing_subscriber::registry().with(filter).with(layer).try_init()?;
    tracing::debug!(format = %config.format, sink = %config.sink, "Logging initialized");
    Ok(())
}

/// Try to install the default subscriber (info to stderr), returning false
/// if one was already set.
pub fn try_init_logging() -> bool {
    init_logging(&LoggingConfig::default()).is_ok()
}

/// Open the sink. The flag says whether ANSI colors make sense on it.
fn make_writer(config: &LoggingConfig) -> Result<(BoxMakeWriter, bool), LoggingError> {
    let sink = &config.sink;
    match sink {
        LogSink::Stderr => Ok((BoxMakeWriter::new(io::stderr), true)),
        LogSink::File(path) => {
            let appender = rolling_appender(path, config.rotation, config.max_files).map_err(
                |source| LoggingError::Appender {
                    sink: sink.to_string(),
                    source,
                },
            )?;
            Ok((BoxMakeWriter::new(appender), false))
        }
        LogSink::Syslog(addr) => {
            let writer = SyslogMakeWriter::connect(addr).map_err(|source| LoggingError::Io {
                sink: sink.to_string(),
                source,
            })?;
            Ok((BoxMakeWriter::new(writer), false))
        }
    }
}

/// Appender writing `<dir>/<file name>[.<period>]` for a configured path.
fn rolling_appender(
    path: &Path,
    rotation: FileRotation,
    max_files: usize,
) -> Result<RollingFileAppender, InitError> {
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| SYSLOG_TAG.to_string());

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation.rotation())
        .filename_prefix(prefix);
    if max_files > 0 {
        builder = builder.max_log_files(max_files);
    }
    builder.build(directory)
}

/// Numeric syslog severity for a tracing level.
fn syslog_severity(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 3,
        Level::WARN => 4,
        Level::INFO => 6,
        Level::DEBUG | Level::TRACE => 7,
    }
}

/// Sends each formatted event as one UDP datagram.
#[derive(Debug, Clone)]
struct SyslogMakeWriter {
    socket: Arc<UdpSocket>,
}

impl SyslogMakeWriter {
    fn connect(addr: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(addr)?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }
}

impl<'a> MakeWriter<'a> for SyslogMakeWriter {
    type Writer = SyslogLine;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogLine::new(Arc::clone(&self.socket), &Level::INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogLine::new(Arc::clone(&self.socket), meta.level())
    }
}

/// Buffers one event and sends it on drop.
struct SyslogLine {
    socket: Arc<UdpSocket>,
    buf: Vec<u8>,
}

impl SyslogLine {
    fn new(socket: Arc<UdpSocket>, level: &Level) -> Self {
        let priority = SYSLOG_FACILITY_USER + syslog_severity(level);
        let buf = format!("<{}>{}[{}]: ", priority, SYSLOG_TAG, std::process::id()).into_bytes();
        Self { socket, buf }
    }
}

impl Write for SyslogLine {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogLine {
    fn drop(&mut self) {
        while self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        // Nowhere left to report a failed send.
        let _ = self.socket.send(&self.buf);
    }
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so these tests
    // exercise the pieces rather than `init_logging` itself.

    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_format() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LoggingError::Format(_))
        ));
    }

    #[test]
    fn test_parse_sink() {
        assert_eq!("stderr".parse::<LogSink>().unwrap(), LogSink::Stderr);
        assert_eq!(
            "file:/var/log/bigip.log".parse::<LogSink>().unwrap(),
            LogSink::File(PathBuf::from("/var/log/bigip.log"))
        );
        assert_eq!(
            "syslog:logs.example.com:514".parse::<LogSink>().unwrap(),
            LogSink::Syslog("logs.example.com:514".to_string())
        );
        for bad in ["stdout", "file:", "syslog:logs.example.com", "syslog::514"] {
            assert!(bad.parse::<LogSink>().is_err(), "{} should not parse", bad);
        }
    }

    #[test]
    fn test_sink_display_parses_back() {
        let sink = LogSink::Syslog("10.1.1.1:514".to_string());
        assert_eq!(sink.to_string().parse::<LogSink>().unwrap(), sink);
    }

    #[test]
    fn test_filter_from_level_and_directives() {
        let config = LoggingConfig {
            filters: vec!["hemmer_provider_bigip::client=debug".to_string()],
            ..Default::default()
        };
        let rendered = config.filter_from(None).unwrap().to_string().to_lowercase();
        assert!(rendered.contains("info"));
        assert!(rendered.contains("hemmer_provider_bigip::client=debug"));
    }

    #[test]
    fn test_rust_log_overrides_config() {
        let config = LoggingConfig {
            filters: vec!["hemmer_provider_bigip=trace".to_string()],
            ..Default::default()
        };
        let rendered = config.filter_from(Some("warn")).unwrap().to_string().to_lowercase();
        assert!(rendered.contains("warn"));
        assert!(!rendered.contains("trace"));

        let blank = config.filter_from(Some("  ")).unwrap().to_string().to_lowercase();
        assert!(blank.contains("hemmer_provider_bigip=trace"));
    }

    #[test]
    fn test_bad_directive_is_reported() {
        let config = LoggingConfig {
            filters: vec!["client=loud".to_string()],
            ..Default::default()
        };
        match config.filter_from(None) {
            Err(LoggingError::Filter { directive, .. }) => assert_eq!(directive, "client=loud"),
            other => panic!("expected filter error, got {:?}", other.map(|f| f.to_string())),
        }
    }

    #[test]
    fn test_syslog_severity() {
        assert_eq!(SYSLOG_FACILITY_USER + syslog_severity(&Level::ERROR), 11);
        assert_eq!(SYSLOG_FACILITY_USER + syslog_severity(&Level::INFO), 14);
        assert_eq!(syslog_severity(&Level::TRACE), 7);
    }

    #[test]
    fn test_syslog_line_is_one_datagram() {
        let collector = UdpSocket::bind("127.0.0.1:0").unwrap();
        collector
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = collector.local_addr().unwrap().to_string();

        let writer = SyslogMakeWriter::connect(&addr).unwrap();
        {
            let mut line = SyslogLine::new(Arc::clone(&writer.socket), &Level::WARN);
            line.write_all(b"pool /Common/web ").unwrap();
            line.write_all(b"created\n").unwrap();
        }

        let mut buf = [0u8; 512];
        let n = collector.recv(&mut buf).unwrap();
        let message = std::str::from_utf8(&buf[..n]).unwrap();
        assert!(message.starts_with("<12>hemmer-provider-bigip["));
        assert!(message.ends_with("]: pool /Common/web created"));
    }

    fn temp_log_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "hemmer-provider-bigip-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn file_config(path: PathBuf, rotation: FileRotation) -> LoggingConfig {
        LoggingConfig {
            sink: LogSink::File(path),
            rotation,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_rotation() {
        assert_eq!("daily".parse::<FileRotation>().unwrap(), FileRotation::Daily);
        assert_eq!("Hourly".parse::<FileRotation>().unwrap(), FileRotation::Hourly);
        assert_eq!("never".parse::<FileRotation>().unwrap(), FileRotation::Never);
        assert!(matches!(
            "weekly".parse::<FileRotation>(),
            Err(LoggingError::Rotation(_))
        ));
        assert_eq!(LoggingConfig::default().rotation, FileRotation::Daily);
        assert_eq!(LoggingConfig::default().max_files, DEFAULT_MAX_LOG_FILES);
    }

    #[test]
    fn test_file_sink_appends() {
        let dir = temp_log_dir("never");
        let path = dir.join("provider.log");

        let (writer, ansi) = make_writer(&file_config(path.clone(), FileRotation::Never)).unwrap();
        assert!(!ansi);
        writer.make_writer().write_all(b"first\n").unwrap();
        writer.make_writer().write_all(b"second\n").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\n");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_daily_file_sink_is_dated() {
        let dir = temp_log_dir("daily");
        let path = dir.join("provider.log");

        let (writer, _) = make_writer(&file_config(path, FileRotation::Daily)).unwrap();
        writer.make_writer().write_all(b"pool /Common/web created\n").unwrap();

        let files: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("provider.log."), "unexpected file {}", files[0]);
        let contents = std::fs::read_to_string(dir.join(&files[0])).unwrap();
        assert_eq!(contents, "pool /Common/web created\n");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_unopenable_file_sink() {
        let dir = temp_log_dir("blocked");
        std::fs::create_dir_all(&dir).unwrap();
        let blocker = dir.join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let config = file_config(blocker.join("provider.log"), FileRotation::Daily);
        assert!(matches!(make_writer(&config), Err(LoggingError::Appender { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
