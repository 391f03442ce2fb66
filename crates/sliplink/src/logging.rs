use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Overrides `--log-level` with per-target directives, e.g.
/// `sliplink_frame=trace,sliplink_link=debug,warn`.
pub const LOG_ENV: &str = "SLIPLINK_LOG";

const SLIPLINK_TARGETS: [&str; 4] = [
    "sliplink",
    "sliplink_transport",
    "sliplink_frame",
    "sliplink_link",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Logs go to stderr; stdout is reserved for datagrams and frames.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let directives = std::env::var(LOG_ENV).ok();
    let filter = log_filter(level, directives.as_deref());

    let layer = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init();
}

/// Our crates log at `level`; dependencies never log above `warn`.
fn log_filter(level: LogLevel, directives: Option<&str>) -> Targets {
    if let Some(directives) = directives.filter(|d| !d.trim().is_empty()) {
        match directives.parse::<Targets>() {
            Ok(targets) => return targets,
            Err(err) => eprintln!("warning: ignoring {LOG_ENV}: {err}"),
        }
    }

    let ours = LevelFilter::from(level);
    SLIPLINK_TARGETS
        .iter()
        .fold(Targets::new(), |targets, target| {
            targets.with_target(*target, ours)
        })
        .with_default(ours.min(LevelFilter::WARN))
}
