use clap::ValueEnum;
use log::LevelFilter;

/// Verbosity for `--log-level`
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
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
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Log to stderr. The given level replaces the default level of `RUST_LOG`
/// and any directive it has for the polystore crates; its directives for
/// other modules are kept. Driver crates are pinned at warn.
pub fn init(level: LogLevel) {
    let level = LevelFilter::from(level);
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    builder.filter_module("sqlx", LevelFilter::Warn);
    builder.filter_module("mongodb", LevelFilter::Warn);
    builder.filter_module("aws_config", LevelFilter::Warn);
    builder.filter_module("aws_smithy_runtime", LevelFilter::Warn);
    builder.filter_module("hyper", LevelFilter::Warn);
    builder.filter_module("polystore", level);
    builder.filter_module("polystore_db", level);

    // A second init (tests) keeps the first logger
    let _ = builder.try_init();
}
