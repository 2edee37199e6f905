//! Logging initialization, mirroring the teacher's `log4rs`-to-rotating-file setup.

use std::path::Path;

/// Initialize logging to `{data_dir}/_logs/nexus-pages.log`.
///
/// # Errors
/// Returns an error if the log directory cannot be created or `log4rs` fails
/// to build its configuration.
pub fn init_for_data_dir(data_dir: &Path, level: &str) -> Result<(), Box<dyn std::error::Error>> {
    use log::LevelFilter;
    use log4rs::append::console::ConsoleAppender;
    use log4rs::append::file::FileAppender;
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let log_dir = data_dir.join("_logs");
    std::fs::create_dir_all(&log_dir)?;
    let logfile_path = log_dir.join("nexus-pages.log");

    let level = parse_level(level);
    let encoder = Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}"));
    let file_appender = FileAppender::builder().encoder(encoder.clone()).build(logfile_path)?;
    let console_appender = ConsoleAppender::builder().encoder(encoder).build();

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .appender(Appender::builder().build("console", Box::new(console_appender)))
        .build(Root::builder().appender("file").appender("console").build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}

fn parse_level(level: &str) -> log::LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}
