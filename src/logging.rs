use crate::error::{Result, SimError};
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config;
use std::path::Path;

// ISO 8601 timestamp and a colour coded level tag
const LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";
const FILE_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {l} {t} - {m}{n}";

/// Installs the global logger: stderr always, plus `log_file` when given.
pub fn init(level: LevelFilter, log_file: Option<&Path>) -> Result<log4rs::Handle> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();
    let mut config = Config::builder().appender(Appender::builder().build("stderr", Box::new(stderr)));
    let mut root = Root::builder().appender("stderr");

    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SimError::io(parent, e))?;
        }
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
            .append(false)
            .build(path)
            .map_err(|e| SimError::io(path, e))?;
        config = config.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }

    let config = config
        .build(root.build(level))
        .map_err(|e| SimError::Logging(e.to_string()))?;
    log4rs::init_config(config).map_err(|e| SimError::Logging(e.to_string()))
}
