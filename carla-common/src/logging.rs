use std::path::Path;

use sloggers::{Config, LoggerConfig};

/// Builds the default terminal logger used when no log config file is supplied.
pub fn init() -> slog::Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(
        r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#,
    )
    .expect("default logging config is malformed");

    config.build_logger().expect("failed to build logger")
}

/// Builds a logger from a config file on disk, falling back to [`init`] if it is absent.
pub fn init_from_file<P: AsRef<Path>>(path: P) -> slog::Logger {
    let path = path.as_ref();
    if !path.exists() {
        return init();
    }
    let config: LoggerConfig =
        serdeconv::from_toml_file(path).expect("error loading logging configuration file");
    config.build_logger().expect("failed to build logger")
}
