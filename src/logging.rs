use env_logger::Env;

/// Installs the global logger. `RUST_LOG` wins over `level`; defaults to info.
pub fn init(level: Option<&str>) {
    let default = level.unwrap_or("info");
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .format_target(false)
        .try_init();
}
