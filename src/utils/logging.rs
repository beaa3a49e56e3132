use tracing_subscriber::EnvFilter;

/// Initialize tracing for the load generator.
///
/// `RUST_LOG` wins when it is set; otherwise `default_level` is used for this
/// crate and `warn` for everything else, which keeps rumqttc quiet.
pub fn init(default_level: &str) {
    let lvl = match default_level.to_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,mqtt_loadgen={lvl}")));

    // try_init so tests and repeated calls don't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .try_init();
}
