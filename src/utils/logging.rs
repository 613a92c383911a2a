use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set
fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "media_fetch=info",
        1 => "media_fetch=debug",
        _ => "media_fetch=trace",
    }
}

/// Installs the fmt subscriber; repeated calls are ignored
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
