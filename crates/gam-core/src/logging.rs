//! Structured logging bootstrap with `tracing`.

/// Initialize the global tracing subscriber with compact stderr output.
///
/// Call once at startup. Subsequent calls are no-ops. `RUST_LOG` overrides
/// the provided default level.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init is a no-op if a subscriber is already set
    let _ = subscriber.try_init();
}
