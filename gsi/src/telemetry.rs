use tracing_subscriber::{EnvFilter, fmt};

/// Installs a compact subscriber on stderr, so that logs never mix with command output.
///
/// `RUST_LOG` overrides the default filter.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gsi=info,gsi_core=info"));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    // Already installed when running under a test harness.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
