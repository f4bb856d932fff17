use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Dependencies that are chatty at `info` while polling.
const QUIET_TARGETS: [&str; 3] = ["hyper_util=warn", "reqwest=warn", "rustls=warn"];

/// Installs the global subscriber. `RUST_LOG` overrides the `info` default.
pub(crate) fn init_tracing() {
    let mut env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        for target in QUIET_TARGETS {
            if let Ok(directive) = target.parse() {
                env_filter = env_filter.add_directive(directive);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
