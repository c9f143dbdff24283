use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Installs the stderr subscriber. `verbose` overrides the configured filter
/// with `debug`.
pub fn init(filter: &str, verbose: bool) -> anyhow::Result<()> {
    let directive = if verbose { "debug" } else { filter };
    let env_filter = EnvFilter::try_new(directive).or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install log subscriber: {err}"))
}
