use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter, e.g. `toolpin=debug`.
pub const LOG_ENV: &str = "TOOLPIN_LOG";

/// Initializes logging to stderr, so stdout stays free for command output.
///
/// `TOOLPIN_LOG` wins when set; otherwise the level is `info`, or `debug`
/// with `verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    // a second initialization (e.g. in tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
