use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Initializes the process-wide `tracing` subscriber.
///
/// 0 (default) = info for `tabd`/`tabd_core`, warn for everything else.
/// 1 (`-v`)    = debug for `tabd`/`tabd_core`, info elsewhere.
/// 2+ (`-vv`)  = trace everywhere.
pub fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn,tabd=info,tabd_core=info",
        1 => "info,tabd=debug,tabd_core=debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

    tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(stderr).with_target(true).with_level(true).compact().init();
}
