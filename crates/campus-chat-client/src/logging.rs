use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "campus_chat_client=debug,campus_chat_net=debug,warn";

/// Install the global `tracing` subscriber, writing to stderr. `RUST_LOG`
/// overrides the default filter.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
