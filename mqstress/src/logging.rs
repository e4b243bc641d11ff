use tracing_subscriber::filter::{EnvFilter, filter_fn};
use tracing_subscriber::prelude::*;

const CRATES: [&str; 3] = ["mqstress", "mqstress_core", "mqstress_mqtt"];

/// Installs the stderr log subscriber. `RUST_LOG`, when set, replaces the
/// filter derived from `--log-level`.
pub(crate) fn init(level: u8) {
    let (filter, hide_errors) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, false),
        Err(_) => (EnvFilter::new(directives(level)), level == 2),
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter)
        .with_filter(filter_fn(move |meta| {
            !(hide_errors && *meta.level() == tracing::Level::ERROR)
        }));

    // A second init (tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry().with(layer).try_init();
}

fn directives(level: u8) -> String {
    match level {
        0 => "off".to_string(),
        1 => "warn".to_string(),
        _ => {
            let crates: Vec<String> = CRATES.iter().map(|c| format!("{c}=debug")).collect();
            format!("warn,{}", crates.join(","))
        }
    }
}
