use std::path::Path;

use tracing::{Level, Span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE: &str = "swarmkeeper.log";

/// Crates that log every request at debug; held at warn unless RUST_LOG
/// says otherwise
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

/// Directives used when RUST_LOG is unset
fn default_directives(level: Level) -> String {
    let level = level.to_string().to_lowercase();
    std::iter::once(level)
        .chain(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)))
        .collect::<Vec<_>>()
        .join(",")
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Initialize logging and the panic logger
///
/// Stdout stays compact for interactive use. The file layer, when
/// `log_dir` is set, also records the close of every run span so a log
/// file shows how long each check or cluster operation took.
///
/// Returns guards that must be kept alive until the process exits.
pub fn init(level: Level, log_dir: Option<&Path>) -> Vec<WorkerGuard> {
    let mut guards = Vec::new();

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(stdout_writer)
        .with_filter(env_filter(level));

    let file_layer = log_dir.map(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Failed to create log directory {:?}: {}",
                log_dir, e
            );
        }
        let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter(level))
    });

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    register_panic_logger();
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "swarmkeeper starting up");

    guards
}

/// Span around one check run; every event inside carries the seed needed
/// to reproduce it
pub fn check_span(check: &str, seed: i64, namespace: &str) -> Span {
    tracing::info_span!("check", check, seed, namespace)
}

/// Span around one cluster operation
pub fn cluster_span(operation: &'static str, cluster: &str, namespace: &str) -> Span {
    tracing::info_span!("cluster", operation, cluster, namespace)
}

/// Registers a panic hook that logs panics using the `tracing` crate
fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| match panic.location() {
        Some(loc) => {
            tracing::error!(
                message = %panic,
                panic.file = loc.file(),
                panic.line = loc.line(),
                panic.column = loc.column(),
            );
        }
        None => tracing::error!(message = %panic),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_quiet_http_stack() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("hyper=warn"));
        assert!(directives.contains("reqwest=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_level_is_lowercased() {
        assert!(default_directives(Level::INFO).starts_with("info,"));
    }
}
