//! Logging initialization for the MintCraft agent
//!
//! Handles LOG_DESTINATION=console|file, LOG_DIR, LOG_FILE_PREFIX env vars.
//! Console output goes to stderr so stdout stays free for command results.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn build_filter(verbose: bool, crate_names: &[&str], env_filter: Option<String>) -> EnvFilter {
    if verbose {
        let debug_directives: Vec<String> = crate_names
            .iter()
            .map(|name| format!("{}=debug", name))
            .collect();
        return EnvFilter::new(format!("{},info", debug_directives.join(",")));
    }
    env_filter
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| {
            let info_directives: Vec<String> = crate_names
                .iter()
                .map(|name| format!("{}=info", name))
                .collect();
            EnvFilter::new(format!("{},warn", info_directives.join(",")))
        })
}

/// Initialize the tracing subscriber.
///
/// - `verbose`: if true, sets debug level for the given `crate_names`
/// - `crate_names`: crate names to enable at debug level when verbose
/// - `default_log_prefix`: LOG_FILE_PREFIX fallback when LOG_DESTINATION=file
pub fn init_logging(verbose: bool, crate_names: &[&str], default_log_prefix: &str) {
    let filter = build_filter(verbose, crate_names, std::env::var("RUST_LOG").ok());

    let log_dest = std::env::var("LOG_DESTINATION").unwrap_or_else(|_| "console".to_string());
    if log_dest.eq_ignore_ascii_case("file") {
        let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
        let log_prefix = std::env::var("LOG_FILE_PREFIX")
            .unwrap_or_else(|_| default_log_prefix.to_string());
        let file_appender = tracing_appender::rolling::daily(&log_dir, &log_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // flush worker must live for the whole process
        std::mem::forget(guard);
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_enables_debug_for_named_crates() {
        let filter = build_filter(true, &["mintcraft", "mintcraft_agent_logic"], None);
        let rendered = filter.to_string();
        assert!(rendered.contains("mintcraft=debug"));
        assert!(rendered.contains("mintcraft_agent_logic=debug"));
    }

    #[test]
    fn quiet_default_without_rust_log() {
        let filter = build_filter(false, &["mintcraft"], None);
        let rendered = filter.to_string();
        assert!(rendered.contains("mintcraft=info"));
        assert!(!rendered.contains("debug"));
    }
}
