//! Logging setup
//!
//! Everything funnels into one `tracing_subscriber` registry. Records from
//! the `log` facade (our `log_*!` macros, reqwest, ignore) arrive through
//! the `tracing-log` bridge that `try_init` installs, next to the tracing
//! events emitted by axum and tower-http.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::LazyLock;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

static LOG_FILE: LazyLock<Mutex<Option<File>>> = LazyLock::new(|| Mutex::new(None));
static LOG_TO_STDOUT: LazyLock<Mutex<bool>> = LazyLock::new(|| Mutex::new(false));
static VERBOSE_LOGGING: LazyLock<Mutex<bool>> = LazyLock::new(|| Mutex::new(false));

/// HTTP and filesystem plumbing kept at `warn` unless verbose
const NOISY_TARGETS: &[&str] = &[
    "reqwest", "hyper", "hyper_util", "h2", "want", "mio", "ignore", "globset",
];

/// Writer for formatted events: the log file if one is set, plus stdout when enabled
#[derive(Clone)]
struct UnifiedWriter;

impl Write for UnifiedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = LOG_FILE.lock().as_mut() {
            let _ = file.write_all(buf);
        }

        if *LOG_TO_STDOUT.lock() {
            let _ = io::stdout().write_all(buf);
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = LOG_FILE.lock().as_mut() {
            let _ = file.flush();
        }
        io::stdout().flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for UnifiedWriter {
    type Writer = UnifiedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        UnifiedWriter
    }
}

/// Filter used when `RUST_LOG` is not set
fn default_filter(verbose: bool) -> String {
    if verbose {
        "schema_mock=debug,tower_http=debug,info".to_string()
    } else {
        let mut filter = "schema_mock=debug,tower_http=info,warn".to_string();
        for target in NOISY_TARGETS {
            filter.push_str(&format!(",{target}=warn"));
        }
        filter
    }
}

/// Initialize the tracing registry and the `log` bridge
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::{Once, OnceLock};
    static INIT: Once = Once::new();
    static INIT_RESULT: OnceLock<Result<(), String>> = OnceLock::new();

    INIT.call_once(|| {
        // Check if we should enable verbose logging from environment
        let verbose_from_env = std::env::var("SCHEMA_MOCK_VERBOSE").is_ok()
            || std::env::var("RUST_LOG").is_ok_and(|v| v.contains("debug") || v.contains("trace"));

        if verbose_from_env {
            set_verbose_logging(true);
        }
        let verbose = *VERBOSE_LOGGING.lock();
        set_log_to_stdout(true);

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

        let fmt_layer = fmt::Layer::new()
            .with_target(true)
            .with_level(true)
            .with_ansi(false)
            .with_timer(fmt::time::ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(UnifiedWriter);

        let result = Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| format!("Failed to initialize logging: {e}"));

        let _ = INIT_RESULT.set(result);
    });

    match INIT_RESULT.get() {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(e.clone().into()),
        None => Err("Initialization failed unexpectedly".into()),
    }
}

/// Must be called before [`init`] to affect the default filter
pub fn set_verbose_logging(enabled: bool) {
    *VERBOSE_LOGGING.lock() = enabled;
}

pub fn set_log_file(file_path: &str) -> std::io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)?;

    *LOG_FILE.lock() = Some(file);
    Ok(())
}

pub fn set_log_to_stdout(enabled: bool) {
    *LOG_TO_STDOUT.lock() = enabled;
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        log::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_keeps_crate_debug_logs() {
        for verbose in [false, true] {
            let filter = default_filter(verbose);
            assert!(filter.starts_with("schema_mock=debug,"));
            assert!(EnvFilter::try_new(&filter).is_ok());
        }
    }

    #[test]
    fn test_quiet_filter_silences_noisy_targets() {
        let filter = default_filter(false);
        for target in NOISY_TARGETS {
            assert!(filter.contains(&format!("{target}=warn")));
        }
        assert!(!default_filter(true).contains("hyper=warn"));
    }
}
