//! Observability hooks for the batching protocol.
//!
//! `log_metric!` emits structured key/value lines through the `log` facade.
//! It is compiled out of release builds by `#[cfg(debug_assertions)]`, so the
//! hot flush/compress paths pay nothing for it in production.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Once;

use log::LevelFilter;

use crate::error::BatchzipError;

/// Logs a structured key-value metric string at `debug` level, only in debug builds.
///
/// # Example
/// ```
/// use batchzip::log_metric;
/// let items = 4;
/// log_metric!("event" = "batch_dispatched", "items" = &items);
/// ```
#[macro_export]
macro_rules! log_metric {
    ($($key:literal = $value:expr),+ $(,)?) => {
        #[cfg(debug_assertions)]
        {
            let mut parts = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+
            $crate::log::debug!(target: "batchzip::metrics", "BATCHZIP_METRIC: {{ {} }}", parts.join(", "));
        }
    };
}

static INIT_LOGGER: Once = Once::new();

/// Installs an `env_logger` at `Info` level, once per process.
///
/// With `log_file`, records are appended to that file instead of stderr.
pub fn enable_verbose_logging(log_file: Option<&Path>) -> Result<(), BatchzipError> {
    // Open the file first so a bad path is reported instead of silently ignored.
    let file = match log_file {
        Some(path) => Some(OpenOptions::new().append(true).create(true).open(path)?),
        None => None,
    };

    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(LevelFilter::Info);

        // Custom formatter: just print the level and message
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", record.level(), record.args())?;
            buf.flush()?;
            Ok(())
        });

        if let Some(file) = file {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        let _ = builder.try_init();
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_verbose_logging_is_idempotent() {
        assert!(enable_verbose_logging(None).is_ok());
        assert!(enable_verbose_logging(None).is_ok());
        log::info!("logger installed");
    }

    #[test]
    fn test_unwritable_log_path_is_an_error() {
        let result = enable_verbose_logging(Some(Path::new("/nonexistent-dir/batchzip.log")));
        assert!(matches!(result, Err(BatchzipError::Io(_))));
    }

    #[test]
    fn test_log_metric_accepts_mixed_values() {
        let handle = 2usize;
        log_metric!("event" = "test", "handle" = handle, "label" = "x",);
    }
}
