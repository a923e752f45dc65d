use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// Logs go to stderr, filtered by `RUST_LOG` (default `info`, or `debug` when
/// verbose). With `log_file` set, the same events are also appended to that
/// file; keep the returned guard alive until exit so the file gets flushed.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let default_level = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

  let (file_layer, guard) = match log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let name = path
        .file_name()
        .ok_or_else(|| eyre!("Log file path has no file name: {}", path.display()))?;

      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

      let appender = tracing_appender::rolling::never(dir, name);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let layer = fmt::layer().with_writer(writer).with_ansi(false);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr_layer)
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
