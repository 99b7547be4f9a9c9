//! Logging and output-path helpers for the `mcl` binary.

use std::error::Error;
use std::fs::OpenOptions;
use std::path::Path;

use log::LevelFilter;

/// Parse a `--log-level` value, falling back to `info` for anything unrecognized.
pub fn parse_level(log_level: &str) -> LevelFilter {
    log_level.parse::<LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Unknown log level '{}', using 'info'", log_level);
        LevelFilter::Info
    })
}

/// Install the process logger.
///
/// Records are stamped with local time and the emitting module, e.g.
/// `2025-01-01 12:00:00.000 INFO  mcl::sim - Time: 3 error: 4.1200 ...`. Scenario
/// progress goes to stderr unless `log_file` is given, in which case it is appended there.
pub fn init_logger(log_level: &str, log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    use std::io::Write;

    let mut builder = env_logger::Builder::new();
    builder.filter_level(parse_level(log_level));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        ensure_parent_dir(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    Ok(())
}

/// Create the parent directory of an output path (CSV records, config, log) if missing.
pub fn ensure_parent_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
