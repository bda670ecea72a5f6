//! The implementation of the `YKVT_LOG` environment variable.
//!
//! `YKVT_LOG` must be of the format `[<path|->:]<level>` where `level` is a [Verbosity]. If no
//! path (or `-`) is given, logs are written to stderr.

use std::{env, error::Error, fs::File, io::Write, path::PathBuf, sync::LazyLock};
use strum::{EnumCount, FromRepr};

/// How verbose should logging be?
#[repr(u8)]
#[derive(Copy, Clone, Debug, EnumCount, FromRepr, PartialEq, PartialOrd)]
pub(crate) enum Verbosity {
    /// Disable logging entirely.
    Disabled,
    /// Log errors.
    Error,
    /// Log warnings (e.g. a query that needed a target layout that was not supplied).
    Warning,
    /// Log the result of each top-level query.
    Query,
}

pub(crate) struct Log {
    /// The requested [Verbosity] level for logging.
    level: Verbosity,
    /// The path to write to. A value of `None` should default to stderr.
    path: Option<PathBuf>,
}

static LOG: LazyLock<Log> = LazyLock::new(|| {
    Log::new().unwrap_or_else(|e| {
        eprintln!("ykvt-error: {e}");
        Log {
            level: Verbosity::Error,
            path: None,
        }
    })
});

impl Log {
    pub(crate) fn new() -> Result<Self, Box<dyn Error>> {
        Self::from_env_value(env::var("YKVT_LOG").ok().as_deref())
    }

    fn from_env_value(s: Option<&str>) -> Result<Self, Box<dyn Error>> {
        let Some(s) = s else {
            return Ok(Self {
                path: None,
                level: Verbosity::Error,
            });
        };
        let (path, level) = match s.split(':').collect::<Vec<_>>()[..] {
            [path, level] => {
                if path == "-" {
                    (None, level)
                } else {
                    let path = PathBuf::from(path);
                    // Truncate any existing log file so that later appends don't append to a
                    // previous run's log.
                    File::create(&path).ok();
                    (Some(path), level)
                }
            }
            [level] => (None, level),
            [..] => return Err("YKVT_LOG must be of the format `[<path|->:]<level>`".into()),
        };
        let level = level
            .parse::<u8>()
            .map_err(|e| format!("Invalid YKVT_LOG level '{s}': {e}"))?;
        let max_level = Verbosity::COUNT - 1;
        let level = Verbosity::from_repr(level)
            .ok_or_else(|| format!("YKVT_LOG level {level} exceeds maximum {max_level}"))?;
        Ok(Self { path, level })
    }

    /// Log `msg` with the [Verbosity] level `level`.
    ///
    /// # Panics
    ///
    /// If `level == Verbosity::Disabled`.
    pub(crate) fn log(&self, level: Verbosity, msg: &str) {
        if level <= self.level {
            let prefix = match level {
                Verbosity::Disabled => panic!(),
                Verbosity::Error => "ykvt-error",
                Verbosity::Warning => "ykvt-warning",
                Verbosity::Query => "ykvt-query",
            };
            match &self.path {
                Some(p) => {
                    let s = format!("{prefix}: {msg}\n");
                    File::options()
                        .append(true)
                        .open(p)
                        .map(|mut x| x.write(s.as_bytes()))
                        .ok();
                }
                None => {
                    eprintln!("{prefix}: {msg}");
                }
            }
        }
    }
}

/// Would a message at `level` be logged? Use this to avoid formatting messages nobody will see.
pub(crate) fn should_log(level: Verbosity) -> bool {
    level <= LOG.level
}

/// Log `msg` at `level` to the process-wide log.
pub(crate) fn log(level: Verbosity, msg: &str) {
    LOG.log(level, msg);
}
