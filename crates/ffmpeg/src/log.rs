use crate::ffi::*;

/// The verbosity of ffmpeg's own log output.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LogLevel {
    /// Print nothing.
    Quiet = -8,
    /// Something went really wrong and ffmpeg will crash.
    Panic = 0,
    /// Something went wrong and recovery is not possible.
    Fatal = 8,
    /// Something went wrong and cannot be recovered from.
    Error = 16,
    /// Something does not look correct.
    Warning = 24,
    /// Standard information.
    Info = 32,
    /// Detailed information.
    Verbose = 40,
    /// Stuff which is only useful for libav* developers.
    Debug = 48,
    /// Extremely verbose debugging.
    Trace = 56,
}

/// A log level name that is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct UnknownLogLevel(pub String);

impl LogLevel {
    /// Every level, from the quietest to the most verbose.
    pub const ALL: [Self; 9] = [
        Self::Quiet,
        Self::Panic,
        Self::Fatal,
        Self::Error,
        Self::Warning,
        Self::Info,
        Self::Verbose,
        Self::Debug,
        Self::Trace,
    ];

    /// Converts a raw ffmpeg level, rounding down to the nearest known level.
    pub const fn from_i32(value: i32) -> Self {
        match value {
            i32::MIN..=-1 => Self::Quiet,
            0..=7 => Self::Panic,
            8..=15 => Self::Fatal,
            16..=23 => Self::Error,
            24..=31 => Self::Warning,
            32..=39 => Self::Info,
            40..=47 => Self::Verbose,
            48..=55 => Self::Debug,
            _ => Self::Trace,
        }
    }

    /// The name of the level as ffmpeg's command line tools spell it.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quiet => "quiet",
            Self::Panic => "panic",
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Verbose => "verbose",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownLogLevel(s.to_owned()))
    }
}

/// Sets the level of messages ffmpeg prints to stderr.
pub fn set_log_level(level: LogLevel) {
    // Safety: `av_log_set_level` is safe to call.
    unsafe { av_log_set_level(level as i32) };
}

/// Returns the current ffmpeg log level.
pub fn log_level() -> LogLevel {
    // Safety: `av_log_get_level` is safe to call.
    LogLevel::from_i32(unsafe { av_log_get_level() })
}
