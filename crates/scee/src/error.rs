use thiserror::Error;

/// Configuration errors surfaced before any worker starts. All of them are
/// fatal: the engine reports on stderr and aborts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("empty cpuset")]
    EmptyCpuset,

    #[error("failed to parse cpuset near: {0}")]
    BadCpusetToken(String),

    #[error("invalid cpuset range")]
    BadCpusetRange,

    #[error("cpu {0} exceeds the supported cpu range")]
    CpuOutOfRange(usize),

    #[error("sampling rate must be between 1 and 100, got {0}")]
    BadSamplingRate(String),

    #[error("invalid validator ceiling: {0}")]
    BadValidationCeiling(String),
}

/// Unrecoverable engine fault: report and kill the process. Validation
/// mismatches land here; the threat model is silent data corruption, so no
/// error value ever reaches the caller.
pub(crate) fn die(args: std::fmt::Arguments<'_>) -> ! {
    tracing::error!("{args}");
    eprintln!("scee: {args}");
    std::process::abort();
}

macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::error::die(format_args!($($arg)*))
    };
}

pub(crate) use fatal;
