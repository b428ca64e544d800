//! Environment-sourced engine configuration.
//!
//! Cpusets follow the same grammar on both knobs: a comma list of `n` or
//! `n-m` entries, whitespace-tolerant. An invalid value is fatal; an unset or
//! empty variable leaves threads unpinned.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{LazyLock, Once};

use core_affinity::CoreId;

use crate::error::{fatal, ConfigError};

pub const WORK_CPUSET_ENV: &str = "SCEE_WORK_CPUSET";
pub const VALIDATION_CPUSET_ENV: &str = "SCEE_VALIDATION_CPUSET";
pub const SAMPLING_RATE_ENV: &str = "SCEE_SAMPLING_RATE";
pub const MAX_VALIDATION_CORE_ENV: &str = "SCEE_MAX_VALIDATION_CORE";

/// Mirrors CPU_SETSIZE.
const MAX_CPU_ID: usize = 1024;

static SAMPLING_RATE: AtomicU32 = AtomicU32::new(100);
static MAX_VALIDATION_CORE: AtomicUsize = AtomicUsize::new(0);

/// Fraction of records validated in asynchronous mode, in percent.
pub fn set_sampling_rate(rate: u32) {
    if !(1..=100).contains(&rate) {
        fatal!("{}", ConfigError::BadSamplingRate(rate.to_string()));
    }
    SAMPLING_RATE.store(rate, Ordering::Relaxed);
}

pub fn sampling_rate() -> u32 {
    SAMPLING_RATE.load(Ordering::Relaxed)
}

/// Ceiling on concurrently executing validator bodies; 0 means unlimited.
pub fn set_max_validation_core(n: usize) {
    MAX_VALIDATION_CORE.store(n, Ordering::Relaxed);
}

pub fn max_validation_core() -> usize {
    MAX_VALIDATION_CORE.load(Ordering::Relaxed)
}

static ENV_INIT: Once = Once::new();

/// Read the runtime knobs once, before the first worker starts.
pub(crate) fn init_from_env() {
    ENV_INIT.call_once(|| {
        if let Ok(raw) = std::env::var(SAMPLING_RATE_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(rate) if (1..=100).contains(&rate) => {
                    SAMPLING_RATE.store(rate, Ordering::Relaxed)
                }
                _ => fatal!("invalid {}='{}': {}", SAMPLING_RATE_ENV, raw, ConfigError::BadSamplingRate(raw.clone())),
            }
        }
        if let Ok(raw) = std::env::var(MAX_VALIDATION_CORE_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(n) => MAX_VALIDATION_CORE.store(n, Ordering::Relaxed),
                Err(_) => fatal!("invalid {}='{}': {}", MAX_VALIDATION_CORE_ENV, raw, ConfigError::BadValidationCeiling(raw.clone())),
            }
        }
    });
}

fn parse_cpuset(spec: &str) -> Result<Vec<usize>, ConfigError> {
    let mut cores = Vec::new();
    for token in spec.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (start, finish) = match token.split_once('-') {
            Some((lo, hi)) => (parse_cpu(lo)?, parse_cpu(hi)?),
            None => {
                let cpu = parse_cpu(token)?;
                (cpu, cpu)
            }
        };
        if start > finish {
            return Err(ConfigError::BadCpusetRange);
        }
        if finish >= MAX_CPU_ID {
            return Err(ConfigError::CpuOutOfRange(finish));
        }
        cores.extend(start..=finish);
    }
    if cores.is_empty() {
        return Err(ConfigError::EmptyCpuset);
    }
    Ok(cores)
}

fn parse_cpu(token: &str) -> Result<usize, ConfigError> {
    let token = token.trim();
    token
        .parse::<usize>()
        .map_err(|_| ConfigError::BadCpusetToken(token.to_string()))
}

struct CpuPicker {
    cores: Vec<usize>,
    next: AtomicUsize,
}

impl CpuPicker {
    fn pin_current(&self) {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.cores.len();
        let id = self.cores[slot];
        if !core_affinity::set_for_current(CoreId { id }) {
            fatal!("failed to set affinity to cpu {}", id);
        }
    }
}

fn picker_from_env(key: &str) -> Option<CpuPicker> {
    let spec = std::env::var(key).ok()?;
    if spec.is_empty() {
        return None;
    }
    match parse_cpuset(&spec) {
        Ok(cores) => Some(CpuPicker {
            cores,
            next: AtomicUsize::new(0),
        }),
        Err(err) => fatal!("invalid {}='{}': {}", key, spec, err),
    }
}

static WORK_PICKER: LazyLock<Option<CpuPicker>> =
    LazyLock::new(|| picker_from_env(WORK_CPUSET_ENV));
static VALIDATION_PICKER: LazyLock<Option<CpuPicker>> =
    LazyLock::new(|| picker_from_env(VALIDATION_CPUSET_ENV));

pub(crate) fn pin_worker_thread() {
    if let Some(picker) = WORK_PICKER.as_ref() {
        picker.pin_current();
    }
}

pub(crate) fn pin_validator_thread() {
    if let Some(picker) = VALIDATION_PICKER.as_ref() {
        picker.pin_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_cpus_and_ranges() {
        assert_eq!(parse_cpuset("0").unwrap(), vec![0]);
        assert_eq!(parse_cpuset("1-3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_cpuset("0,2,4-6").unwrap(), vec![0, 2, 4, 5, 6]);
    }

    #[test]
    fn tolerates_whitespace() {
        assert_eq!(parse_cpuset(" 0 , 2 - 4 ").unwrap(), vec![0, 2, 3, 4]);
        assert_eq!(parse_cpuset("7, ").unwrap(), vec![7]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_cpuset("abc"),
            Err(ConfigError::BadCpusetToken(_))
        ));
        assert!(matches!(
            parse_cpuset("3-x"),
            Err(ConfigError::BadCpusetToken(_))
        ));
        assert_eq!(parse_cpuset("5-2"), Err(ConfigError::BadCpusetRange));
        assert_eq!(parse_cpuset(" , "), Err(ConfigError::EmptyCpuset));
        assert_eq!(parse_cpuset(""), Err(ConfigError::EmptyCpuset));
    }

    #[test]
    fn rejects_out_of_range_cpus() {
        assert!(matches!(
            parse_cpuset("0-9999"),
            Err(ConfigError::CpuOutOfRange(_))
        ));
    }
}
