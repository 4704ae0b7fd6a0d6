//! Worker-pool setup for the parallel detection and matching stages.

use std::env;
use std::sync::OnceLock;

use rayon::ThreadPoolBuilder;

use crate::{Error, Result};

/// Environment override for the worker count.
pub const THREADS_ENV: &str = "PANO_CPU_THREADS";

static POOL: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Build the global Rayon pool used by feature detection and pairwise
/// matching. An explicit `num_threads` wins over [`THREADS_ENV`]; with
/// neither set, Rayon picks its default. Idempotent: later calls return
/// the first outcome.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> Result<()> {
    POOL.get_or_init(|| build_pool(num_threads))
        .clone()
        .map_err(Error::Config)
}

fn build_pool(requested: Option<usize>) -> std::result::Result<(), String> {
    let workers = match requested {
        Some(0) => return Err("worker count must be at least 1".to_string()),
        Some(n) => Some(n),
        None => env_workers()?,
    };

    let mut builder = ThreadPoolBuilder::new();
    if let Some(n) = workers {
        builder = builder.num_threads(n);
    }
    builder.build_global().map_err(|e| e.to_string())
}

fn env_workers() -> std::result::Result<Option<usize>, String> {
    match env::var(THREADS_ENV) {
        Ok(raw) => parse_workers(&raw).map(Some),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(format!("{THREADS_ENV} is not readable: {err}")),
    }
}

fn parse_workers(raw: &str) -> std::result::Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(format!("{THREADS_ENV} must be at least 1")),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("{THREADS_ENV} expects a positive integer, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_padded_counts() {
        assert_eq!(parse_workers("4"), Ok(4));
        assert_eq!(parse_workers(" 8 "), Ok(8));
    }

    #[test]
    fn rejects_zero_empty_and_garbage() {
        assert!(parse_workers("0").is_err());
        assert!(parse_workers("").is_err());
        assert!(parse_workers("many").is_err());
        assert!(parse_workers("-2").is_err());
    }

    #[test]
    fn explicit_zero_workers_is_rejected_before_pool_setup() {
        assert!(build_pool(Some(0)).is_err());
    }
}
