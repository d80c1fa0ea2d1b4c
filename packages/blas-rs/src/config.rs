use std::env;
use std::sync::OnceLock;

const THREAD_ENV: &str = "NUMRS_BLAS_DEVICE_THREADS";
const DISABLE_ENV: &str = "NUMRS_BLAS_DISABLE_PARALLEL";
const MIN_BLOCKS_ENV: &str = "NUMRS_BLAS_PARALLEL_MIN_BLOCKS";
const MEMORY_ENV: &str = "NUMRS_BLAS_DEVICE_MEMORY_MB";
const LAYER_ENV: &str = "NUMRS_BLAS_LAYER";
const CHECK_NUMERICS_ENV: &str = "NUMRS_BLAS_CHECK_NUMERICS";
const SEED_ENV: &str = "NUMRS_BLAS_TEST_SEED";

const DEFAULT_MIN_BLOCKS: usize = 8;
const DEFAULT_DEVICE_MEMORY_MB: usize = 4096;
pub const DEFAULT_TEST_SEED: u64 = 69069;

static THREAD_OVERRIDE: OnceLock<Option<usize>> = OnceLock::new();
static DISABLE_PARALLEL: OnceLock<bool> = OnceLock::new();
static MIN_BLOCKS: OnceLock<usize> = OnceLock::new();
static DEVICE_MEMORY: OnceLock<usize> = OnceLock::new();
static LAYER_BITS: OnceLock<u32> = OnceLock::new();
static CHECK_NUMERICS_BITS: OnceLock<u32> = OnceLock::new();
static TEST_SEED: OnceLock<u64> = OnceLock::new();

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<T>().ok())
}

/// Worker count for the block-execution pool; `None` keeps rayon's default.
pub fn thread_override() -> Option<usize> {
    *THREAD_OVERRIDE.get_or_init(|| match parse_env::<usize>(THREAD_ENV) {
        Some(0) | None => None,
        Some(n) => Some(n),
    })
}

pub fn parallel_disabled() -> bool {
    *DISABLE_PARALLEL.get_or_init(|| {
        matches!(
            env::var(DISABLE_ENV)
                .ok()
                .map(|raw| raw.trim().to_ascii_lowercase()),
            Some(ref value) if value == "1" || value == "true" || value == "yes"
        )
    })
}

fn min_blocks_threshold() -> usize {
    *MIN_BLOCKS.get_or_init(|| {
        parse_env::<usize>(MIN_BLOCKS_ENV)
            .filter(|&value| value > 0)
            .unwrap_or(DEFAULT_MIN_BLOCKS)
    })
}

/// Whether a launch with `blocks` blocks should fan out over the pool.
pub fn should_parallelize(blocks: usize) -> bool {
    !parallel_disabled() && blocks >= min_blocks_threshold()
}

/// Capacity of the default simulated device, in bytes.
pub fn device_memory_bytes() -> usize {
    *DEVICE_MEMORY.get_or_init(|| {
        parse_env::<usize>(MEMORY_ENV)
            .filter(|&value| value > 0)
            .unwrap_or(DEFAULT_DEVICE_MEMORY_MB)
            .saturating_mul(1 << 20)
    })
}

/// Default layer-mode bits for new handles.
pub fn layer_bits() -> u32 {
    *LAYER_BITS.get_or_init(|| parse_env::<u32>(LAYER_ENV).unwrap_or(0))
}

/// Default check-numerics bits for new handles (1 info, 2 warn, 4 fail).
pub fn check_numerics_bits() -> u32 {
    *CHECK_NUMERICS_BITS.get_or_init(|| parse_env::<u32>(CHECK_NUMERICS_ENV).unwrap_or(0))
}

/// Seed for deterministic test inputs.
pub fn test_seed() -> u64 {
    *TEST_SEED.get_or_init(|| parse_env::<u64>(SEED_ENV).unwrap_or(DEFAULT_TEST_SEED))
}

#[cfg(feature = "parallel")]
use std::sync::Once;

#[cfg(feature = "parallel")]
static INIT_RAYON: Once = Once::new();

#[cfg(feature = "parallel")]
pub fn ensure_rayon_pool() {
    use rayon::ThreadPoolBuilder;
    INIT_RAYON.call_once(|| {
        let builder = ThreadPoolBuilder::new().thread_name(|i| format!("numrs-blas-block-{i}"));
        let builder = match thread_override() {
            Some(threads) => builder.num_threads(threads),
            None => builder,
        };
        if let Err(err) = builder.build_global() {
            tracing::debug!(error = %err, "global rayon pool already initialised");
        }
    });
}

#[cfg(not(feature = "parallel"))]
pub fn ensure_rayon_pool() {}
