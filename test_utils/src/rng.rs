use std::sync::atomic::{AtomicU64, Ordering};

use rand::{rngs::StdRng, SeedableRng};

static TEST_RNG_SEED: AtomicU64 = AtomicU64::new(1337);

pub fn get_seed() -> u64 {
    TEST_RNG_SEED.load(Ordering::Relaxed)
}

pub fn set_seed(seed: u64) {
    TEST_RNG_SEED.store(seed, Ordering::Relaxed);
}

pub fn rng() -> StdRng {
    StdRng::seed_from_u64(TEST_RNG_SEED.load(Ordering::Relaxed))
}
