use std::collections::BTreeMap;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Stream used by the world for disaster generation, aftershocks and repairs.
pub const WORLD_STREAM: &str = "world";
/// Stream used by the scheduler to pick response-unit targets.
pub const UNITS_STREAM: &str = "units";

/// Seeded master generator handing out one deterministic stream per concern.
///
/// Streams are derived from the master the first time they are requested, so the
/// order of first use is part of the seed schedule. The scheduler touches streams in
/// a fixed order, which keeps two runs with the same seed identical.
pub struct RngManager {
    seed: u64,
    master: ChaCha8Rng,
    streams: BTreeMap<String, ChaCha8Rng>,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            master: ChaCha8Rng::seed_from_u64(seed),
            streams: BTreeMap::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn stream(&mut self, name: &str) -> SystemRng<'_> {
        let master = &mut self.master;
        let entry = self.streams.entry(name.to_string()).or_insert_with(|| {
            let derived = master.next_u64();
            ChaCha8Rng::seed_from_u64(derived)
        });
        SystemRng { inner: entry }
    }

    /// Drops every stream and re-seeds the master from the original seed.
    pub fn reseed(&mut self) {
        self.master = ChaCha8Rng::seed_from_u64(self.seed);
        self.streams.clear();
    }
}

pub struct SystemRng<'a> {
    inner: &'a mut ChaCha8Rng,
}

impl<'a> RngCore for SystemRng<'a> {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}
