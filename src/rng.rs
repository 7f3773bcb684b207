//! Seeded randomness for the turn pipeline.
//!
//! One master generator is seeded from the scenario seed. Each system asks for
//! a named stream the first time it runs; the stream's seed is drawn from the
//! master, so the order in which systems first ask is part of the replay
//! contract and the engine always asks in pipeline order.

use std::collections::HashMap;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub struct RngManager {
    master: ChaCha8Rng,
    streams: HashMap<String, ChaCha8Rng>,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self {
            master: ChaCha8Rng::seed_from_u64(seed),
            streams: HashMap::new(),
        }
    }

    pub fn stream(&mut self, name: &str) -> SystemRng<'_> {
        let master = &mut self.master;
        let entry = self.streams.entry(name.to_string()).or_insert_with(|| {
            let mut seed_bytes = [0u8; 8];
            master.fill_bytes(&mut seed_bytes);
            ChaCha8Rng::seed_from_u64(u64::from_le_bytes(seed_bytes))
        });
        SystemRng { inner: entry }
    }

    /// Drops every derived stream and re-seeds the master generator.
    pub fn reseed(&mut self, seed: u64) {
        *self = Self::new(seed);
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

/// Dice helpers for combat rolls, weather transitions and trophy draws.
pub trait RngExt {
    /// Uniform integer in `lo..=hi`.
    fn roll(&mut self, lo: i32, hi: i32) -> i32;
    /// True with the given probability, clamped to `[0, 1]`.
    fn chance(&mut self, probability: f64) -> bool;
}

impl<R: Rng + ?Sized> RngExt for R {
    fn roll(&mut self, lo: i32, hi: i32) -> i32 {
        if hi <= lo {
            return lo;
        }
        self.gen_range(lo..=hi)
    }

    fn chance(&mut self, probability: f64) -> bool {
        self.gen_bool(probability.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = RngManager::new(42);
        let mut b = RngManager::new(42);
        let va: u64 = a.stream("weather").next_u64();
        let vb: u64 = b.stream("weather").next_u64();
        assert_eq!(va, vb);
    }

    #[test]
    fn streams_are_independent() {
        let mut rng = RngManager::new(42);
        let w = rng.stream("weather").next_u64();
        let a = rng.stream("actions").next_u64();
        assert_ne!(w, a);
    }

    #[test]
    fn reseed_restarts_sequences() {
        let mut rng = RngManager::new(9);
        let first = rng.stream("actions").next_u64();
        rng.stream("actions").next_u64();
        rng.reseed(9);
        assert_eq!(rng.stream("actions").next_u64(), first);
    }

    #[test]
    fn roll_stays_in_bounds() {
        let mut rng = RngManager::new(1);
        let mut stream = rng.stream("dice");
        for _ in 0..200 {
            let v = stream.roll(0, 5);
            assert!((0..=5).contains(&v));
        }
        assert_eq!(stream.roll(3, 3), 3);
    }

    #[test]
    fn chance_clamps_out_of_range_probabilities() {
        let mut rng = RngManager::new(5);
        let mut stream = rng.stream("dice");
        assert!((0..50).all(|_| stream.chance(1.5)));
        assert!((0..50).all(|_| !stream.chance(-0.2)));
        let hits = (0..1000).filter(|_| stream.chance(0.25)).count();
        assert!((180..320).contains(&hits), "hit {hits} times");
    }
}
