//! Randomness seam for speaker selection and participant fallback picks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait RandomSource: Send {
    /// Uniform in `[0, 1)`.
    fn unit(&mut self) -> f64;

    /// Uniform in `0..len`. `len` must be non-zero.
    fn index(&mut self, len: usize) -> usize;
}

/// Thread-local RNG; a fresh handle per call so the source stays `Send`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn unit(&mut self) -> f64 {
        rand::rng().random::<f64>()
    }

    fn index(&mut self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Seeded RNG for repeatable meetings.
#[derive(Debug, Clone)]
pub struct SeededRandom(StdRng);

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl RandomSource for SeededRandom {
    fn unit(&mut self) -> f64 {
        self.0.random::<f64>()
    }

    fn index(&mut self, len: usize) -> usize {
        self.0.random_range(0..len)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for Box<R> {
    fn unit(&mut self) -> f64 {
        (**self).unit()
    }

    fn index(&mut self, len: usize) -> usize {
        (**self).index(len)
    }
}

pub fn source_for(seed: Option<u64>) -> Box<dyn RandomSource> {
    match seed {
        Some(seed) => Box::new(SeededRandom::new(seed)),
        None => Box::new(ThreadRandom),
    }
}

/// Pick up to `count` distinct items, uniformly.
pub fn sample<T: Clone>(rng: &mut dyn RandomSource, items: &[T], count: usize) -> Vec<T> {
    let mut pool: Vec<T> = items.to_vec();
    let mut picked = Vec::with_capacity(count.min(pool.len()));
    while picked.len() < count && !pool.is_empty() {
        let i = rng.index(pool.len());
        picked.push(pool.swap_remove(i));
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_is_repeatable() {
        let mut a = SeededRandom::new(42);
        let mut b = SeededRandom::new(42);
        for _ in 0..10 {
            assert_eq!(a.unit().to_bits(), b.unit().to_bits());
            assert_eq!(a.index(7), b.index(7));
        }
    }

    #[test]
    fn test_ranges() {
        let mut rng = ThreadRandom;
        for _ in 0..200 {
            let u = rng.unit();
            assert!((0.0..1.0).contains(&u));
            assert!(rng.index(3) < 3);
        }
    }

    #[test]
    fn test_sample_is_distinct_and_bounded() {
        let mut rng = SeededRandom::new(1);
        let items = vec!["a", "b", "c", "d"];
        let picked = sample(&mut rng, &items, 3);
        assert_eq!(picked.len(), 3);
        let mut unique = picked.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);

        assert_eq!(sample(&mut rng, &items, 10).len(), 4);
        assert!(sample(&mut rng, &Vec::<&str>::new(), 2).is_empty());
    }
}
