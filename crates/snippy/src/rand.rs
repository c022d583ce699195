use rand::{Rng, rng};

/// A trait for random sources that return bounded random integers.
///
/// This abstraction allows you to plug in a real random source or a scripted
/// random source in tests.
///
/// # Example
/// ```
/// use snippy::RandSource;
///
/// struct FixedRand;
/// impl RandSource for FixedRand {
///     fn below(&self, bound: u32) -> u32 {
///         7 % bound
///     }
/// }
///
/// let rng = FixedRand;
/// assert_eq!(rng.below(62), 7);
/// ```
pub trait RandSource {
    /// Returns a uniformly distributed integer in `0..bound`.
    ///
    /// Implementations return `0` when `bound` is `0`.
    fn below(&self, bound: u32) -> u32;
}

/// Draws short-ID characters, username suffixes and word picks from
/// `rand::rng()`.
#[derive(Default, Clone, Copy, Debug)]
pub struct ThreadRandom;

impl RandSource for ThreadRandom {
    fn below(&self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        rng().random_range(0..bound)
    }
}

impl<R: RandSource + ?Sized> RandSource for &R {
    fn below(&self, bound: u32) -> u32 {
        (**self).below(bound)
    }
}
