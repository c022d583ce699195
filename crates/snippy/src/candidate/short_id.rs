use crate::{RandSource, random_base62, to_base36};

/// Length of a snippet short ID.
pub const SHORT_ID_LEN: usize = 7;

/// Prefix marking an emergency fallback short ID.
pub const FALLBACK_PREFIX: &str = "e-";

/// Random symbols in a fallback short ID, before the timestamp suffix.
pub const FALLBACK_RANDOM_LEN: usize = 8;

/// The timestamp suffix of a fallback short ID is taken modulo this value.
pub const FALLBACK_TIME_MODULUS: u64 = 1_000_000;

/// Draws snippet short ID candidates.
///
/// Candidates are [`SHORT_ID_LEN`] symbols from [`BASE62`](crate::BASE62),
/// roughly 3.5e12 possibilities, so a collision is a rare event and the
/// retry policy around this generator is tuned to be fast rather than
/// patient.
///
/// The generator is stateless apart from its random source and never touches
/// storage; probing is the caller's job.
#[derive(Clone, Debug, Default)]
pub struct ShortIdGenerator<R> {
    rng: R,
}

impl<R: RandSource> ShortIdGenerator<R> {
    /// Creates a new generator drawing from `rng`.
    pub const fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Returns a fresh candidate.
    ///
    /// # Example
    /// ```
    /// use snippy::{ShortIdGenerator, ThreadRandom, is_base62};
    ///
    /// let generator = ShortIdGenerator::new(ThreadRandom);
    /// let id = generator.candidate();
    /// assert_eq!(id.len(), 7);
    /// assert!(is_base62(&id));
    /// ```
    pub fn candidate(&self) -> String {
        random_base62(&self.rng, SHORT_ID_LEN)
    }

    /// Returns an emergency identifier for when every candidate collided.
    ///
    /// The layout is `"e-"`, then [`FALLBACK_RANDOM_LEN`] base62 symbols, then
    /// `now_millis % 1_000_000` in base 36. The `e-` prefix keeps fallbacks
    /// out of the regular 7-symbol space. Fallbacks are not probed; a
    /// collision surfaces as a uniqueness violation when the transaction
    /// commits.
    pub fn fallback(&self, now_millis: u64) -> String {
        let mut id = String::with_capacity(FALLBACK_PREFIX.len() + FALLBACK_RANDOM_LEN + 4);
        id.push_str(FALLBACK_PREFIX);
        id.push_str(&random_base62(&self.rng, FALLBACK_RANDOM_LEN));
        id.push_str(&to_base36(now_millis % FALLBACK_TIME_MODULUS));
        id
    }
}
