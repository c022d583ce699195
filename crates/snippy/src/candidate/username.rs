use crate::RandSource;

/// Adjectives used to synthesize a username base when the display name has
/// nothing usable in it.
pub const ADJECTIVES: [&str; 10] = [
    "happy", "clever", "brave", "swift", "calm", "bright", "eager", "gentle", "jolly", "quiet",
];

/// Nouns paired with [`ADJECTIVES`].
pub const NOUNS: [&str; 10] = [
    "coder", "panda", "falcon", "otter", "tiger", "wizard", "ninja", "pixel", "rocket", "koala",
];

/// Smallest numeric suffix appended to a username base.
pub const SUFFIX_MIN: u32 = 1_000;

/// Number of distinct numeric suffixes (1000..=9999).
pub const SUFFIX_SPAN: u32 = 9_000;

/// Strips everything but ASCII letters and digits and lowercases the rest.
///
/// # Example
/// ```
/// assert_eq!(snippy::sanitize_display_name("Ada Lovelace!"), "adalovelace");
/// assert_eq!(snippy::sanitize_display_name("  ✨ "), "");
/// ```
#[must_use]
pub fn sanitize_display_name(display_name: &str) -> String {
    display_name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Draws username candidates.
///
/// A username is built from a *base* and a 4-digit random suffix. The base
/// comes from the user's display name; when that sanitizes to nothing, an
/// `adjective-noun` pair is picked instead. Every output matches
/// `^[a-z0-9-]+$`.
#[derive(Clone, Debug, Default)]
pub struct UsernameGenerator<R> {
    rng: R,
}

impl<R: RandSource> UsernameGenerator<R> {
    /// Creates a new generator drawing from `rng`.
    ///
    /// Word picks use the same source, so it should be cryptographically
    /// secure in production ([`ThreadRandom`](crate::ThreadRandom) is).
    pub const fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Derives the base every candidate for this user starts with.
    pub fn base(&self, display_name: Option<&str>) -> String {
        let base = display_name.map(sanitize_display_name).unwrap_or_default();
        if base.is_empty() {
            self.synthesize()
        } else {
            base
        }
    }

    /// Returns `base` followed by a random suffix in `1000..=9999`.
    ///
    /// Bases that already contain a hyphen get one before the suffix too, so
    /// `swift-otter` becomes `swift-otter-4821` while `ada` becomes `ada4821`.
    pub fn candidate(&self, base: &str) -> String {
        let suffix = SUFFIX_MIN + self.rng.below(SUFFIX_SPAN);
        if base.contains('-') {
            format!("{base}-{suffix}")
        } else {
            format!("{base}{suffix}")
        }
    }

    /// Returns the emergency username used once the retry budget is spent:
    /// `base-<now_millis>`. It is not probed.
    pub fn fallback(&self, base: &str, now_millis: u64) -> String {
        format!("{base}-{now_millis}")
    }

    fn synthesize(&self) -> String {
        let adjective = ADJECTIVES[self.rng.below(ADJECTIVES.len() as u32) as usize % ADJECTIVES.len()];
        let noun = NOUNS[self.rng.below(NOUNS.len() as u32) as usize % NOUNS.len()];
        format!("{adjective}-{noun}")
    }
}
