use crate::RandSource;

/// The 62-symbol alphabet short IDs are drawn from: digits, then lower case,
/// then upper case letters.
pub const BASE62: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Digits used when rendering timestamps in base 36 (lower case).
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `u64::MAX` in base 36 is 13 digits long.
const MAX_BASE36_DIGITS: usize = 13;

/// Draws `len` symbols uniformly from [`BASE62`].
pub fn random_base62<R: RandSource + ?Sized>(rng: &R, len: usize) -> String {
    (0..len)
        .map(|_| {
            let index = rng.below(BASE62.len() as u32) as usize;
            char::from(BASE62[index % BASE62.len()])
        })
        .collect()
}

/// Renders `value` in lower-case base 36, without padding.
///
/// # Example
/// ```
/// assert_eq!(snippy::to_base36(0), "0");
/// assert_eq!(snippy::to_base36(36), "10");
/// assert_eq!(snippy::to_base36(999_999), "lflr");
/// ```
#[must_use]
pub fn to_base36(mut value: u64) -> String {
    let mut buf = [0_u8; MAX_BASE36_DIGITS];
    let mut start = buf.len();
    loop {
        start -= 1;
        buf[start] = BASE36[(value % 36) as usize];
        value /= 36;
        if value == 0 {
            break;
        }
    }
    buf[start..].iter().copied().map(char::from).collect()
}

/// Returns `true` if every byte of `value` belongs to [`BASE62`].
#[must_use]
pub fn is_base62(value: &str) -> bool {
    value.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRandom;

    #[test]
    fn alphabet_has_62_distinct_symbols() {
        let mut seen = BASE62.to_vec();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 62);
        assert!(BASE62.iter().all(u8::is_ascii_alphanumeric));
    }

    #[test]
    fn random_base62_follows_the_source() {
        let rng = ScriptedRandom::new([0, 10, 36, 61]);
        assert_eq!(random_base62(&rng, 4), "0aAZ");
    }

    #[test]
    fn base36_matches_radix_rendering() {
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(1_295), "zz");
        assert_eq!(to_base36(u64::MAX), "3w5e11264sgsf");
    }
}
