//! Seeded random tokens for filename and field mutations.
//!
//! # Example
//!
//! ```ignore
//! let mut tokens = TokenGenerator::new(Seed::from_u64(12345));
//! let name = tokens.sanitized_token(1, 20);
//! assert!(!name.contains('/'));
//! ```

/// Code-point ranges tokens are drawn from (inclusive).
///
/// Control characters, the space and the quote characters are left out.
pub const TOKEN_RANGES: &[(u32, u32)] = &[
    (0x0021, 0x0021),
    (0x0023, 0x0026),
    (0x0028, 0x007E),
    (0x00A1, 0x00AC),
    (0x00AE, 0x00FF),
    (0x0100, 0x017F),
    (0x0180, 0x024F),
    (0x2C60, 0x2C7F),
    (0x16A0, 0x16F0),
    (0x0370, 0x0377),
    (0x037A, 0x037E),
    (0x0384, 0x038A),
    (0x038C, 0x038C),
];

/// Characters removed by [`sanitize`].
pub const UNSAFE_CHARS: &[char] = &['/', '\\', '\u{0}', ' ', ':', '&'];

/// Deterministic seed for reproducible mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Seed(u64);

impl Seed {
    /// Create a seed from a u64 value
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw seed value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Simple xorshift64 PRNG
#[derive(Debug, Clone)]
struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    const fn new(seed: Seed) -> Self {
        // Ensure non-zero state
        let state = if seed.0 == 0 { 1 } else { seed.0 };
        Self { state }
    }

    const fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    const fn next_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        min + (self.next() % (max - min))
    }
}

/// Remove characters that would break a YAML scalar, a Ruby string or a filename.
#[must_use]
pub fn sanitize(value: &str) -> String {
    value.chars().filter(|c| !UNSAFE_CHARS.contains(c)).collect()
}

/// Generator of random printable tokens and uniform choices.
#[derive(Debug, Clone)]
pub struct TokenGenerator {
    rng: Xorshift64,
    alphabet: Vec<char>,
}

impl TokenGenerator {
    /// Create a generator with the given seed
    #[must_use]
    pub fn new(seed: Seed) -> Self {
        let alphabet = TOKEN_RANGES
            .iter()
            .flat_map(|&(lo, hi)| (lo..=hi).filter_map(char::from_u32))
            .collect();
        Self {
            rng: Xorshift64::new(seed),
            alphabet,
        }
    }

    /// Uniform integer in `[min, max]`
    pub fn length_in(&mut self, min: usize, max: usize) -> usize {
        if min >= max {
            return min;
        }
        self.rng.next_range(min as u64, max as u64 + 1) as usize
    }

    /// Pick one element uniformly, `None` for an empty slice
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.rng.next_range(0, items.len() as u64) as usize;
        items.get(idx)
    }

    /// Unsanitized token of exactly `len` characters
    pub fn token(&mut self, len: usize) -> String {
        let alphabet_len = self.alphabet.len() as u64;
        (0..len)
            .map(|_| self.alphabet[self.rng.next_range(0, alphabet_len) as usize])
            .collect()
    }

    /// Sanitized token usable as a file name, pre-sanitization length drawn from `[min, max]`
    ///
    /// Empty results and the `.`/`..` path components are redrawn.
    pub fn sanitized_token(&mut self, min: usize, max: usize) -> String {
        loop {
            let len = self.length_in(min.max(1), max.max(1));
            let token = sanitize(&self.token(len));
            if !matches!(token.as_str(), "" | "." | "..") {
                return token;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_value() {
        assert_eq!(Seed::from_u64(42).value(), 42);
        assert_eq!(Seed::default().value(), 0);
    }

    #[test]
    fn test_zero_seed_still_generates() {
        let mut tokens = TokenGenerator::new(Seed::from_u64(0));
        assert_eq!(tokens.token(8).chars().count(), 8);
    }

    #[test]
    fn test_same_seed_same_tokens() {
        let mut a = TokenGenerator::new(Seed::from_u64(7));
        let mut b = TokenGenerator::new(Seed::from_u64(7));
        for _ in 0..20 {
            assert_eq!(a.sanitized_token(1, 60), b.sanitized_token(1, 60));
        }
    }

    #[test]
    fn test_different_seed_different_tokens() {
        let mut a = TokenGenerator::new(Seed::from_u64(1));
        let mut b = TokenGenerator::new(Seed::from_u64(2));
        assert_ne!(a.token(32), b.token(32));
    }

    #[test]
    fn test_alphabet_only_from_ranges() {
        let mut tokens = TokenGenerator::new(Seed::from_u64(99));
        let token = tokens.token(500);
        for c in token.chars() {
            let cp = c as u32;
            assert!(
                TOKEN_RANGES.iter().any(|&(lo, hi)| cp >= lo && cp <= hi),
                "unexpected code point {cp:#x}"
            );
            assert!(!c.is_control());
            assert_ne!(c, ' ');
        }
    }

    #[test]
    fn test_sanitize_strips_unsafe() {
        assert_eq!(sanitize("a/b\\c\u{0}d e:f&g"), "abcdefg");
        assert_eq!(sanitize("safe-name.yml"), "safe-name.yml");
    }

    #[test]
    fn test_sanitized_token_is_safe_and_bounded() {
        let mut tokens = TokenGenerator::new(Seed::from_u64(2024));
        for _ in 0..200 {
            let token = tokens.sanitized_token(1, 20);
            assert!(!token.is_empty());
            assert!(token.chars().count() <= 20);
            assert!(!token.contains(UNSAFE_CHARS));
        }
    }

    #[test]
    fn test_sanitized_token_never_dot_component() {
        // seed 9554 draws "." first
        let mut tokens = TokenGenerator::new(Seed::from_u64(9554));
        let token = tokens.sanitized_token(1, 20);
        assert_ne!(token, ".");
        for seed in 0..2000 {
            let mut tokens = TokenGenerator::new(Seed::from_u64(seed));
            let token = tokens.sanitized_token(1, 20);
            assert!(token != "." && token != "..", "seed {seed} drew {token:?}");
        }
    }

    #[test]
    fn test_length_in_bounds() {
        let mut tokens = TokenGenerator::new(Seed::from_u64(5));
        let mut seen_min = false;
        let mut seen_max = false;
        for _ in 0..2000 {
            let len = tokens.length_in(1, 20);
            assert!((1..=20).contains(&len));
            seen_min |= len == 1;
            seen_max |= len == 20;
        }
        assert!(seen_min && seen_max);
    }

    #[test]
    fn test_choose() {
        let mut tokens = TokenGenerator::new(Seed::from_u64(3));
        let empty: [u8; 0] = [];
        assert!(tokens.choose(&empty).is_none());
        let items = ["fr", "de", "es"];
        for _ in 0..50 {
            assert!(items.contains(tokens.choose(&items).unwrap()));
        }
    }
}
