//! Episode identity within a series
//!
//! Sources number their chapters in different ways: plain integers, half
//! chapters such as `12.5`, or slugs such as `prologue` or `ep-12`. All of them
//! are normalised into an [`EpisodeKey`] at the adapter boundary.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Totally ordered episode identifier
///
/// Ordering rules:
/// - numeric keys (`Integer`, `Decimal`) compare by value and sort before slugs
/// - slugs compare naturally: digit runs compare as numbers, so `ep-2 < ep-10`
///
/// Build keys with [`EpisodeKey::parse`] or [`EpisodeKey::decimal`]; both
/// normalise integral decimals into `Integer`, which keeps the archive file
/// name of every key unique.
#[derive(Debug, Clone)]
pub enum EpisodeKey {
    /// Whole chapter number
    Integer(u64),

    /// Fractional chapter number (half chapters, specials)
    Decimal(f64),

    /// Source-defined textual identifier
    Slug(String),
}

impl EpisodeKey {
    /// Parses a raw episode marker as found in a URL or a document
    ///
    /// Returns `None` for empty input and for values that cannot be used as a
    /// file name (path separators, `.` or `..`).
    ///
    /// # Examples
    ///
    /// ```
    /// use toon_leech::model::EpisodeKey;
    ///
    /// assert_eq!(EpisodeKey::parse("12"), Some(EpisodeKey::Integer(12)));
    /// assert_eq!(EpisodeKey::parse("12.0"), Some(EpisodeKey::Integer(12)));
    /// assert_eq!(EpisodeKey::parse("12.5"), Some(EpisodeKey::Decimal(12.5)));
    /// assert_eq!(EpisodeKey::parse("ep-3"), Some(EpisodeKey::Slug("ep-3".into())));
    /// assert_eq!(EpisodeKey::parse("../etc"), None);
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Ok(number) = trimmed.parse::<u64>() {
            return Some(Self::Integer(number));
        }

        if trimmed.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
            if let Ok(value) = trimmed.parse::<f64>() {
                return Self::decimal(value);
            }
        }

        if trimmed == "." || trimmed == ".." || trimmed.contains(['/', '\\', '\0']) {
            return None;
        }

        Some(Self::Slug(trimmed.to_string()))
    }

    /// Builds a numeric key, collapsing integral values into `Integer`
    pub fn decimal(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        if value.fract() == 0.0 && value <= u64::MAX as f64 {
            return Some(Self::Integer(value as u64));
        }
        Some(Self::Decimal(value))
    }

    /// Returns the numeric value of the key, if it has one
    pub fn numeric_value(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Decimal(d) => Some(*d),
            Self::Slug(_) => None,
        }
    }

    /// File stem used for the archive of this episode
    pub fn file_stem(&self) -> String {
        self.to_string()
    }

    /// Converts the key to its database representation
    pub fn to_db_string(&self) -> String {
        match self {
            Self::Integer(n) => format!("i:{}", n),
            Self::Decimal(d) => format!("d:{}", d),
            Self::Slug(s) => format!("s:{}", s),
        }
    }

    /// Parses a key from its database representation
    ///
    /// Slug payloads go through [`EpisodeKey::parse`], so a numeric-looking
    /// slug such as `s:12` comes back as `Integer(12)` and shares its archive.
    pub fn from_db_string(s: &str) -> Option<Self> {
        let (tag, value) = s.split_once(':')?;
        match tag {
            "i" => value.parse().ok().map(Self::Integer),
            "d" => value.parse().ok().and_then(Self::decimal),
            "s" => Self::parse(value),
            _ => None,
        }
    }
}

impl fmt::Display for EpisodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{}", n),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::Slug(s) => f.write_str(s),
        }
    }
}

impl Ord for EpisodeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Slug(a), Self::Slug(b)) => natural_cmp(a, b),
            (Self::Slug(_), _) => Ordering::Greater,
            (_, Self::Slug(_)) => Ordering::Less,
            _ => {
                // Both numeric, at least one decimal
                let a = self.numeric_value().unwrap_or_default();
                let b = other.numeric_value().unwrap_or_default();
                a.total_cmp(&b)
            }
        }
    }
}

impl PartialOrd for EpisodeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for EpisodeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EpisodeKey {}

impl Hash for EpisodeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Must agree with `Eq`, where Integer(12) == Decimal(12.0)
        match self.numeric_value() {
            Some(value) => {
                0u8.hash(state);
                value.to_bits().hash(state);
            }
            None => {
                1u8.hash(state);
                self.to_string().hash(state);
            }
        }
    }
}

/// Compares two strings treating runs of ASCII digits as numbers
///
/// Falls back to byte order when the natural comparison ties, so that two
/// different strings never compare equal.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = match (is_digits(x), is_digits(y)) {
                    (true, true) => cmp_digit_runs(x, y),
                    _ => x.cmp(y),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn is_digits(s: &str) -> bool {
    s.bytes().next().is_some_and(|b| b.is_ascii_digit())
}

fn cmp_digit_runs(x: &str, y: &str) -> Ordering {
    let x = x.trim_start_matches('0');
    let y = y.trim_start_matches('0');
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}

/// Splits a string into alternating digit and non-digit runs
struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.rest.bytes().next()?;
        let digit = first.is_ascii_digit();
        let end = self
            .rest
            .bytes()
            .position(|b| b.is_ascii_digit() != digit)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }
}
