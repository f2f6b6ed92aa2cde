//! Position selectors shared by chunk resolution and part lookup.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;

use super::error::{ScriptError, ScriptResult};
use super::value::Value;

/// A 1-based position, or one of the symbolic positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ordinal {
    /// A natural number (`first` is `Number(1)`).
    Number(NonZeroUsize),
    /// The final match.
    Last,
    /// The match at `count / 2`, zero-based.
    Middle,
    /// A uniformly random match.
    Any,
}

impl Ordinal {
    /// Ordinal for a natural number; zero and negatives are rejected.
    pub fn nth(number: i64) -> ScriptResult<Self> {
        usize::try_from(number)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Ordinal::Number)
            .ok_or_else(|| ScriptError::InvalidOrdinal {
                found: number.to_string(),
            })
    }

    /// Read an ordinal from a script value: a natural number or one of
    /// `last`, `middle`/`mid`, `any`.
    pub fn from_value(value: &Value) -> ScriptResult<Self> {
        if let Value::Text(text) = value {
            match text.trim().to_ascii_lowercase().as_str() {
                "last" => return Ok(Ordinal::Last),
                "middle" | "mid" => return Ok(Ordinal::Middle),
                "any" => return Ok(Ordinal::Any),
                _ => {}
            }
        }
        match value.as_integer() {
            Some(number) if number >= 1 => Ordinal::nth(number),
            _ => Err(ScriptError::InvalidOrdinal {
                found: value.string_value(),
            }),
        }
    }

    /// Zero-based index of this ordinal among `count` matches, or `None` when
    /// it falls outside `[0, count)`.
    pub fn resolve(&self, count: usize, source: &mut dyn OrdinalSource) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let index = match self {
            Ordinal::Number(number) => number.get() - 1,
            Ordinal::Last => count - 1,
            Ordinal::Middle => count / 2,
            Ordinal::Any => source.pick(count),
        };
        (index < count).then_some(index)
    }
}

impl fmt::Display for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ordinal::Number(number) => write!(f, "{}", number),
            Ordinal::Last => f.write_str("last"),
            Ordinal::Middle => f.write_str("middle"),
            Ordinal::Any => f.write_str("any"),
        }
    }
}

/// Random choice used for the ANY ordinal.
pub trait OrdinalSource: Send {
    /// Pick an index in `[0, count)`; `count` is never zero.
    fn pick(&mut self, count: usize) -> usize;
}

/// `StdRng`-backed source; seed it for reproducible runs.
pub struct SeededSource {
    rng: StdRng,
}

impl SeededSource {
    /// Deterministic source for the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Source seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeded when `seed` is given, entropy-backed otherwise.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::new(seed),
            None => Self::from_entropy(),
        }
    }
}

impl OrdinalSource for SeededSource {
    fn pick(&mut self, count: usize) -> usize {
        self.rng.gen_range(0..count)
    }
}

/// Source that always picks the same index (clamped to the match count).
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSource(pub usize);

impl OrdinalSource for FixedSource {
    fn pick(&mut self, count: usize) -> usize {
        self.0.min(count - 1)
    }
}
