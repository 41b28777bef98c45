//! Coverage classification and propagation.
//!
//! Every computed value carries a [`CoverageFlag`]: `Actual` when every
//! input its formula needed was present, `Partial` otherwise. The flag is a
//! wrapper type threaded through every intermediate result rather than
//! ambient state, so propagation correctness is enforced by the type of
//! each computation.
//!
//! A `Partial` row never silently substitutes zero for a missing input; the
//! only place missing values are zero-filled is the explicitly labeled
//! `total_sum_min` aggregate (see [`crate::engine::aggregate`]).

use serde::{Deserialize, Serialize};

/// Per-row indicator of input completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoverageFlag {
    Actual,
    Partial,
}

impl CoverageFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageFlag::Actual => "ACTUAL",
            CoverageFlag::Partial => "PARTIAL",
        }
    }

    /// Combined flag for a value built from two upstreams: Partial if
    /// either side is Partial (logical OR across required inputs).
    pub fn combine(self, other: CoverageFlag) -> CoverageFlag {
        if self == CoverageFlag::Actual && other == CoverageFlag::Actual {
            CoverageFlag::Actual
        } else {
            CoverageFlag::Partial
        }
    }
}

/// A numeric value together with its coverage flag.
///
/// `value` is `None` when the formula that produced it directly consumed a
/// missing input. A `Partial` flag with a present value is legal for
/// sub-computations that did not need the missing input themselves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Covered<T> {
    pub value: Option<T>,
    pub flag: CoverageFlag,
}

impl<T> Covered<T> {
    /// A fully-covered value.
    pub fn actual(value: T) -> Self {
        Self {
            value: Some(value),
            flag: CoverageFlag::Actual,
        }
    }

    /// A missing required input: no value, Partial.
    pub fn missing() -> Self {
        Self {
            value: None,
            flag: CoverageFlag::Partial,
        }
    }

    /// A present value that already inherited a Partial flag upstream.
    pub fn partial(value: T) -> Self {
        Self {
            value: Some(value),
            flag: CoverageFlag::Partial,
        }
    }

    /// `Some` -> Actual, `None` -> missing/Partial.
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::actual(v),
            None => Self::missing(),
        }
    }

    pub fn is_actual(&self) -> bool {
        self.flag == CoverageFlag::Actual
    }

    /// Transform the value, keeping the flag. The formula did not consume
    /// any new input, so coverage is unchanged.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Covered<U> {
        Covered {
            value: self.value.map(f),
            flag: self.flag,
        }
    }

    /// Combine two covered inputs. The result is present only when both
    /// inputs are present, and Actual only when both are Actual. This is
    /// the inheritance rule: a derived metric built from flagged upstreams
    /// never re-checks raw inputs.
    pub fn zip_with<U, V>(self, other: Covered<U>, f: impl FnOnce(T, U) -> V) -> Covered<V> {
        let flag = self.flag.combine(other.flag);
        let value = match (self.value, other.value) {
            (Some(a), Some(b)) => Some(f(a, b)),
            _ => None,
        };
        Covered { value, flag }
    }
}

/// Resolve the FX conversion rate for a settlement row.
///
/// A value already denominated in the base reporting currency converts at
/// exactly 1.0 and can never be missing. Non-base currencies require an
/// explicit rate; its absence forces Partial on everything built from the
/// converted amount.
pub fn fx_rate_for(currency: &str, base_currency: &str, rate: Option<f64>) -> Covered<f64> {
    if currency == base_currency {
        Covered::actual(1.0)
    } else {
        Covered::from_option(rate)
    }
}
