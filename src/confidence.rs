//! Confidence scores.
//!
//! Every inference the engine makes carries a confidence in `[0, 1]`.
//! Within one processing pass confidence only moves one way: downward.
//! `decay` is the only combining operation the pipeline uses, and it
//! multiplies by a factor clamped to `[0, 1]`, so a score can never recover
//! once evidence has weakened it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A validated confidence score in `[0.0, 1.0]`.
///
/// # Examples
///
/// ```
/// use aidflow::Confidence;
///
/// let conf = Confidence::new(0.9).unwrap();
/// let decayed = conf.decay(0.7);
/// assert!((decayed.value() - 0.63).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Confidence(f32);

impl Confidence {
    /// Minimum valid confidence value.
    pub const MIN_VALUE: f32 = 0.0;

    /// Maximum valid confidence value.
    pub const MAX_VALUE: f32 = 1.0;

    /// Creates a new confidence with validation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ConfidenceOutOfRange` if the value is NaN or
    /// not in [0.0, 1.0].
    pub fn new(value: f32) -> Result<Self, ValidationError> {
        if value.is_nan() || !(Self::MIN_VALUE..=Self::MAX_VALUE).contains(&value) {
            return Err(ValidationError::ConfidenceOutOfRange { value });
        }
        Ok(Self(value))
    }

    /// Creates a confidence by clamping the value into range.
    ///
    /// NaN clamps to zero. Use `new` when out-of-range input should be an
    /// error rather than silently corrected.
    #[must_use]
    pub fn clamped(value: f32) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(Self::MIN_VALUE, Self::MAX_VALUE))
    }

    /// Complete uncertainty.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Complete certainty.
    #[must_use]
    pub const fn one() -> Self {
        Self(1.0)
    }

    pub const fn value(&self) -> f32 {
        self.0
    }

    /// Multiplies by `factor`, which is clamped into `[0, 1]` first.
    ///
    /// The result is never larger than `self`.
    #[must_use]
    pub fn decay(&self, factor: f32) -> Self {
        Self::clamped(self.0 * Self::clamped(factor).0)
    }

    /// Combines two confidences conservatively, keeping the minimum.
    #[must_use]
    pub fn min(&self, other: Self) -> Self {
        if other.0 < self.0 {
            other
        } else {
            *self
        }
    }

    /// Returns true if the score is at or below `floor`.
    #[must_use]
    pub fn is_below(&self, floor: f32) -> bool {
        self.0 < floor
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::zero()
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = f32::deserialize(deserializer)?;
        Confidence::new(raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_valid_values() {
        assert!(Confidence::new(0.0).is_ok());
        assert!(Confidence::new(0.5).is_ok());
        assert!(Confidence::new(1.0).is_ok());
    }

    #[test]
    fn test_confidence_invalid_values() {
        assert!(Confidence::new(-0.1).is_err());
        assert!(Confidence::new(1.1).is_err());
        assert!(Confidence::new(f32::NAN).is_err());
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(Confidence::clamped(1.5).value(), 1.0);
        assert_eq!(Confidence::clamped(-0.5).value(), 0.0);
        assert_eq!(Confidence::clamped(f32::NAN).value(), 0.0);
        assert_eq!(Confidence::clamped(0.42).value(), 0.42);
    }

    #[test]
    fn test_confidence_decay_never_increases() {
        let conf = Confidence::new(0.8).unwrap();
        assert!(conf.decay(0.9).value() <= conf.value());
        // A factor above 1.0 is clamped, so decay still cannot increase.
        assert!(conf.decay(2.0).value() <= conf.value());
        assert_eq!(conf.decay(0.0).value(), 0.0);
    }

    #[test]
    fn test_confidence_decay_is_multiplicative() {
        let conf = Confidence::one().decay(0.7).decay(0.9);
        assert!((conf.value() - 0.63).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_min() {
        let a = Confidence::new(0.8).unwrap();
        let b = Confidence::new(0.6).unwrap();
        assert_eq!(a.min(b).value(), 0.6);
        assert_eq!(b.min(a).value(), 0.6);
    }

    #[test]
    fn test_confidence_is_below() {
        let conf = Confidence::new(0.65).unwrap();
        assert!(conf.is_below(0.7));
        assert!(!conf.is_below(0.5));
        assert!(!conf.is_below(0.65));
    }

    #[test]
    fn test_confidence_zero_and_one() {
        assert_eq!(Confidence::zero().value(), 0.0);
        assert_eq!(Confidence::one().value(), 1.0);
    }

    #[test]
    fn test_confidence_serialization() {
        let conf = Confidence::new(0.75).unwrap();
        let json = serde_json::to_string(&conf).unwrap();
        assert_eq!(json, "0.75");
        let back: Confidence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, conf);
    }

    #[test]
    fn test_confidence_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Confidence>("1.5").is_err());
        assert!(serde_json::from_str::<Confidence>("-0.1").is_err());
    }

    #[test]
    fn test_confidence_display() {
        assert_eq!(format!("{}", Confidence::new(0.85).unwrap()), "0.85");
    }
}
