//! Reach-out cadence to day interval (pure math, no DB).

use crate::types::Cadence;

/// Interval used when the cadence is unknown or a custom cadence has no
/// usable day count.
pub const FALLBACK_DAYS: i64 = 30;

impl Cadence {
    /// Day interval for this cadence. `custom_days` only matters for `Custom`.
    pub fn days(&self, custom_days: Option<i64>) -> i64 {
        match self {
            Cadence::Weekly => 7,
            Cadence::Monthly => 30,
            Cadence::Quarterly => 90,
            Cadence::Custom => match custom_days {
                Some(days) if days > 0 => days,
                _ => FALLBACK_DAYS,
            },
        }
    }
}

/// Map a stored cadence value to its day interval. Never fails: unknown
/// values and custom cadences without a positive day count yield 30.
pub fn days_for_cadence(cadence: &str, custom_days: Option<i64>) -> i64 {
    match cadence.parse::<Cadence>() {
        Ok(c) => c.days(custom_days),
        Err(_) => FALLBACK_DAYS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_cadences() {
        assert_eq!(days_for_cadence("weekly", None), 7);
        assert_eq!(days_for_cadence("monthly", None), 30);
        assert_eq!(days_for_cadence("quarterly", None), 90);
    }

    #[test]
    fn test_custom_cadence() {
        assert_eq!(days_for_cadence("custom", Some(14)), 14);
        assert_eq!(days_for_cadence("custom", None), 30);
        assert_eq!(days_for_cadence("custom", Some(0)), 30);
        assert_eq!(days_for_cadence("custom", Some(-3)), 30);
    }

    #[test]
    fn test_unknown_cadence_falls_back() {
        assert_eq!(days_for_cadence("bogus", None), 30);
        assert_eq!(days_for_cadence("", Some(5)), 30);
    }

    #[test]
    fn test_custom_days_ignored_for_fixed_cadence() {
        assert_eq!(days_for_cadence("weekly", Some(3)), 7);
        assert_eq!(Cadence::Quarterly.days(Some(1)), 90);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(days_for_cadence("Weekly", None), 7);
    }
}
