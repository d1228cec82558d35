use serde::{Deserialize, Serialize};

/// Number of work/break half-cycles since the last long break or stop.
///
/// Stored as a count of halves so that `+0.5` steps stay exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionProgress(u32);

impl SessionProgress {
    pub const ZERO: Self = Self(0);

    pub fn from_halves(halves: u32) -> Self {
        Self(halves)
    }

    pub fn halves(self) -> u32 {
        self.0
    }

    /// Progress as the half-integer the UI displays (e.g. `1.5`).
    pub fn value(self) -> f64 {
        f64::from(self.0) / 2.0
    }

    pub(crate) fn advance(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    /// True when the work duration just finished is the last one before a long break.
    pub(crate) fn at_last_work(self, work_intervals: u32) -> bool {
        self.0 + 1 >= work_intervals.saturating_mul(2)
    }

    /// Reduce modulo `work_intervals` when the counter exceeds it.
    pub(crate) fn wrap_above(&mut self, work_intervals: u32) {
        let limit = work_intervals.max(1).saturating_mul(2);
        if self.0 > limit {
            self.0 %= limit;
        }
    }

    /// Unconditional modulo, applied after a long break.
    pub(crate) fn wrap(&mut self, work_intervals: u32) {
        self.0 %= work_intervals.max(1).saturating_mul(2);
    }

    pub fn within(self, work_intervals: u32) -> bool {
        self.0 <= work_intervals.saturating_mul(2)
    }
}

impl std::fmt::Display for SessionProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}", self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_half_of_count() {
        assert_eq!(SessionProgress::from_halves(3).value(), 1.5);
        assert_eq!(SessionProgress::from_halves(3).to_string(), "1.5");
    }

    #[test]
    fn wrap_above_only_when_exceeding() {
        let mut p = SessionProgress::from_halves(4);
        p.wrap_above(2);
        assert_eq!(p.halves(), 4);

        let mut p = SessionProgress::from_halves(7);
        p.wrap_above(2);
        assert_eq!(p.halves(), 3);
    }

    #[test]
    fn last_work_detection() {
        assert!(!SessionProgress::from_halves(1).at_last_work(2));
        assert!(SessionProgress::from_halves(3).at_last_work(2));
        // Intervals lowered below the current count still ends in a long break.
        assert!(SessionProgress::from_halves(5).at_last_work(2));
    }
}
