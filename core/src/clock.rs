//! Simulation clock and the tax calendar it is read against.

use crate::types::{RunId, Tick};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub run_id:       RunId,
    /// Index of the next tick to execute. Starts at 0.
    pub current_tick: Tick,
}

impl SimClock {
    pub fn new(run_id: RunId) -> Self {
        Self { run_id, current_tick: 0 }
    }

    /// Advance one tick. Returns the new tick number.
    pub fn advance(&mut self) -> Tick {
        self.current_tick += 1;
        self.current_tick
    }
}

/// Weekly tax calendar. All weeks are 0-based weeks of the year.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaxCalendar {
    pub weeks_per_year:     u64,
    /// Filing deadline.
    pub deadline_week:      u64,
    /// The audit campaign opens this many weeks after the deadline.
    pub audit_delay_weeks:  u64,
    /// Week of the targeted company-visit campaign.
    pub warning_visit_week: u64,
}

impl Default for TaxCalendar {
    fn default() -> Self {
        Self {
            weeks_per_year:     52,
            deadline_week:      12,
            audit_delay_weeks:  8,
            warning_visit_week: 35,
        }
    }
}

impl TaxCalendar {
    pub fn week_of_year(&self, tick: Tick) -> u64 {
        tick % self.weeks_per_year
    }

    /// Signed distance to this year's deadline. Negative once it has passed.
    pub fn weeks_until_deadline(&self, tick: Tick) -> i64 {
        self.deadline_week as i64 - self.week_of_year(tick) as i64
    }

    pub fn audit_campaign_week(&self) -> u64 {
        self.deadline_week + self.audit_delay_weeks
    }

    pub fn is_audit_campaign(&self, tick: Tick) -> bool {
        self.week_of_year(tick) == self.audit_campaign_week()
    }

    pub fn is_warning_visit(&self, tick: Tick) -> bool {
        self.week_of_year(tick) == self.warning_visit_week
    }

    /// 1.0 on the deadline week, falling linearly to just above 0 the week
    /// after it.
    pub fn deadline_proximity(&self, tick: Tick) -> f64 {
        let ahead = self.weeks_until_deadline(tick).rem_euclid(self.weeks_per_year as i64);
        1.0 - ahead as f64 / self.weeks_per_year as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_wraps_each_year() {
        let cal = TaxCalendar::default();
        assert_eq!(cal.weeks_until_deadline(11), 1);
        assert_eq!(cal.weeks_until_deadline(52 + 11), 1);
        assert_eq!(cal.weeks_until_deadline(13), -1);
        assert!(cal.is_audit_campaign(20));
        assert!(cal.is_audit_campaign(72));
        assert!(!cal.is_audit_campaign(21));
    }

    #[test]
    fn proximity_peaks_on_deadline_week() {
        let cal = TaxCalendar::default();
        assert_eq!(cal.deadline_proximity(12), 1.0);
        assert!(cal.deadline_proximity(11) > cal.deadline_proximity(4));
        assert!(cal.deadline_proximity(13) < 0.05);
    }
}
