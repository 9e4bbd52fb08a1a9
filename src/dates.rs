use chrono::{Datelike, Days, NaiveDate};

/// First day APOD was published; no picture exists before it.
pub const LAUNCH_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1995, 6, 16) {
    Some(d) => d,
    None => panic!("invalid launch date"),
};

/// Selected calendar date plus the `[min, max]` range it must stay in.
///
/// Every mutator returns `true` when the selected date changed, which is the
/// caller's cue to start a new fetch.
#[derive(Debug, Clone)]
pub struct DateSelector {
    selected: NaiveDate,
    min: NaiveDate,
    max: NaiveDate,
    /// "Limit to this year" checkbox
    limit_range: bool,
}

impl DateSelector {
    pub fn new(today: NaiveDate) -> Self {
        let max = today.max(LAUNCH_DATE);
        Self {
            selected: max,
            min: LAUNCH_DATE,
            max,
            limit_range: false,
        }
    }

    pub fn selected(&self) -> NaiveDate {
        self.selected
    }

    pub fn min(&self) -> NaiveDate {
        self.min
    }

    pub fn max(&self) -> NaiveDate {
        self.max
    }

    pub fn limit_range(&self) -> bool {
        self.limit_range
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        (self.min..=self.max).contains(&date)
    }

    /// Select `date`, clamped into the current range.
    pub fn select(&mut self, date: NaiveDate) -> bool {
        let date = date.clamp(self.min, self.max);
        if date == self.selected {
            return false;
        }
        self.selected = date;
        true
    }

    /// Check or uncheck the range limit. A selection that falls outside the
    /// narrowed range snaps to the new minimum.
    pub fn set_limit_range(&mut self, checked: bool) -> bool {
        self.limit_range = checked;
        self.min = if checked {
            first_of_year(self.max)
        } else {
            LAUNCH_DATE
        };
        if self.selected < self.min {
            return self.select(self.min);
        }
        false
    }

    pub fn jump_to_launch(&mut self) -> bool {
        let clamped = self.set_limit_range(false);
        self.select(LAUNCH_DATE) || clamped
    }

    pub fn jump_to_today(&mut self) -> bool {
        self.select(self.max)
    }

    /// Move the selection by `delta` days, stopping at the range edges.
    pub fn step_days(&mut self, delta: i64) -> bool {
        let days = Days::new(delta.unsigned_abs());
        let target = if delta >= 0 {
            self.selected.checked_add_days(days)
        } else {
            self.selected.checked_sub_days(days)
        };
        match target {
            Some(d) => self.select(d),
            None => false,
        }
    }
}

fn first_of_year(date: NaiveDate) -> NaiveDate {
    date.with_ordinal(1).unwrap_or(date)
}

/// Parse a `YYYY-MM-DD` command line argument.
pub fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("invalid date \"{s}\" (expected YYYY-MM-DD): {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        ymd(2024, 8, 20)
    }

    #[test]
    fn starts_with_full_range_and_today_selected() {
        let sel = DateSelector::new(today());
        assert_eq!(sel.min(), ymd(1995, 6, 16));
        assert_eq!(sel.max(), today());
        assert_eq!(sel.selected(), today());
        assert!(!sel.limit_range());
    }

    #[test]
    fn every_date_in_range_is_selectable_when_unlimited() {
        let mut sel = DateSelector::new(today());
        for d in [LAUNCH_DATE, ymd(2000, 2, 29), ymd(2023, 12, 31), today()] {
            sel.select(d);
            assert_eq!(sel.selected(), d);
            assert!(sel.contains(d));
        }
    }

    #[test]
    fn select_clamps_outside_range() {
        let mut sel = DateSelector::new(today());
        assert!(sel.select(ymd(1990, 1, 1)));
        assert_eq!(sel.selected(), LAUNCH_DATE);
        assert!(sel.select(ymd(2030, 1, 1)));
        assert_eq!(sel.selected(), today());
    }

    #[test]
    fn select_same_date_does_not_notify() {
        let mut sel = DateSelector::new(today());
        assert!(!sel.select(today()));
    }

    #[test]
    fn toggle_moves_min_but_never_max() {
        let mut sel = DateSelector::new(today());
        sel.set_limit_range(true);
        assert_eq!(sel.min(), ymd(2024, 1, 1));
        assert_eq!(sel.max(), today());
        sel.set_limit_range(false);
        assert_eq!(sel.min(), LAUNCH_DATE);
        assert_eq!(sel.max(), today());
    }

    #[test]
    fn toggle_snaps_old_selection_to_new_min() {
        let mut sel = DateSelector::new(today());
        sel.select(ymd(2010, 5, 5));
        assert!(sel.set_limit_range(true));
        assert_eq!(sel.selected(), ymd(2024, 1, 1));
    }

    #[test]
    fn toggle_keeps_selection_already_in_range() {
        let mut sel = DateSelector::new(today());
        sel.select(ymd(2024, 3, 1));
        assert!(!sel.set_limit_range(true));
        assert_eq!(sel.selected(), ymd(2024, 3, 1));
    }

    #[test]
    fn jump_to_launch_clears_limit() {
        let mut sel = DateSelector::new(today());
        sel.set_limit_range(true);
        assert!(sel.jump_to_launch());
        assert!(!sel.limit_range());
        assert_eq!(sel.min(), LAUNCH_DATE);
        assert_eq!(sel.selected(), LAUNCH_DATE);
    }

    #[test]
    fn step_days_stops_at_edges() {
        let mut sel = DateSelector::new(today());
        assert!(!sel.step_days(1));
        assert!(sel.step_days(-1));
        assert_eq!(sel.selected(), ymd(2024, 8, 19));

        sel.select(LAUNCH_DATE);
        assert!(!sel.step_days(-1));
        assert_eq!(sel.selected(), LAUNCH_DATE);
    }

    #[test]
    fn parse_date_arg_accepts_iso_dates_only() {
        assert_eq!(parse_date_arg("2001-09-11"), Ok(ymd(2001, 9, 11)));
        assert!(parse_date_arg("20010911").is_err());
        assert!(parse_date_arg("yesterday").is_err());
    }
}
