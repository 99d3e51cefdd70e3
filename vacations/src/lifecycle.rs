//! Pure rules of the vacation lifecycle.
//!
//! ```text
//! Scheduled ──start──▶ InProgress ──finalize──▶ Finalized
//!     │
//!     └──cancel──▶ Canceled
//! ```
//!
//! Nothing here touches the store. Services and appliers load a snapshot,
//! ask these functions what the next state is, and write the answer back.

use crate::events::StatusAction;
use crate::types::{Days, VacationStatus};
use chrono::NaiveDate;
use thiserror::Error;

/// A requested move through the lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Scheduled → InProgress
    Start,
    /// InProgress → Finalized
    Finalize,
    /// Scheduled → Canceled
    Cancel,
}

impl Transition {
    /// Name used in errors and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Finalize => "finalize",
            Self::Cancel => "cancel",
        }
    }
}

impl From<StatusAction> for Transition {
    fn from(action: StatusAction) -> Self {
        match action {
            StatusAction::Start => Self::Start,
            StatusAction::Finalize => Self::Finalize,
        }
    }
}

/// The transition is not an edge of the lifecycle graph.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Cannot {} a vacation with status '{from}'", .transition.as_str())]
pub struct IllegalTransition {
    /// Current status
    pub from: VacationStatus,
    /// Attempted transition
    pub transition: Transition,
}

/// Status reached by applying `transition` to `from`.
///
/// # Errors
///
/// Returns [`IllegalTransition`] for every pair that is not an edge.
pub const fn next_status(
    from: VacationStatus,
    transition: Transition,
) -> Result<VacationStatus, IllegalTransition> {
    match (from, transition) {
        (VacationStatus::Scheduled, Transition::Start) => Ok(VacationStatus::InProgress),
        (VacationStatus::InProgress, Transition::Finalize) => Ok(VacationStatus::Finalized),
        (VacationStatus::Scheduled, Transition::Cancel) => Ok(VacationStatus::Canceled),
        _ => Err(IllegalTransition { from, transition }),
    }
}

/// Whether a schedule in `status` still holds its dates.
#[must_use]
pub const fn blocks_dates(status: VacationStatus) -> bool {
    matches!(status, VacationStatus::Scheduled | VacationStatus::InProgress)
}

/// End date does not come after the start date.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("End date {end} must be after start date {start}")]
pub struct InvalidRange {
    /// Requested start
    pub start: NaiveDate,
    /// Requested end
    pub end: NaiveDate,
}

/// A validated vacation period with inclusive bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Validate a requested period.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRange`] when `end <= start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvalidRange> {
        if end <= start {
            return Err(InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Range of an already persisted schedule, taken as-is.
    #[must_use]
    pub const fn stored(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// First day
    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day
    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered, both bounds included.
    #[must_use]
    pub fn total_days(&self) -> i64 {
        inclusive_day_count(self.start, self.end)
    }

    /// The two ranges share at least one day.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Days from `start` to `end`, both included.
#[must_use]
pub fn inclusive_day_count(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

/// Booking `total_days` fits in `balance`.
#[must_use]
pub fn has_sufficient_balance(total_days: i64, balance: Days) -> bool {
    Days::whole(total_days) <= balance
}

/// Balance after crediting `days_to_add`, rounded to two places.
#[must_use]
pub fn accrue(balance_before: Days, days_to_add: Days) -> Days {
    balance_before.plus(days_to_add)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const ALL_STATUSES: [VacationStatus; 4] = [
        VacationStatus::Scheduled,
        VacationStatus::InProgress,
        VacationStatus::Finalized,
        VacationStatus::Canceled,
    ];

    #[test]
    fn only_three_edges_exist() {
        let transitions = [Transition::Start, Transition::Finalize, Transition::Cancel];
        let mut legal = Vec::new();
        for from in ALL_STATUSES {
            for transition in transitions {
                if let Ok(to) = next_status(from, transition) {
                    legal.push((from, transition, to));
                }
            }
        }
        assert_eq!(
            legal,
            vec![
                (VacationStatus::Scheduled, Transition::Start, VacationStatus::InProgress),
                (VacationStatus::Scheduled, Transition::Cancel, VacationStatus::Canceled),
                (VacationStatus::InProgress, Transition::Finalize, VacationStatus::Finalized),
            ]
        );
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for from in [VacationStatus::Finalized, VacationStatus::Canceled] {
            assert!(from.is_terminal());
            for transition in [Transition::Start, Transition::Finalize, Transition::Cancel] {
                assert!(next_status(from, transition).is_err());
            }
        }
    }

    #[test]
    fn illegal_transition_message() {
        let err = next_status(VacationStatus::InProgress, Transition::Cancel).unwrap_err();
        assert_eq!(err.to_string(), "Cannot cancel a vacation with status 'in_progress'");
    }

    #[test]
    fn range_requires_end_after_start() {
        assert!(DateRange::new(date(2024, 3, 1), date(2024, 3, 1)).is_err());
        assert!(DateRange::new(date(2024, 3, 2), date(2024, 3, 1)).is_err());
        let range = DateRange::new(date(2024, 3, 1), date(2024, 3, 5)).unwrap();
        assert_eq!(range.total_days(), 5);
    }

    #[test]
    fn day_count_crosses_month_and_leap_day() {
        assert_eq!(inclusive_day_count(date(2024, 2, 28), date(2024, 3, 1)), 3);
        assert_eq!(inclusive_day_count(date(2023, 12, 30), date(2024, 1, 2)), 4);
    }

    #[test]
    fn touching_ranges_overlap() {
        let a = DateRange::stored(date(2024, 3, 1), date(2024, 3, 5));
        let b = DateRange::stored(date(2024, 3, 5), date(2024, 3, 8));
        let c = DateRange::stored(date(2024, 3, 6), date(2024, 3, 8));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn sufficiency_is_inclusive() {
        assert!(has_sufficient_balance(5, Days::new(dec!(8.75))));
        assert!(has_sufficient_balance(5, Days::new(dec!(5.00))));
        assert!(!has_sufficient_balance(9, Days::new(dec!(8.75))));
    }

    #[test]
    fn only_open_schedules_block_dates() {
        assert!(blocks_dates(VacationStatus::Scheduled));
        assert!(blocks_dates(VacationStatus::InProgress));
        assert!(!blocks_dates(VacationStatus::Finalized));
        assert!(!blocks_dates(VacationStatus::Canceled));
    }

    #[test]
    fn accrual_example() {
        let after = accrue(Days::new(dec!(15.00)), Days::new(dec!(1.25)));
        assert_eq!(after.value(), dec!(16.25));
    }

    fn any_date() -> impl Strategy<Value = NaiveDate> {
        (0i64..3650).prop_map(|offset| date(2020, 1, 1) + chrono::Duration::days(offset))
    }

    fn any_range() -> impl Strategy<Value = DateRange> {
        (any_date(), 1i64..60).prop_map(|(start, len)| {
            DateRange::new(start, start + chrono::Duration::days(len)).unwrap()
        })
    }

    proptest! {
        #[test]
        fn overlap_is_symmetric(a in any_range(), b in any_range()) {
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        #[test]
        fn overlap_matches_shared_day(a in any_range(), b in any_range()) {
            let shared = a.start().max(b.start()) <= a.end().min(b.end());
            prop_assert_eq!(a.overlaps(&b), shared);
        }

        #[test]
        fn a_range_overlaps_itself(a in any_range()) {
            prop_assert!(a.overlaps(&a));
        }

        #[test]
        fn day_count_is_difference_plus_one(start in any_date(), len in 1i64..400) {
            let end = start + chrono::Duration::days(len);
            prop_assert_eq!(inclusive_day_count(start, end), len + 1);
        }

        #[test]
        fn accrual_rounds_to_two_places(before in 0i64..100_000, add in 1i64..100_000) {
            let before = Days::new(Decimal::new(before, 2));
            let add = Days::new(Decimal::new(add, 3));
            let after = accrue(before, add);
            prop_assert!(after.value().scale() <= 2);
            prop_assert_eq!(after, Days::new(before.value() + add.value()));
        }
    }
}
