//! Revisit scheduling: a fixed, user-chosen vocabulary of day intervals.
//!
//! There is no adaptive component. A correct answer is rescheduled by the
//! interval the reviewer picks; an incorrect one always comes back tomorrow.

/// Interval written for a card answered incorrectly.
pub const INCORRECT_INTERVAL: i64 = 1;

pub fn is_due(revisit_in: i64) -> bool {
    revisit_in <= 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    OneDay,
    ThreeDays,
    SevenDays,
    NineDays,
}

impl Interval {
    pub const ALL: [Interval; 4] = [
        Interval::OneDay,
        Interval::ThreeDays,
        Interval::SevenDays,
        Interval::NineDays,
    ];

    pub fn days(self) -> i64 {
        match self {
            Interval::OneDay => 1,
            Interval::ThreeDays => 3,
            Interval::SevenDays => 7,
            Interval::NineDays => 9,
        }
    }

    /// Map a key press (`1`, `3`, `7`, `9`) to an interval.
    pub fn from_key(key: char) -> Option<Interval> {
        Interval::ALL
            .into_iter()
            .find(|i| key.to_digit(10).map(i64::from) == Some(i.days()))
    }
}
