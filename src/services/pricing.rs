use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::models::{DayPrice, PriceSource, PricingTable, Quote};

/// Dropoffs strictly after this time of day are billed one extra day.
const LATE_RETURN_CUTOFF_SECS: u32 = 12 * 60 * 60;

/// Longest rental, in calendar days between pickup and dropoff dates.
pub const MAX_RENTAL_DAYS: i64 = 90;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IntervalError {
    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid time: {0}")]
    InvalidTime(String),

    #[error("dropoff must be after pickup")]
    DropoffNotAfterPickup,

    #[error("rental period may not exceed {max_days} days")]
    TooLong { max_days: i64 },

    #[error("rental period is outside the supported calendar")]
    OutOfRange,
}

fn check_span(pickup: &NaiveDateTime, dropoff: &NaiveDateTime) -> Result<(), IntervalError> {
    if dropoff <= pickup {
        return Err(IntervalError::DropoffNotAfterPickup);
    }
    if (dropoff.date() - pickup.date()).num_days() > MAX_RENTAL_DAYS {
        return Err(IntervalError::TooLong {
            max_days: MAX_RENTAL_DAYS,
        });
    }
    Ok(())
}

/// Combines a `YYYY-MM-DD` date and an `HH:MM` time into a wall-clock instant.
pub fn merge_date_time(date: &str, time: &str) -> Result<NaiveDateTime, IntervalError> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| IntervalError::InvalidDate(date.to_string()))?;
    let time = parse_time(time)?;
    Ok(date.and_time(time))
}

fn parse_time(time: &str) -> Result<NaiveTime, IntervalError> {
    let trimmed = time.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| IntervalError::InvalidTime(time.to_string()))
}

/// Parses both ends of a rental and checks that dropoff is strictly after
/// pickup and no more than [`MAX_RENTAL_DAYS`] later.
pub fn rental_interval(
    pickup_date: &str,
    pickup_time: &str,
    dropoff_date: &str,
    dropoff_time: &str,
) -> Result<(NaiveDateTime, NaiveDateTime), IntervalError> {
    let pickup = merge_date_time(pickup_date, pickup_time)?;
    let dropoff = merge_date_time(dropoff_date, dropoff_time)?;
    check_span(&pickup, &dropoff)?;
    Ok((pickup, dropoff))
}

pub fn is_late_return(dropoff: &NaiveDateTime) -> bool {
    let time = dropoff.time();
    let secs = time.num_seconds_from_midnight();
    secs > LATE_RETURN_CUTOFF_SECS || (secs == LATE_RETURN_CUTOFF_SECS && time.nanosecond() > 0)
}

/// Billable days: calendar-date difference floored at one, plus one when the
/// car comes back after the noon cutoff.
pub fn compute_rental_days(pickup: &NaiveDateTime, dropoff: &NaiveDateTime) -> i64 {
    let mut days = (dropoff.date() - pickup.date()).num_days().max(1);
    if is_late_return(dropoff) {
        days += 1;
    }
    days
}

/// Prices one calendar date: calendar override, then special range, then base rate.
pub fn price_day(table: &PricingTable, date: NaiveDate) -> DayPrice {
    if let Some(calendar) = table.calendar.iter().find(|c| c.date == date) {
        return DayPrice {
            date,
            price_cents: calendar.price_cents,
            source: PriceSource::Calendar,
        };
    }

    if let Some(special) = table.special.iter().find(|s| s.covers(date)) {
        return DayPrice {
            date,
            price_cents: special.price_cents,
            source: PriceSource::Special,
        };
    }

    DayPrice {
        date,
        price_cents: table.base_cents,
        source: PriceSource::Base,
    }
}

pub fn price_range(
    table: &PricingTable,
    pickup: &NaiveDateTime,
    dropoff: &NaiveDateTime,
) -> Result<Quote, IntervalError> {
    check_span(pickup, dropoff)?;

    let days = compute_rental_days(pickup, dropoff);
    let start = pickup.date();
    let breakdown = (0..days as u64)
        .map(|offset| {
            start
                .checked_add_days(Days::new(offset))
                .map(|date| price_day(table, date))
                .ok_or(IntervalError::OutOfRange)
        })
        .collect::<Result<Vec<DayPrice>, _>>()?;
    let total_cents = breakdown.iter().map(|d| d.price_cents).sum();

    Ok(Quote {
        days,
        total_cents,
        breakdown,
    })
}

pub fn cents_to_amount(cents: i64) -> f64 {
    cents as f64 / 100.0
}

pub fn amount_to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Average daily price rounded to two decimals.
pub fn price_per_day(total_cents: i64, days: i64) -> f64 {
    if days <= 0 {
        return cents_to_amount(total_cents);
    }
    (total_cents as f64 / days as f64).round() / 100.0
}
