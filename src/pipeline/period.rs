//! Period calendar: which bucket a date falls into and how buckets follow
//! each other.
//!
//! Buckets are identified by their closing date: the day itself for daily
//! buckets, the Sunday ending the week for weekly buckets and the last
//! calendar day for monthly buckets.

use chrono::{Datelike, Days, NaiveDate};

use crate::models::Granularity;

/// The closing date of the bucket containing `date`.
pub fn label(granularity: Granularity, date: NaiveDate) -> NaiveDate {
    match granularity {
        Granularity::Daily => date,
        Granularity::Weekly => {
            let to_sunday = 6 - date.weekday().num_days_from_monday();
            date + Days::new(u64::from(to_sunday))
        }
        Granularity::Monthly => month_end(date.year(), date.month()),
    }
}

/// The first date covered by the bucket closing on `label`.
pub fn bucket_start(granularity: Granularity, label: NaiveDate) -> NaiveDate {
    match granularity {
        Granularity::Daily => label,
        Granularity::Weekly => label - Days::new(6),
        Granularity::Monthly => label.with_day(1).unwrap_or(label),
    }
}

/// The label of the bucket directly after the one closing on `label`.
pub fn next_label(granularity: Granularity, label: NaiveDate) -> NaiveDate {
    match granularity {
        Granularity::Daily => label + Days::new(1),
        Granularity::Weekly => label + Days::new(7),
        Granularity::Monthly => {
            let next = label + Days::new(1);
            month_end(next.year(), next.month())
        }
    }
}

/// Every bucket label within `[start, end]`, ascending.
pub fn grid(granularity: Granularity, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut labels = Vec::new();
    let mut current = label(granularity, start);
    while current <= end {
        labels.push(current);
        current = next_label(granularity, current);
    }
    labels
}

fn month_end(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}
