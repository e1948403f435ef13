//! Time axis helpers: bucket assignment, dense resampling and forced windows.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use ndarray::Array1;

use super::Granularity;

/// Label of the bucket `date` falls into.
///
/// Days are their own bucket. Weeks end on Sunday and are labelled by that
/// Sunday, so a Sunday maps to itself and Monday..Saturday to the next Sunday.
#[inline]
pub fn bucket_of(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Day => date,
        Granularity::Week => {
            let ahead = (7 - date.weekday().num_days_from_sunday()) % 7;
            date + Duration::days(ahead as i64)
        }
    }
}

/// Every bucket label from `first` to `last`, inclusive.
/// Both ends must already be bucket labels.
pub fn date_range(first: NaiveDate, last: NaiveDate, granularity: Granularity) -> Vec<NaiveDate> {
    let step = match granularity {
        Granularity::Day => Duration::days(1),
        Granularity::Week => Duration::days(7),
    };
    let mut out = Vec::new();
    let mut cur = first;
    while cur <= last {
        out.push(cur);
        cur += step;
    }
    out
}

/// Sum dated vectors into buckets.
///
/// The result is dense from the first to the last occupied bucket; buckets
/// without rows hold a zero vector of length `dim`. No rows gives an empty
/// series.
pub fn resample<'a, I>(rows: I, granularity: Granularity, dim: usize) -> Vec<(NaiveDate, Array1<f64>)>
where
    I: IntoIterator<Item = (NaiveDate, &'a Array1<f64>)>,
{
    let mut buckets: BTreeMap<NaiveDate, Array1<f64>> = BTreeMap::new();
    for (date, vec) in rows {
        let acc = buckets
            .entry(bucket_of(date, granularity))
            .or_insert_with(|| Array1::zeros(dim));
        *acc += vec;
    }
    let (Some(first), Some(last)) = (buckets.keys().next().copied(), buckets.keys().next_back().copied()) else {
        return Vec::new();
    };
    date_range(first, last, granularity)
        .into_iter()
        .map(|d| {
            let v = buckets.remove(&d).unwrap_or_else(|| Array1::zeros(dim));
            (d, v)
        })
        .collect()
}

/// Left-join a series onto `window`: exactly one row per window date,
/// zero vectors where the series has no bucket.
pub fn reindex(series: Vec<(NaiveDate, Array1<f64>)>, window: &[NaiveDate], dim: usize) -> Vec<(NaiveDate, Array1<f64>)> {
    let by_date: BTreeMap<NaiveDate, Array1<f64>> = series.into_iter().collect();
    window
        .iter()
        .map(|d| {
            let v = by_date.get(d).cloned().unwrap_or_else(|| Array1::zeros(dim));
            (*d, v)
        })
        .collect()
}
