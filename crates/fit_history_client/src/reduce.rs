//! Reductions of provider series into summary values.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{DataPoint, DataReadResponse, DataSet, Field, FitError};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HeartRateSample {
    pub timestamp_millis: i64,
    pub bpm: f64,
}

impl HeartRateSample {
    pub fn new(timestamp_millis: i64, bpm: f64) -> Self {
        Self {
            timestamp_millis,
            bpm,
        }
    }
}

/// Heart-rate samples of a data set; points without a `bpm` value are skipped.
pub fn heart_rate_samples(data_set: &DataSet) -> Vec<HeartRateSample> {
    data_set
        .points
        .iter()
        .filter_map(|p| {
            let bpm = p.value(&Field::BPM)?.as_float()?;
            Some(HeartRateSample::new(p.start_millis(), bpm))
        })
        .collect()
}

/// Trapezoidal time integral of heart rate divided by the elapsed time.
///
/// A single sample is its own average. Samples are ordered by timestamp
/// first; if they all share one timestamp the plain mean is returned.
pub fn time_weighted_average(samples: &[HeartRateSample]) -> Result<f64, FitError> {
    match samples {
        [] => Err(FitError::EmptySeries("heart rate")),
        [only] => Ok(only.bpm),
        _ => {
            let mut ordered = samples.to_vec();
            ordered.sort_by_key(|s| s.timestamp_millis);

            let (weighted, elapsed) =
                ordered
                    .windows(2)
                    .fold((0.0_f64, 0_i64), |(sum, total), pair| {
                        let weight = pair[1].timestamp_millis - pair[0].timestamp_millis;
                        let midpoint = (pair[0].bpm + pair[1].bpm) / 2.0;
                        (sum + weight as f64 * midpoint, total + weight)
                    });

            if elapsed == 0 {
                let mean = ordered.iter().map(|s| s.bpm).sum::<f64>() / ordered.len() as f64;
                return Ok(mean);
            }
            Ok(weighted / elapsed as f64)
        }
    }
}

/// Sum of the `steps` field over `points`.
pub fn total_steps<'a, I>(points: I) -> Result<i64, FitError>
where
    I: IntoIterator<Item = &'a DataPoint>,
{
    let (total, counted) = points
        .into_iter()
        .filter_map(|p| p.value(&Field::STEPS)?.as_int())
        .fold((0_i64, 0_usize), |(total, n), steps| {
            (total.saturating_add(steps), n + 1)
        });
    if counted == 0 {
        return Err(FitError::EmptySeries("step count"));
    }
    Ok(total)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyBucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub steps: i64,
}

/// Step total per bucket; buckets without step data count zero.
pub fn daily_totals(response: &DataReadResponse) -> Vec<DailyBucket> {
    response
        .buckets
        .iter()
        .map(|bucket| DailyBucket {
            start: DateTime::from_timestamp_millis(bucket.start_millis).unwrap_or_default(),
            end: DateTime::from_timestamp_millis(bucket.end_millis).unwrap_or_default(),
            steps: total_steps(bucket.data_sets.iter().flat_map(|ds| ds.points.iter()))
                .unwrap_or(0),
        })
        .collect()
}
