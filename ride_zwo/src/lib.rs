//! Core power-stream to structured-workout conversion library.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

pub mod merge;
pub mod quantize;
pub mod resample;
pub mod segment;
pub mod smooth;
pub mod zwo;

pub use merge::merge_segments;
pub use quantize::{quantize, Quantized};
pub use resample::resample_1hz;
pub use segment::segment_runs;
pub use smooth::median_filter;
pub use zwo::{render_zwo, Workout, DEFAULT_FTP_W};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ZwoError {
    #[error("failed to parse activity: {0}")]
    Parse(String),
    #[error("insufficient data for resampling: {0}")]
    InsufficientData(String),
    #[error("invalid input series: {0}")]
    InvalidInput(String),
    #[error("power quantization failed: {0}")]
    Clustering(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ZwoError {
    /// Name of the pipeline stage that raised the error.
    pub fn stage(&self) -> &'static str {
        match self {
            ZwoError::Parse(_) => "load",
            ZwoError::InsufficientData(_) | ZwoError::InvalidInput(_) => "resample",
            ZwoError::Clustering(_) => "quantize",
            ZwoError::InvalidParameter(_) => "config",
        }
    }
}

/// How the segmenter closes the last run of the quantized series.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentEnd {
    /// The final sample is left out of the last run (`len - 1 - start`).
    #[default]
    Reference,
    /// The final sample counts toward the last run (`len - start`).
    Inclusive,
}

/// What happens to an accumulation that never reaches the minimum duration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Remainder {
    #[default]
    Drop,
    /// Emit it as a final, shorter interval.
    Emit,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Params {
    pub min_power_w: f64,
    pub median_window: usize,
    pub n_clusters: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub seed: u64,
    pub min_duration_s: u64,
    pub segment_end: SegmentEnd,
    pub remainder: Remainder,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            min_power_w: 100.0,
            median_window: 21,
            n_clusters: 7,
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
            seed: 0,
            min_duration_s: 30,
            segment_end: SegmentEnd::Reference,
            remainder: Remainder::Drop,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), ZwoError> {
        if !self.min_power_w.is_finite() || self.min_power_w < 0.0 {
            return Err(ZwoError::InvalidParameter(format!(
                "min_power_w must be a non-negative number, got {}",
                self.min_power_w
            )));
        }
        if self.median_window == 0 || self.median_window % 2 == 0 {
            return Err(ZwoError::InvalidParameter(format!(
                "median_window must be odd, got {}",
                self.median_window
            )));
        }
        if self.n_clusters == 0 {
            return Err(ZwoError::InvalidParameter("n_clusters must be > 0".into()));
        }
        if self.n_init == 0 || self.max_iter == 0 {
            return Err(ZwoError::InvalidParameter(
                "n_init and max_iter must be > 0".into(),
            ));
        }
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(ZwoError::InvalidParameter(format!(
                "tol must be a non-negative number, got {}",
                self.tol
            )));
        }
        if self.min_duration_s == 0 {
            return Err(ZwoError::InvalidParameter("min_duration_s must be > 0".into()));
        }
        Ok(())
    }
}

/// Parallel time/power streams of a recorded activity.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub time: Vec<i64>,
    pub watts: Vec<f64>,
}

/// Maximal run of one quantized power level.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub duration_s: u64,
    pub power_w: f64,
}

/// Steady-state block of the finished workout.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interval {
    pub duration_s: u64,
    pub power_w: u32,
}

#[derive(Clone, Debug)]
pub struct Conversion {
    pub uniform: Array1<f64>,
    pub smoothed: Array1<f64>,
    pub levels: Vec<f64>,
    pub segments: Vec<Segment>,
    pub intervals: Vec<Interval>,
}

/// Parse an activity from JSON bytes.
///
/// Accepts a flat `{"time": [..], "watts": [..]}` record, a keyed stream object
/// (`{"time": {"data": [..]}, ..}`) or a Strava stream list
/// (`[{"type": "time", "data": [..]}, ..]`). Nulls are read as zero.
pub fn parse_activity(input: &[u8]) -> Result<Activity, ZwoError> {
    let json: JsonValue =
        serde_json::from_slice(input).map_err(|e| ZwoError::Parse(e.to_string()))?;
    let time = stream_values(&json, "time")?;
    let watts = stream_values(&json, "watts")?;

    let time = time
        .iter()
        .map(|v| match v {
            JsonValue::Null => Ok(0),
            other => json_to_i64(other)
                .ok_or_else(|| ZwoError::Parse(format!("non-integer time value {}", other))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let watts = watts
        .iter()
        .map(|v| match v {
            JsonValue::Null => Ok(0.0),
            other => other
                .as_f64()
                .ok_or_else(|| ZwoError::Parse(format!("non-numeric watts value {}", other))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Activity { time, watts })
}

fn stream_values<'a>(json: &'a JsonValue, key: &str) -> Result<&'a Vec<JsonValue>, ZwoError> {
    let stream = match json {
        JsonValue::Object(map) => map.get(key),
        JsonValue::Array(streams) => streams
            .iter()
            .find(|s| s.get("type").and_then(JsonValue::as_str) == Some(key)),
        _ => None,
    }
    .ok_or_else(|| ZwoError::Parse(format!("missing '{}' stream", key)))?;

    match stream {
        JsonValue::Array(values) => Ok(values),
        JsonValue::Object(_) => stream
            .get("data")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| ZwoError::Parse(format!("'{}' stream has no data array", key))),
        _ => Err(ZwoError::Parse(format!("'{}' stream is not an array", key))),
    }
}

fn json_to_i64(value: &JsonValue) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
            .filter(|v| *v >= i64::MIN as f64 && *v < i64::MAX as f64)
            .map(|v| v as i64)
    })
}

/// Run the full pipeline and keep every intermediate series.
pub fn convert(activity: &Activity, params: &Params) -> Result<Conversion, ZwoError> {
    params.validate()?;

    let uniform = resample_1hz(&activity.time, &activity.watts, params.min_power_w)?;
    debug!(samples = uniform.len(), "resampled to 1 Hz");

    let smoothed = median_filter(&uniform, params.median_window)?;

    let Quantized { levels, series } = quantize(&smoothed, params)?;
    debug!(levels = ?levels, "quantized power levels");

    let segments = segment_runs(&series, params.segment_end);
    let intervals = merge_segments(&segments, params.min_duration_s, params.remainder);
    debug!(
        segments = segments.len(),
        intervals = intervals.len(),
        "merged segments into intervals"
    );

    Ok(Conversion {
        uniform,
        smoothed,
        levels,
        segments,
        intervals,
    })
}

/// Compute the workout intervals for an activity.
pub fn compute_intervals(activity: &Activity, params: &Params) -> Result<Vec<Interval>, ZwoError> {
    convert(activity, params).map(|c| c.intervals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(seconds: i64, watts: f64) -> Activity {
        Activity {
            time: (0..seconds).collect(),
            watts: vec![watts; seconds as usize],
        }
    }

    #[test]
    fn constant_ride_yields_single_interval() {
        let ride = constant(60, 150.0);
        let out = convert(&ride, &Params::default()).unwrap();
        assert_eq!(out.uniform.len(), 59);
        assert_eq!(
            out.intervals,
            vec![Interval {
                duration_s: 58,
                power_w: 150
            }]
        );

        let params = Params {
            segment_end: SegmentEnd::Inclusive,
            ..Params::default()
        };
        let out = compute_intervals(&ride, &params).unwrap();
        assert_eq!(
            out,
            vec![Interval {
                duration_s: 59,
                power_w: 150
            }]
        );
    }

    #[test]
    fn spike_is_filtered_out() {
        let mut ride = constant(121, 150.0);
        for w in &mut ride.watts[50..55] {
            *w = 1000.0;
        }
        let out = convert(&ride, &Params::default()).unwrap();
        assert!(out.smoothed.iter().all(|&v| v == 150.0));
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.intervals.len(), 1);
        assert_eq!(out.intervals[0].power_w, 150);
    }

    #[test]
    fn single_sample_tail_does_not_lose_carried_interval() {
        let mut values = vec![200.0; 20];
        values.extend(std::iter::repeat(300.0).take(20));
        values.push(500.0);
        let segments = segment_runs(&Array1::from_vec(values), SegmentEnd::Reference);
        let intervals = merge_segments(&segments, 30, Remainder::Drop);
        assert_eq!(
            intervals,
            vec![Interval {
                duration_s: 40,
                power_w: 250
            }]
        );
    }

    #[test]
    fn non_monotonic_time_is_rejected() {
        let ride = Activity {
            time: vec![0, 5, 3, 10],
            watts: vec![100.0; 4],
        };
        let err = convert(&ride, &Params::default()).unwrap_err();
        assert!(matches!(err, ZwoError::InvalidInput(_)));
        assert_eq!(err.stage(), "resample");
    }

    #[test]
    fn invalid_params_are_rejected_before_running() {
        let params = Params {
            median_window: 20,
            ..Params::default()
        };
        let err = convert(&constant(60, 150.0), &params).unwrap_err();
        assert!(matches!(err, ZwoError::InvalidParameter(_)));
        assert_eq!(err.stage(), "config");
    }

    #[test]
    fn repeated_runs_are_identical() {
        let time: Vec<i64> = (0..900).map(|t| t * 2).collect();
        let watts: Vec<f64> = time
            .iter()
            .map(|&t| 180.0 + 120.0 * ((t as f64) / 97.0).sin() + ((t * 37) % 23) as f64)
            .collect();
        let ride = Activity { time, watts };
        let params = Params::default();
        let a = compute_intervals(&ride, &params).unwrap();
        let b = compute_intervals(&ride, &params).unwrap();
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn pipeline_properties_hold_on_varied_ride() {
        let time: Vec<i64> = (0..1200).map(|t| t * 3 / 2).collect();
        let watts: Vec<f64> = time
            .iter()
            .map(|&t| match t % 600 {
                0..=179 => 140.0,
                180..=359 => 320.0,
                360..=419 => 450.0,
                _ => 210.0,
            })
            .collect();
        let ride = Activity { time, watts };
        let params = Params::default();
        let out = convert(&ride, &params).unwrap();

        let max_t = *ride.time.last().unwrap() as usize;
        assert_eq!(out.uniform.len(), max_t);
        assert!(out.uniform.iter().all(|&v| v >= params.min_power_w));
        assert!(out.levels.len() <= params.n_clusters);

        let total: u64 = out.segments.iter().map(|s| s.duration_s).sum();
        assert_eq!(total as usize, out.uniform.len() - 1);
        assert!(out
            .intervals
            .iter()
            .all(|i| i.duration_s >= params.min_duration_s));
    }

    #[test]
    fn parses_flat_record_with_nulls() {
        let json = br#"{"time": [0, 1, 2], "watts": [120.5, null, 130], "heartrate": [1, 2, 3]}"#;
        let ride = parse_activity(json).unwrap();
        assert_eq!(ride.time, vec![0, 1, 2]);
        assert_eq!(ride.watts, vec![120.5, 0.0, 130.0]);
    }

    #[test]
    fn parses_stream_shapes() {
        let list = br#"[{"type": "time", "data": [0, 2]}, {"type": "watts", "data": [100, 200]}]"#;
        let keyed = br#"{"time": {"data": [0, 2]}, "watts": {"data": [100, 200]}}"#;
        let expected = Activity {
            time: vec![0, 2],
            watts: vec![100.0, 200.0],
        };
        assert_eq!(parse_activity(list).unwrap(), expected);
        assert_eq!(parse_activity(keyed).unwrap(), expected);
    }

    #[test]
    fn out_of_range_time_is_a_parse_error() {
        let ride = parse_activity(br#"{"time": [0.0, 5.0], "watts": [100, 100]}"#).unwrap();
        assert_eq!(ride.time, vec![0, 5]);

        for json in [
            &br#"{"time": [0, 1e30], "watts": [100, 100]}"#[..],
            &br#"{"time": [-1e30, 0], "watts": [100, 100]}"#[..],
            &br#"{"time": [0, 1.5], "watts": [100, 100]}"#[..],
        ] {
            let err = parse_activity(json).unwrap_err();
            assert!(matches!(err, ZwoError::Parse(_)), "{:?}", err);
        }
    }

    #[test]
    fn missing_watts_is_a_parse_error() {
        let err = parse_activity(br#"{"time": [0, 1]}"#).unwrap_err();
        assert!(matches!(err, ZwoError::Parse(_)));
        assert_eq!(err.stage(), "load");
        assert!(parse_activity(b"not json").is_err());
    }
}
