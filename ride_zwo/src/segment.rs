use ndarray::Array1;

use crate::{Segment, SegmentEnd};

/// Collapse a quantized series into runs of equal power.
///
/// With [`SegmentEnd::Reference`] the final sample is not counted into the last run,
/// so durations sum to `len - 1` and a one-sample final run closes as a zero-length
/// segment (still emitted). [`SegmentEnd::Inclusive`] sums to `len`.
pub fn segment_runs(series: &Array1<f64>, end: SegmentEnd) -> Vec<Segment> {
    let mut segments = Vec::new();
    let Some(&first) = series.first() else {
        return segments;
    };

    let mut start = 0usize;
    let mut current = first;
    for (i, &value) in series.iter().enumerate().skip(1) {
        if value != current {
            segments.push(Segment {
                duration_s: (i - start) as u64,
                power_w: current,
            });
            start = i;
            current = value;
        }
    }

    let last = match end {
        SegmentEnd::Reference => series.len() - 1 - start,
        SegmentEnd::Inclusive => series.len() - start,
    };
    segments.push(Segment {
        duration_s: last as u64,
        power_w: current,
    });
    segments
}
