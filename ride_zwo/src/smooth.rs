use ndarray::Array1;
use ordered_float::OrderedFloat;

use crate::ZwoError;

/// Sliding median over an odd `window`, reflecting the series at both ends.
pub fn median_filter(data: &Array1<f64>, window: usize) -> Result<Array1<f64>, ZwoError> {
    if window == 0 || window % 2 == 0 {
        return Err(ZwoError::InvalidParameter(format!(
            "median window must be odd, got {}",
            window
        )));
    }
    let n = data.len();
    if window == 1 || n == 0 {
        return Ok(data.clone());
    }

    let radius = (window / 2) as isize;
    let mut buf: Vec<OrderedFloat<f64>> = Vec::with_capacity(window);
    let mut out = Vec::with_capacity(n);
    for i in 0..n as isize {
        buf.clear();
        buf.extend((i - radius..=i + radius).map(|j| OrderedFloat(data[reflect(j, n)])));
        let (_, median, _) = buf.select_nth_unstable(radius as usize);
        out.push(median.0);
    }
    Ok(Array1::from_vec(out))
}

// Symmetric reflection about the half-sample edges: d c b a | a b c d | d c b a
fn reflect(index: isize, len: usize) -> usize {
    let period = 2 * len as isize;
    let m = index.rem_euclid(period) as usize;
    if m >= len {
        2 * len - 1 - m
    } else {
        m
    }
}
