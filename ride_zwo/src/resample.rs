use ndarray::Array1;

use crate::ZwoError;

/// Longest activity accepted for resampling (30 days of seconds).
pub const MAX_ACTIVITY_S: i64 = 30 * 24 * 3600;

/// Linearly interpolate `watts` over `time` at every whole second in `0..max(time)`.
///
/// Values are floored at `min_power_w`. The final instant `max(time)` is not evaluated
/// and nothing is extrapolated past the last sample.
pub fn resample_1hz(time: &[i64], watts: &[f64], min_power_w: f64) -> Result<Array1<f64>, ZwoError> {
    if time.len() != watts.len() {
        return Err(ZwoError::InvalidInput(format!(
            "time has {} samples but watts has {}",
            time.len(),
            watts.len()
        )));
    }
    if time.len() < 2 {
        return Err(ZwoError::InsufficientData(format!(
            "need at least 2 samples, got {}",
            time.len()
        )));
    }
    if let Some(pos) = time
        .windows(2)
        .position(|w| w[1].checked_sub(w[0]).is_none())
    {
        return Err(ZwoError::InvalidInput(format!(
            "time gap between t[{}]={} and t[{}]={} overflows",
            pos,
            time[pos],
            pos + 1,
            time[pos + 1]
        )));
    }
    if let Some(pos) = time.windows(2).position(|w| w[1] <= w[0]) {
        return Err(ZwoError::InvalidInput(format!(
            "time must be strictly increasing (t[{}]={}, t[{}]={})",
            pos,
            time[pos],
            pos + 1,
            time[pos + 1]
        )));
    }
    if let Some(pos) = watts.iter().position(|w| !w.is_finite()) {
        return Err(ZwoError::InvalidInput(format!(
            "watts[{}] is not a finite number",
            pos
        )));
    }
    if time[0] > 0 {
        return Err(ZwoError::InvalidInput(format!(
            "first sample at {}s, cannot interpolate from 0s",
            time[0]
        )));
    }

    let max_t = time[time.len() - 1];
    if max_t <= 0 {
        return Err(ZwoError::InsufficientData(format!(
            "activity ends at {}s, nothing to resample",
            max_t
        )));
    }
    if max_t > MAX_ACTIVITY_S {
        return Err(ZwoError::InvalidInput(format!(
            "activity ends at {}s, longer than the {}s limit",
            max_t, MAX_ACTIVITY_S
        )));
    }

    let mut out = Vec::with_capacity(max_t as usize);
    let mut idx = 0;
    for target in 0..max_t {
        while idx + 2 < time.len() && time[idx + 1] <= target {
            idx += 1;
        }
        let (t0, t1) = (time[idx], time[idx + 1]);
        let (p0, p1) = (watts[idx], watts[idx + 1]);
        let frac = (target - t0) as f64 / (t1 - t0) as f64;
        let value = p0 + (p1 - p0) * frac;
        out.push(value.max(min_power_w));
    }
    Ok(Array1::from_vec(out))
}
