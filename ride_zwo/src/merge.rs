use crate::{Interval, Remainder, Segment};

/// Running duration-weighted average of segments not yet emitted.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Accumulator {
    duration_s: u64,
    power_w: f64,
}

impl Accumulator {
    fn absorb(self, seg: &Segment) -> Self {
        let total = self.duration_s + seg.duration_s;
        if total == 0 {
            return self;
        }
        let w_acc = self.duration_s as f64 / total as f64;
        let w_seg = seg.duration_s as f64 / total as f64;
        Self {
            duration_s: total,
            power_w: w_acc * self.power_w + w_seg * seg.power_w,
        }
    }

    fn emit(self) -> Interval {
        Interval {
            duration_s: self.duration_s,
            power_w: self.power_w.max(0.0).floor() as u32,
        }
    }
}

/// Merge short segments into intervals of at least `min_duration_s`.
///
/// A segment is folded into the accumulator; the accumulator is emitted (and reset) as
/// soon as either it or the incoming segment already reaches `min_duration_s`. Power is
/// truncated to whole watts only on emission.
pub fn merge_segments(segments: &[Segment], min_duration_s: u64, remainder: Remainder) -> Vec<Interval> {
    let (acc, mut intervals) = segments.iter().fold(
        (Accumulator::default(), Vec::new()),
        |(acc, mut out), seg| {
            let short = acc.duration_s.max(seg.duration_s) < min_duration_s;
            let next = acc.absorb(seg);
            if short {
                (next, out)
            } else {
                out.push(next.emit());
                (Accumulator::default(), out)
            }
        },
    );

    if remainder == Remainder::Emit && acc.duration_s > 0 {
        intervals.push(acc.emit());
    }
    intervals
}
