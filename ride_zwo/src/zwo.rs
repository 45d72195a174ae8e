//! Zwift workout (.zwo) rendering of merged intervals.

use serde::{Deserialize, Serialize};

use crate::Interval;

pub const DEFAULT_FTP_W: f64 = 300.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Workout {
    pub name: Option<String>,
    pub ftp_w: f64,
    pub intervals: Vec<Interval>,
}

impl Workout {
    pub fn new(intervals: Vec<Interval>, ftp_w: f64) -> Self {
        Self {
            name: None,
            ftp_w,
            intervals,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Interval power as a fraction of FTP.
    pub fn relative_power(&self, interval: &Interval) -> f64 {
        interval.power_w as f64 / self.ftp_w
    }

    pub fn total_duration_s(&self) -> u64 {
        self.intervals.iter().map(|i| i.duration_s).sum()
    }
}

pub fn render_zwo(workout: &Workout) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" ?>\n");
    out.push_str("<workout_file>\n");
    if let Some(name) = workout.name.as_deref() {
        out.push_str(&format!("  <name>{}</name>\n", escape_xml(name)));
        out.push_str("  <sportType>bike</sportType>\n");
    }
    out.push_str("  <workout>\n");
    for interval in &workout.intervals {
        out.push_str(&format!(
            "    <SteadyState Duration=\"{}\" Power=\"{:.2}\"></SteadyState>\n",
            interval.duration_s,
            workout.relative_power(interval)
        ));
    }
    out.push_str("  </workout>\n");
    out.push_str("</workout_file>\n");
    out
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
