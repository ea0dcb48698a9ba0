use chrono::{DateTime, TimeZone};
use std::fmt::Display;

pub fn secs_to_human(duration: i64) -> String {
    let secs = duration % 60;
    let mins = duration / 60;
    let hours = mins / 60;
    let mins = mins % 60;

    let mut out = Vec::new();
    if hours > 0 {
        out.push(format!("{:2}h", hours));
    }
    if mins > 0 || hours > 0 {
        out.push(format!("{:2}m", mins));
    }
    out.push(format!("{:2}s", secs));

    out.join(" ")
}

/// File name of a report written at `now`, e.g. `versions-2019-06-03_14:05:09.html`.
pub fn timestamped_filename<Tz>(prefix: &str, now: &DateTime<Tz>, ext: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{}-{}.{}", prefix, now.format("%G-%m-%d_%H:%M:%S"), ext)
}
