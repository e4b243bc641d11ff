use std::time::Duration;

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

/// Whole-number percentage of `part` in `whole`; `0` for an empty whole.
pub(crate) fn format_percent(part: f64, whole: f64) -> String {
    format_rate(mqstress_core::summary::percent(part, whole))
}

/// Millisecond precision; humantime prints nanoseconds otherwise.
pub(crate) fn format_duration(d: Duration) -> String {
    let millis = Duration::from_millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
    if millis.is_zero() && !d.is_zero() {
        return format!("{}", humantime::format_duration(d));
    }
    format!("{}", humantime::format_duration(millis))
}
