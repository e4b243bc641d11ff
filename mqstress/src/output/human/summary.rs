use std::fmt::Write as _;

use mqstress_core::{Histogram, RunOutcome, StopCause, Summary, SummaryError};

use super::format::{format_duration, format_percent, format_rate};

pub(crate) fn render(s: &Summary, outcome: &RunOutcome) -> String {
    let mut out = String::new();

    out.push('\n');
    out.push_str("# Configuration\n");
    writeln!(out, "Concurrent Clients: {}", s.clients).ok();
    writeln!(out, "Messages / Client:  {}", s.messages_per_client).ok();
    writeln!(out, "Total Messages:     {}", s.total_messages).ok();

    out.push('\n');
    out.push_str("# Results\n");
    writeln!(out, "Elapsed:            {}", format_duration(outcome.elapsed)).ok();
    if let Some(cause) = outcome.stopped {
        writeln!(out, "Stopped:            {}", stop_reason(cause)).ok();
    }
    writeln!(
        out,
        "Published Messages: {} ({}%)",
        s.messages_published,
        format_percent(s.messages_published as f64, s.total_messages as f64)
    )
    .ok();
    writeln!(
        out,
        "Received Messages:  {} ({}%)",
        s.messages_received,
        format_percent(s.messages_received as f64, s.messages_published as f64)
    )
    .ok();
    writeln!(
        out,
        "Completed:          {} ({}%)",
        s.completed,
        format_percent(s.completed as f64, s.clients as f64)
    )
    .ok();
    writeln!(
        out,
        "Errors:             {} ({}%)",
        s.errors,
        format_rate(s.error_rate)
    )
    .ok();

    if s.errors > 0 {
        let errors = s.errors as f64;
        for (label, count) in [
            ("ConnectFailed:  ", s.connect_failed),
            ("SubscribeFailed:", s.subscribe_failed),
            ("TimeoutExceeded:", s.timeout_exceeded),
        ] {
            writeln!(
                out,
                "- {label}    {count} ({}%)",
                format_percent(count as f64, errors)
            )
            .ok();
        }
    }
    if s.aborted > 0 {
        writeln!(
            out,
            "- Aborted:            {} ({}%)",
            s.aborted,
            format_percent(s.aborted as f64, s.clients as f64)
        )
        .ok();
    }

    out.push('\n');
    out.push_str("# Publishing Throughput\n");
    render_throughput(
        &mut out,
        s.publish_fastest(),
        s.publish_slowest(),
        s.publish_median,
        &s.publish_histogram,
    );

    out.push('\n');
    out.push_str("# Receiving Throughput\n");
    render_throughput(
        &mut out,
        s.receive_fastest(),
        s.receive_slowest(),
        s.receive_median,
        &s.receive_histogram,
    );

    out
}

pub(crate) fn render_no_summary(err: &SummaryError, outcome: &RunOutcome) -> String {
    let mut out = String::new();
    writeln!(
        out,
        "no summary: {err} ({} of {} clients started, {} finished, elapsed {})",
        outcome.started,
        outcome.results.len(),
        outcome.finished,
        format_duration(outcome.elapsed)
    )
    .ok();
    if let Some(cause) = outcome.stopped {
        writeln!(out, "stopped: {}", stop_reason(cause)).ok();
    }
    out
}

fn render_throughput(out: &mut String, fastest: f64, slowest: f64, median: f64, h: &Histogram) {
    writeln!(out, "Fastest: {} msg/sec", format_rate(fastest)).ok();
    writeln!(out, "Slowest: {} msg/sec", format_rate(slowest)).ok();
    writeln!(out, "Median: {} msg/sec", format_rate(median)).ok();
    out.push('\n');
    for b in h.iter() {
        writeln!(
            out,
            "  < {} msg/sec  {}%",
            format_rate(b.upper_bound),
            format_rate(b.cumulative * 100.0)
        )
        .ok();
    }
}

fn stop_reason(cause: StopCause) -> &'static str {
    match cause {
        StopCause::DeadlineExceeded => "global timeout exceeded",
        StopCause::Interrupted => "interrupted",
    }
}
