use std::process::{Command, Output};

use anyhow::Context as _;
use serde_json::Value;

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn mqstress(args: &[&str]) -> anyhow::Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_mqstress"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .context("run mqstress binary")
}

fn ensure_success(out: &Output) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == 0,
        "expected exit code 0, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

#[test]
fn human_summary_against_memory_broker() -> anyhow::Result<()> {
    let out = mqstress(&["--broker", "mem://", "-c", "3", "-m", "5", "--no-progress"])?;
    ensure_success(&out)?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    for needle in [
        "# Configuration",
        "Concurrent Clients: 3",
        "Messages / Client:  5",
        "Published Messages: 15 (100%)",
        "Received Messages:  15 (100%)",
        "Completed:          3 (100%)",
        "Errors:             0 (0%)",
        "# Publishing Throughput",
        "# Receiving Throughput",
        "msg/sec  100%",
    ] {
        anyhow::ensure!(stdout.contains(needle), "missing {needle:?} in:\n{stdout}");
    }

    Ok(())
}

#[test]
fn json_output_is_ndjson() -> anyhow::Result<()> {
    let out = mqstress(&[
        "--broker",
        "mem://",
        "-c",
        "2",
        "-m",
        "3",
        "--output",
        "json",
    ])?;
    ensure_success(&out)?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines = stdout
        .lines()
        .map(serde_json::from_str::<Value>)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("stdout is not NDJSON:\n{stdout}"))?;

    let Some(summary) = lines.last() else {
        anyhow::bail!("no output lines");
    };
    anyhow::ensure!(summary.get("kind").and_then(Value::as_str) == Some("summary"));
    anyhow::ensure!(summary.pointer("/summary/completed").and_then(Value::as_u64) == Some(2));
    anyhow::ensure!(
        summary.pointer("/summary/messages_received").and_then(Value::as_u64) == Some(6)
    );

    let results = lines
        .iter()
        .filter(|l| l.get("event").and_then(Value::as_str) == Some("result"))
        .count();
    anyhow::ensure!(results >= 2, "expected per-worker results, got {results}");

    Ok(())
}

#[test]
fn json_without_progress_prints_only_the_summary() -> anyhow::Result<()> {
    let out = mqstress(&[
        "--broker",
        "mem://",
        "-c",
        "2",
        "-m",
        "2",
        "--output",
        "json",
        "--no-progress",
    ])?;
    ensure_success(&out)?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    anyhow::ensure!(lines.len() == 1, "expected one line, got:\n{stdout}");
    Ok(())
}

#[test]
fn file_payload_and_ramp_up() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let payload = dir.path().join("payload.bin");
    std::fs::write(&payload, vec![7u8; 4096])?;
    let arg = format!("@{}", payload.display());

    let out = mqstress(&[
        "--broker",
        "mem://",
        "-c",
        "4",
        "-m",
        "2",
        "--rampup-size",
        "2",
        "--rampup-delay",
        "10ms",
        "--constant-payload",
        &arg,
        "--no-progress",
    ])?;
    ensure_success(&out)?;

    let stderr = String::from_utf8_lossy(&out.stderr);
    anyhow::ensure!(
        stderr.contains("ramp-up: 2 clients started"),
        "stderr:\n{stderr}"
    );
    Ok(())
}
