use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use mqstress_core::QoS;

fn parse_duration(input: &str) -> Result<Duration, String> {
    humantime::parse_duration(input.trim())
        .map_err(|err| format!("invalid duration '{input}' (expected e.g. 5s, 500ms, 1m): {err}"))
}

fn parse_qos(input: &str) -> Result<QoS, String> {
    input
        .trim()
        .parse::<u8>()
        .ok()
        .and_then(QoS::from_level)
        .ok_or_else(|| format!("invalid QoS '{input}' (expected 0, 1 or 2)"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report.
    HumanReadable,
    /// Emit JSON lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "mqstress",
    author,
    version,
    about = "Load generator for MQTT brokers",
    long_about = "mqstress starts many concurrent clients. Each client publishes a batch of messages to a private topic while subscribed to it, and measures publish and receive throughput.\n\nEvery flag can also be set through an MQSTRESS_* environment variable.",
    after_help = "Examples:\n  mqstress --broker tcp://localhost:1883\n  mqstress --broker tcp://localhost:1883 -c 500 -m 100 --rampup-size 50\n  mqstress --broker mqtts://broker:8883 --cafile ca.pem --output json\n  mqstress --broker mqtts://broker:8883 --skip-tls-verification\n  mqstress --broker mem:// -c 10   # in-process broker, no network"
)]
pub struct Cli {
    /// Broker URL (tcp://, mqtt://, ssl://, tls://, mqtts:// or mem://)
    #[arg(long, env = "MQSTRESS_BROKER")]
    pub broker: String,

    /// Number of concurrent clients
    #[arg(short = 'c', long, env = "MQSTRESS_NUM_CLIENTS", default_value_t = 10)]
    pub num_clients: usize,

    /// Messages published by each client
    #[arg(short = 'm', long, env = "MQSTRESS_NUM_MESSAGES", default_value_t = 10)]
    pub num_messages: u64,

    /// Payload for every message; `@path` reads it from a file.
    /// Defaults to `this is msg #<n>!`.
    #[arg(long, env = "MQSTRESS_CONSTANT_PAYLOAD", default_value = "")]
    pub constant_payload: String,

    /// Timeout for each connect, subscribe, publish and unsubscribe
    #[arg(long, env = "MQSTRESS_TIMEOUT", value_parser = parse_duration, default_value = "5s")]
    pub timeout: Duration,

    /// Deadline for the whole run
    #[arg(long, env = "MQSTRESS_GLOBAL_TIMEOUT", value_parser = parse_duration, default_value = "60s")]
    pub global_timeout: Duration,

    /// Clients started per ramp-up batch (values <= 0 use 100)
    #[arg(
        long,
        env = "MQSTRESS_RAMPUP_SIZE",
        allow_negative_numbers = true,
        default_value_t = 100
    )]
    pub rampup_size: i64,

    /// Pause between ramp-up batches
    #[arg(long, env = "MQSTRESS_RAMPUP_DELAY", value_parser = parse_duration, default_value = "500ms")]
    pub rampup_delay: Duration,

    /// Pause after each published message
    #[arg(long, env = "MQSTRESS_PAUSE_BETWEEN_MESSAGES", value_parser = parse_duration, default_value = "0s")]
    pub pause_between_messages: Duration,

    /// Time clients get to disconnect after the run was stopped
    #[arg(long, env = "MQSTRESS_GRACE_PERIOD", value_parser = parse_duration, default_value = "5s")]
    pub grace_period: Duration,

    #[arg(long, env = "MQSTRESS_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "MQSTRESS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// QoS of published messages (0, 1 or 2)
    #[arg(long, env = "MQSTRESS_PUBLISHER_QOS", value_parser = parse_qos, default_value = "0")]
    pub publisher_qos: QoS,

    /// QoS of the subscription (0, 1 or 2)
    #[arg(long, env = "MQSTRESS_SUBSCRIBER_QOS", value_parser = parse_qos, default_value = "0")]
    pub subscriber_qos: QoS,

    /// Set the retain flag on published messages
    #[arg(long, env = "MQSTRESS_RETAIN")]
    pub retain: bool,

    /// PEM file with trusted CA certificates
    #[arg(long, env = "MQSTRESS_CAFILE")]
    pub cafile: Option<PathBuf>,

    /// PEM client certificate (requires --key)
    #[arg(long, env = "MQSTRESS_CERT")]
    pub cert: Option<PathBuf>,

    /// PEM client private key (requires --cert)
    #[arg(long, env = "MQSTRESS_KEY")]
    pub key: Option<PathBuf>,

    /// Accept any broker certificate on TLS connections (no CA needed)
    #[arg(long, env = "MQSTRESS_SKIP_TLS_VERIFICATION")]
    pub skip_tls_verification: bool,

    /// Topic prefix for the per-client topics
    #[arg(long, env = "MQSTRESS_TOPIC_BASE_PATH")]
    pub topic_base_path: Option<String>,

    /// Hide the progress indicator
    #[arg(long, env = "MQSTRESS_NO_PROGRESS")]
    pub no_progress: bool,

    /// 0 = nothing, 1 = errors, 2 = debug, 3 = errors and debug. RUST_LOG overrides.
    #[arg(
        long,
        env = "MQSTRESS_LOG_LEVEL",
        value_parser = clap::value_parser!(u8).range(0..=3),
        default_value_t = 0
    )]
    pub log_level: u8,

    /// Output format
    #[arg(long, env = "MQSTRESS_OUTPUT", value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

impl Cli {
    /// Ramp-up batch size as understood by the runner (`0` selects the default).
    #[must_use]
    pub fn ramp_up_size(&self) -> usize {
        usize::try_from(self.rampup_size).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let argv = std::iter::once("mqstress").chain(args.iter().copied());
        match Cli::try_parse_from(argv) {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        }
    }

    #[test]
    fn defaults() {
        let cli = parse(&["--broker", "tcp://localhost"]);
        assert_eq!(cli.num_clients, 10);
        assert_eq!(cli.num_messages, 10);
        assert_eq!(cli.timeout, Duration::from_secs(5));
        assert_eq!(cli.global_timeout, Duration::from_secs(60));
        assert_eq!(cli.rampup_delay, Duration::from_millis(500));
        assert_eq!(cli.pause_between_messages, Duration::ZERO);
        assert_eq!(cli.grace_period, Duration::from_secs(5));
        assert_eq!(cli.ramp_up_size(), 100);
        assert_eq!(cli.publisher_qos, QoS::AtMostOnce);
        assert_eq!(cli.subscriber_qos, QoS::AtMostOnce);
        assert_eq!(cli.constant_payload, "");
        assert!(!cli.retain);
        assert!(!cli.skip_tls_verification);
        assert_eq!(cli.output, OutputFormat::HumanReadable);
    }

    #[test]
    fn parses_every_flag() {
        let cli = parse(&[
            "--broker",
            "mqtts://b:8883",
            "-c",
            "3",
            "-m",
            "7",
            "--constant-payload",
            "@payload.bin",
            "--timeout",
            "250ms",
            "--global-timeout",
            "2m",
            "--rampup-size",
            "5",
            "--rampup-delay",
            "1s",
            "--pause-between-messages",
            "10ms",
            "--grace-period",
            "1s",
            "--username",
            "u",
            "--password",
            "p",
            "--publisher-qos",
            "1",
            "--subscriber-qos",
            "2",
            "--retain",
            "--cafile",
            "ca.pem",
            "--cert",
            "c.pem",
            "--key",
            "k.pem",
            "--skip-tls-verification",
            "--topic-base-path",
            "bench/x",
            "--no-progress",
            "--log-level",
            "3",
            "--output",
            "json",
        ]);

        assert_eq!(cli.num_clients, 3);
        assert_eq!(cli.num_messages, 7);
        assert_eq!(cli.constant_payload, "@payload.bin");
        assert_eq!(cli.timeout, Duration::from_millis(250));
        assert_eq!(cli.global_timeout, Duration::from_secs(120));
        assert_eq!(cli.ramp_up_size(), 5);
        assert_eq!(cli.publisher_qos, QoS::AtLeastOnce);
        assert_eq!(cli.subscriber_qos, QoS::ExactlyOnce);
        assert!(cli.retain);
        assert_eq!(cli.cafile, Some(PathBuf::from("ca.pem")));
        assert!(cli.skip_tls_verification);
        assert_eq!(cli.topic_base_path.as_deref(), Some("bench/x"));
        assert!(cli.no_progress);
        assert_eq!(cli.log_level, 3);
        assert_eq!(cli.output, OutputFormat::Json);
    }

    #[test]
    fn non_positive_rampup_size_falls_back_to_default() {
        assert_eq!(parse(&["--broker", "x", "--rampup-size", "-1"]).ramp_up_size(), 0);
        assert_eq!(parse(&["--broker", "x", "--rampup-size", "0"]).ramp_up_size(), 0);
    }

    #[test]
    fn rejects_out_of_range_values() {
        for args in [
            ["--broker", "x", "--publisher-qos", "3"],
            ["--broker", "x", "--subscriber-qos", "-1"],
            ["--broker", "x", "--log-level", "4"],
            ["--broker", "x", "--timeout", "10x"],
        ] {
            let argv = std::iter::once("mqstress").chain(args);
            assert!(Cli::try_parse_from(argv).is_err(), "{args:?} should be rejected");
        }
    }

    #[test]
    fn broker_is_required() {
        assert!(Cli::try_parse_from(["mqstress"]).is_err());
    }
}
