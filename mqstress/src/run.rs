use anyhow::Context as _;
use std::sync::Arc;

use mqstress_core::broker::memory::MemoryBroker;
use mqstress_core::{
    ClientSettings, Connector, Credentials, PayloadGenerator, RunConfig, build_summary,
    run_workers,
};

use crate::cli::Cli;
use crate::exit_codes::ExitCode;
use crate::logging;
use crate::output;
use crate::run_error::RunError;
use crate::tls;

const MEMORY_SCHEME: &str = "mem://";

pub async fn run(args: Cli) -> Result<ExitCode, RunError> {
    logging::init(args.log_level);

    let cfg = run_config(&args).await.map_err(RunError::InvalidInput)?;
    let connector = connector(&cfg.client).map_err(RunError::InvalidInput)?;

    let out = output::formatter(args.output, !args.no_progress);
    out.print_header(&cfg);

    tracing::debug!(
        broker = %cfg.client.broker_url,
        clients = cfg.clients,
        messages = cfg.messages,
        "starting run"
    );

    let clients = cfg.clients;
    let messages = cfg.messages;
    let outcome = run_workers(cfg, connector, interrupted(), out.progress())
        .await
        .map_err(|err| RunError::InvalidInput(anyhow::Error::new(err)))?;

    tracing::debug!(
        started = outcome.started,
        finished = outcome.finished,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        stopped = ?outcome.stopped,
        "run finished"
    );

    match build_summary(clients, messages, &outcome.results) {
        Ok(summary) => {
            out.print_summary(&summary, &outcome)
                .map_err(RunError::RuntimeError)?;
            Ok(ExitCode::Success)
        }
        Err(err) => {
            out.print_no_summary(&err, &outcome);
            Ok(ExitCode::NoSummary)
        }
    }
}

async fn run_config(args: &Cli) -> anyhow::Result<RunConfig> {
    let mut client = ClientSettings::new(args.broker.trim());

    client.credentials = match (&args.username, &args.password) {
        (Some(username), password) => Some(Credentials {
            username: username.clone(),
            password: password.clone().unwrap_or_default(),
        }),
        (None, Some(_)) => anyhow::bail!("--password requires --username"),
        (None, None) => None,
    };

    client.tls = tls::load(
        args.cafile.as_deref(),
        args.cert.as_deref(),
        args.key.as_deref(),
    )
    .await?
    .map(Arc::new);
    client.skip_tls_verification = args.skip_tls_verification;

    let payload = PayloadGenerator::from_arg(&args.constant_payload)
        .with_context(|| format!("failed to load payload `{}`", args.constant_payload))?;

    let mut cfg = RunConfig::new(client);
    cfg.clients = args.num_clients;
    cfg.messages = args.num_messages;
    cfg.payload = Arc::new(payload);
    cfg.timeout = args.timeout;
    cfg.pause_between_messages = args.pause_between_messages;
    cfg.publisher_qos = args.publisher_qos;
    cfg.subscriber_qos = args.subscriber_qos;
    cfg.retain = args.retain;
    if let Some(base) = args
        .topic_base_path
        .as_deref()
        .map(|b| b.trim_end_matches('/'))
        .filter(|b| !b.is_empty())
    {
        cfg.topic_base = Arc::from(base);
    }
    cfg.ramp_up_size = args.ramp_up_size();
    cfg.ramp_up_delay = args.rampup_delay;
    cfg.global_timeout = args.global_timeout;
    cfg.grace_period = args.grace_period;

    cfg.validate()?;
    Ok(cfg)
}

fn connector(client: &ClientSettings) -> anyhow::Result<Arc<dyn Connector>> {
    if client.broker_url.starts_with(MEMORY_SCHEME) {
        return Ok(Arc::new(MemoryBroker::new()));
    }
    mqtt_connector(client)
}

#[cfg(feature = "mqtt")]
fn mqtt_connector(client: &ClientSettings) -> anyhow::Result<Arc<dyn Connector>> {
    let endpoint = mqstress_mqtt::Endpoint::parse(&client.broker_url)?;
    if endpoint.scheme.is_tls()
        && !client.skip_tls_verification
        && client.tls.as_ref().is_none_or(|t| t.ca.is_none())
    {
        anyhow::bail!(
            "{}:// brokers require --cafile or --skip-tls-verification",
            endpoint.scheme
        );
    }
    Ok(Arc::new(mqstress_mqtt::MqttConnector::new()))
}

#[cfg(not(feature = "mqtt"))]
fn mqtt_connector(client: &ClientSettings) -> anyhow::Result<Arc<dyn Connector>> {
    anyhow::bail!(
        "unsupported broker `{}`: built without MQTT support (only {MEMORY_SCHEME} is available)",
        client.broker_url
    )
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn interrupted() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

// A failed registration must not end the run.
async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
