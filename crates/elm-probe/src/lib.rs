//! ELM Probe
//!
//! Bring-up utility for ELM-style CAN adapters: opens and configures the
//! adapter, then runs each configured probe once and logs the result.

pub mod config;

pub use config::{Probe, ProbeConfig, ProbeKind, ProbeSpec};

use elm_protocol::{ElmClient, ElmError};
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Initialize logging at `level`, falling back to info
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let level = Level::from_str(level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Outcome counts of a probe run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Initialize the adapter and run every probe once.
///
/// Recoverable errors are logged and counted; a fatal error stops the run
/// and is returned.
pub async fn run_probes<S>(
    client: &mut ElmClient<S>,
    probes: &[Probe],
) -> Result<ProbeSummary, ElmError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    client.initialize().await?;

    let mut summary = ProbeSummary::default();
    for probe in probes {
        match run_probe(client, probe).await {
            Ok(()) => summary.succeeded += 1,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!("{}: {}", probe.name, err);
                summary.failed += 1;
            }
        }
    }

    info!(
        "Probes finished: {} succeeded, {} failed",
        summary.succeeded, summary.failed
    );
    Ok(summary)
}

async fn run_probe<S>(client: &mut ElmClient<S>, probe: &Probe) -> Result<(), ElmError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let bytes = match (&probe.kind, &probe.payload) {
        (ProbeKind::Request, Some(payload)) => client
            .request(probe.target, payload, probe.verify_echo, probe.timeout)
            .await?
            .into_bytes(),
        (ProbeKind::Request, None) => {
            return Err(ElmError::InvalidPayload("request needs a payload".into()))
        }
        (ProbeKind::Monitor, _) => client
            .monitor(probe.target, probe.timeout)
            .await?
            .data()
            .to_vec(),
    };
    info!("{} [{}]: {}", probe.name, probe.target, hex::encode_upper(&bytes));

    if let Some(signal) = &probe.signal {
        match signal.extract(&bytes) {
            Ok(value) => info!("{}: signal = {}", probe.name, value),
            Err(err) => warn!("{}: signal not decoded: {}", probe.name, err),
        }
    }
    Ok(())
}
