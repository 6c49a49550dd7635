//! ELM Probe - Main Entry Point

use elm_probe::{init_logging, run_probes, ProbeConfig};
use elm_protocol::{exit, CancelToken, ElmClient};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let path = std::env::args().nth(1);
    let config = match ProbeConfig::load(path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("elm-probe: {:#}", err);
            std::process::exit(exit::CONFIG);
        }
    };

    if let Err(err) = init_logging(&config.log_level) {
        eprintln!("elm-probe: {:#}", err);
    }

    info!("=== ELM Probe v{} ===", env!("CARGO_PKG_VERSION"));

    let probes = match config.probes() {
        Ok(probes) => probes,
        Err(err) => {
            error!("{}", err);
            std::process::exit(err.exit_code());
        }
    };

    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping");
            interrupt.cancel();
        }
    });

    let result = match ElmClient::open(&config.adapter, cancel) {
        Ok(mut client) => run_probes(&mut client, &probes).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(summary) if summary.failed > 0 => {
            warn!("{} of {} probes failed", summary.failed, probes.len())
        }
        Ok(_) => {}
        Err(err) => {
            error!("{}", err);
            std::process::exit(err.exit_code());
        }
    }
}
