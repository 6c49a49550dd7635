//! Probe configuration

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use elm_protocol::{ElmConfig, ElmError, RequestPayload, SignalSpec, TargetId};
use serde::Deserialize;
use std::time::Duration;

/// Default configuration file, looked up without extension
pub const CONFIG_FILE: &str = "elm-probe";

/// What a probe does on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// ISO-TP request/response
    Request,
    /// Capture one broadcast frame
    Monitor,
}

/// One configured probe, as written in the file
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSpec {
    /// Label used in log lines
    #[serde(default)]
    pub name: Option<String>,
    pub kind: ProbeKind,
    /// 11-bit CAN identifier (request target or monitor filter)
    pub target: u32,
    /// Request bytes as hex, required for requests
    #[serde(default)]
    pub payload: Option<String>,
    /// Require a positive response echoing the request.
    ///
    /// The echo is compared from frame byte 1, which only lines up for
    /// single-frame replies; a first frame carries its length there.
    #[serde(default)]
    pub verify_echo: bool,
    /// Per-byte wait; the adapter timeout when absent
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Signal decoded from the reply
    #[serde(default)]
    pub signal: Option<SignalSpec>,
}

/// A validated probe ready to run
#[derive(Debug, Clone)]
pub struct Probe {
    pub name: String,
    pub kind: ProbeKind,
    pub target: TargetId,
    pub payload: Option<RequestPayload>,
    pub verify_echo: bool,
    pub timeout: Duration,
    pub signal: Option<SignalSpec>,
}

/// Top-level configuration of the probe utility
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Maximum log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Adapter link settings
    pub adapter: ElmConfig,
    /// Probes, run once each in order
    pub probe: Vec<ProbeSpec>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            adapter: ElmConfig::default(),
            probe: Vec::new(),
        }
    }
}

impl ProbeConfig {
    /// Load from an optional TOML file, then `ELM_*` environment variables.
    ///
    /// Nested keys use a double underscore, e.g. `ELM_ADAPTER__DEVICE`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(CONFIG_FILE).required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("ELM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Parse TOML text directly
    pub fn from_toml(text: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Validate the adapter settings and every probe; the first bad entry
    /// is a configuration error
    pub fn probes(&self) -> Result<Vec<Probe>, ElmError> {
        self.adapter.validate()?;
        self.probe
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                spec.resolve(index, self.adapter.command_timeout())
                    .map_err(|err| ElmError::Config(format!("probe {}: {}", index, err)))
            })
            .collect()
    }
}

impl ProbeSpec {
    fn resolve(&self, index: usize, default_timeout: Duration) -> Result<Probe, ElmError> {
        let target = TargetId::new(self.target)?;
        let payload = match (self.kind, &self.payload) {
            (ProbeKind::Request, Some(hex)) => Some(RequestPayload::from_hex(hex)?),
            (ProbeKind::Request, None) => {
                return Err(ElmError::InvalidPayload("request needs a payload".into()))
            }
            (ProbeKind::Monitor, _) => None,
        };

        Ok(Probe {
            name: self
                .name
                .clone()
                .unwrap_or_else(|| format!("probe-{}", index)),
            kind: self.kind,
            target,
            payload,
            verify_echo: self.verify_echo,
            timeout: self
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default_timeout),
            signal: self.signal,
        })
    }
}
