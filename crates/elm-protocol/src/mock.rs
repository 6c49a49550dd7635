//! Scripted ELM adapter simulator for tests
//!
//! Runs on the far end of an in-memory duplex pipe, answers AT commands
//! like the real firmware and replays canned CAN replies.

use crate::cancel::CancelToken;
use crate::transport::SerialTransport;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Adapter-visible configuration registers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSettings {
    pub echo: bool,
    pub spaces: bool,
    pub protocol: String,
    pub adaptive_timing: String,
    pub can_auto_format: bool,
    pub header: Option<String>,
    pub fc_data: Option<String>,
    pub fc_header: Option<String>,
    pub fc_mode: String,
    pub receive_filter: Option<String>,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            echo: true,
            spaces: true,
            protocol: "0".to_string(),
            adaptive_timing: "1".to_string(),
            can_auto_format: true,
            header: None,
            fc_data: None,
            fc_header: None,
            fc_mode: "0".to_string(),
            receive_filter: None,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    settings: AdapterSettings,
    banner: String,
    silent: bool,
    monitoring: bool,
    pending: Vec<u8>,
    log: Vec<String>,
    responses: HashMap<String, Vec<String>>,
    monitor_lines: HashMap<String, String>,
    failures: HashMap<String, usize>,
}

impl MockState {
    fn feed(&mut self, byte: u8) -> Option<Vec<u8>> {
        if self.monitoring {
            self.monitoring = false;
            return Some(b"STOPPED\r\r>".to_vec());
        }
        match byte {
            b'\r' => {
                let line = String::from_utf8_lossy(&self.pending).to_lowercase();
                self.pending.clear();
                Some(self.handle(line.trim()))
            }
            b' ' | b'\n' => None,
            _ => {
                self.pending.push(byte);
                None
            }
        }
    }

    fn handle(&mut self, line: &str) -> Vec<u8> {
        self.log.push(line.to_string());

        let mut out = Vec::new();
        if self.settings.echo {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\r');
        }

        if let Some(left) = self.failures.get_mut(line) {
            if *left > 0 {
                *left -= 1;
                out.extend_from_slice(b"?\r\r>");
                return out;
            }
        }

        if line == "atma" {
            // Monitor output has no prompt until a byte stops it
            self.monitoring = true;
            let frame = self
                .settings
                .receive_filter
                .as_ref()
                .and_then(|filter| self.monitor_lines.get(filter));
            if let Some(frame) = frame {
                out.extend_from_slice(frame.as_bytes());
                out.push(b'\r');
            }
            return out;
        }

        let body = match line.strip_prefix("at") {
            Some(cmd) => match self.at_command(cmd) {
                Some(body) => body,
                None => return Vec::new(),
            },
            None if line == "x" => "?".to_string(),
            None => {
                let key = line.to_uppercase();
                match self.responses.get(&key) {
                    Some(lines) => {
                        for reply in lines {
                            out.extend_from_slice(reply.as_bytes());
                            out.push(b'\r');
                        }
                        out.extend_from_slice(b"\r>");
                        return out;
                    }
                    None => "NO DATA".to_string(),
                }
            }
        };

        out.extend_from_slice(body.as_bytes());
        out.extend_from_slice(b"\r\r>");
        out
    }

    fn at_command(&mut self, cmd: &str) -> Option<String> {
        let ok = "OK".to_string();
        let reply = match cmd {
            "z" | "ws" | "d" => {
                if self.silent {
                    return None;
                }
                self.settings = AdapterSettings::default();
                if cmd == "d" {
                    ok
                } else {
                    format!("\r{}", self.banner)
                }
            }
            "e0" => {
                self.settings.echo = false;
                ok
            }
            "e1" => {
                self.settings.echo = true;
                ok
            }
            "s0" => {
                self.settings.spaces = false;
                ok
            }
            "caf0" => {
                self.settings.can_auto_format = false;
                ok
            }
            "ar" => {
                self.settings.receive_filter = None;
                ok
            }
            other => {
                if let Some(p) = other.strip_prefix("sp") {
                    self.settings.protocol = p.to_string();
                } else if let Some(t) = other.strip_prefix("at") {
                    self.settings.adaptive_timing = t.to_string();
                } else if let Some(d) = other.strip_prefix("fcsd") {
                    self.settings.fc_data = Some(d.to_string());
                } else if let Some(h) = other.strip_prefix("fcsh") {
                    self.settings.fc_header = Some(h.to_string());
                } else if let Some(m) = other.strip_prefix("fcsm") {
                    self.settings.fc_mode = m.to_string();
                } else if let Some(h) = other.strip_prefix("sh") {
                    self.settings.header = Some(h.to_string());
                } else if let Some(f) = other.strip_prefix("cra") {
                    self.settings.receive_filter = Some(f.to_string());
                } else {
                    return Some("?".to_string());
                }
                ok
            }
        };
        Some(reply)
    }
}

/// Builder and handle for a simulated adapter
#[derive(Clone)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    /// Adapter answering resets with an `ELM327 v1.5` banner
    pub fn new() -> Self {
        let state = MockState {
            banner: "ELM327 v1.5".to_string(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn with_state(self, f: impl FnOnce(&mut MockState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    /// Reset banner reported by `atz` and `atws`
    pub fn banner(self, banner: &str) -> Self {
        self.with_state(|s| s.banner = banner.to_string())
    }

    /// Never answer resets
    pub fn silent(self) -> Self {
        self.with_state(|s| s.silent = true)
    }

    /// Lines sent back for a data frame such as `03222006`
    pub fn respond(self, frame: &str, lines: &[&str]) -> Self {
        let lines = lines.iter().map(|l| l.to_string()).collect();
        self.with_state(|s| {
            s.responses.insert(frame.to_uppercase(), lines);
        })
    }

    /// Frame emitted by `atma` while the receive filter is `filter`
    pub fn monitor_frame(self, filter: &str, line: &str) -> Self {
        self.with_state(|s| {
            s.monitor_lines
                .insert(filter.to_lowercase(), line.to_string());
        })
    }

    /// Answer `?` to the first `times` occurrences of a command
    pub fn fail_command(self, command: &str, times: usize) -> Self {
        self.with_state(|s| {
            s.failures.insert(command.to_lowercase(), times);
        })
    }

    /// Start the simulator and return the host side of the link
    pub fn spawn(&self) -> SerialTransport<DuplexStream> {
        self.spawn_with(CancelToken::new())
    }

    /// Start the simulator with a caller-held cancellation token
    pub fn spawn_with(&self, cancel: CancelToken) -> SerialTransport<DuplexStream> {
        let (host, mut device) = duplex(1024);
        let state = self.state.clone();

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            loop {
                let n = match device.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                for &byte in &buf[..n] {
                    let reply = state.lock().unwrap().feed(byte);
                    if let Some(reply) = reply {
                        if device.write_all(&reply).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        SerialTransport::new(host, cancel)
    }

    /// Current register state
    pub fn settings(&self) -> AdapterSettings {
        self.state.lock().unwrap().settings.clone()
    }

    /// Every command line received, lower-cased
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }
}
