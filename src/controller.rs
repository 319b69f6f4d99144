//! Emulated controller transport.
//!
//! The console pairs with a controller-emulation daemon that runs next to
//! this process; the core only ever speaks to it through the [`Controller`]
//! trait. The production client writes line-delimited JSON press commands
//! over a local TCP socket and treats the button set as opaque identifiers.

use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

/// Buttons the encounter sequence uses. The bridge daemon owns the full map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Button {
    A,
    B,
    X,
    Home,
    /// The console's own screenshot/record button, held to record a clip.
    Capture,
}

/// Opaque press-buttons capability.
pub trait Controller {
    /// Press `buttons` together, optionally holding them for `held`.
    fn press(&mut self, buttons: &[Button], held: Option<Duration>) -> Result<()>;

    /// Tear the pairing down. Called once on the graceful shutdown path.
    fn disconnect(&mut self) -> Result<()>;
}

#[derive(Serialize)]
struct PressCommand<'a> {
    buttons: &'a [Button],
    #[serde(skip_serializing_if = "Option::is_none")]
    held_ms: Option<u64>,
}

#[derive(Serialize)]
struct DisconnectCommand {
    disconnect: bool,
}

/// TCP client for the controller bridge daemon. One JSON object per line.
pub struct BridgeController {
    stream: TcpStream,
    addr: String,
}

impl BridgeController {
    /// Connect to the bridge and run controller setup.
    ///
    /// The emulated controller only registers as active after a button has
    /// been seen, so setup presses B twice — a hardware quirk workaround,
    /// not part of any stage.
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .with_context(|| format!("failed to connect to controller bridge at {addr}"))?;
        info!(addr, "connected to controller bridge");
        let mut controller = Self {
            stream,
            addr: addr.to_string(),
        };
        controller.press(&[Button::B], None)?;
        controller.press(&[Button::B], None)?;
        Ok(controller)
    }

    fn send_line(&mut self, line: String) -> Result<()> {
        self.stream
            .write_all(line.as_bytes())
            .and_then(|_| self.stream.write_all(b"\n"))
            .with_context(|| format!("failed to write to controller bridge at {}", self.addr))
    }
}

impl Controller for BridgeController {
    fn press(&mut self, buttons: &[Button], held: Option<Duration>) -> Result<()> {
        let command = PressCommand {
            buttons,
            held_ms: held.map(|d| d.as_millis() as u64),
        };
        let line = serde_json::to_string(&command).context("failed to encode press command")?;
        debug!(%line, "press");
        self.send_line(line)
    }

    fn disconnect(&mut self) -> Result<()> {
        let line = serde_json::to_string(&DisconnectCommand { disconnect: true })
            .context("failed to encode disconnect command")?;
        self.send_line(line)?;
        info!(addr = %self.addr, "controller bridge disconnected");
        Ok(())
    }
}
