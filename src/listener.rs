//! Operator command polling.
//!
//! A background loop that polls the messaging capability on a fixed cadence
//! and turns recognized commands into effects on the shared control state.
//! Its failure domain is isolated: a transport error during one poll is
//! logged and the loop simply waits for the next tick — a network hiccup
//! must never take the listener down mid-session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use crate::status::{ControlFlags, StatusHub};
use crate::telegram::Messenger;

pub const STATUS_COMMAND: &str = "/status";
pub const ENABLE_UPDATES_COMMAND: &str = "/enable_updates";
pub const DISABLE_UPDATES_COMMAND: &str = "/disable_updates";
pub const STOP_COMMAND: &str = "/stop";

/// Polls operator messages and mutates the shared control state.
pub struct CommandListener<M> {
    messenger: Arc<M>,
    hub: Arc<StatusHub>,
    flags: Arc<ControlFlags>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
    /// Highest update id already processed. Advanced on every update seen,
    /// recognized or not, so re-delivery never double-processes.
    watermark: i64,
}

impl<M: Messenger> CommandListener<M> {
    pub fn new(
        messenger: Arc<M>,
        hub: Arc<StatusHub>,
        flags: Arc<ControlFlags>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            messenger,
            hub,
            flags,
            shutdown,
            poll_interval,
            watermark: 0,
        }
    }

    /// Run until the shutdown flag is set. Intended for a dedicated thread.
    pub fn run(mut self) {
        info!("command listener started");
        while !self.shutdown.load(Ordering::SeqCst) {
            self.poll_once();
            std::thread::sleep(self.poll_interval);
        }
        info!("command listener stopped");
    }

    /// One poll tick: fetch updates past the watermark and dispatch each.
    pub fn poll_once(&mut self) {
        let updates = match self.messenger.poll_updates(self.watermark + 1) {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "operator poll failed, continuing");
                return;
            }
        };

        for update in updates {
            if update.update_id > self.watermark {
                self.watermark = update.update_id;
            }
            let Some(text) = update.text else {
                continue;
            };
            info!(command = %text, "operator message received");
            self.dispatch(&text);
        }
    }

    fn dispatch(&mut self, text: &str) {
        match text {
            STATUS_COMMAND => match self.hub.take_if_present() {
                Some(status) => {
                    self.reply_image(&status.image, &format!("Iteration: {}", status.iteration));
                }
                None => self.reply_text("Nothing new to send!"),
            },
            ENABLE_UPDATES_COMMAND => {
                self.flags.set_report_every_iteration(true);
                self.reply_text("Update notifications are enabled!");
            }
            DISABLE_UPDATES_COMMAND => {
                self.flags.set_report_every_iteration(false);
                self.reply_text("Update notifications are disabled!");
            }
            STOP_COMMAND => {
                self.flags.request_stop();
                self.reply_text("Hunting will end after the current iteration");
            }
            _ => {}
        }
    }

    fn reply_text(&self, text: &str) {
        if let Err(e) = self.messenger.send_text(text) {
            warn!(error = %e, "failed to send operator reply");
        }
    }

    fn reply_image(&self, image: &[u8], caption: &str) {
        if let Err(e) = self.messenger.send_image(image, caption, false) {
            warn!(error = %e, "failed to send operator status image");
        }
    }
}
