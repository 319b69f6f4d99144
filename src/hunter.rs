//! The outer hunting loop.
//!
//! Owns the iteration counter and the only automatic-recovery policy in the
//! system: a failed battle trigger is reported to the operator and retried
//! from the top of stage 1 without advancing the iteration. A rare find is
//! a successful terminal outcome — the run halts for manual follow-up. The
//! operator stop flag is honored only at iteration boundaries; mid-stage
//! cancellation is out of scope by design.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::capture::FrameSource;
use crate::controller::Controller;
use crate::sequencer::{EncounterRecord, EncounterSequencer, StageResult};
use crate::snapshots::encode_jpeg;
use crate::status::{ControlFlags, StatusHub};
use crate::telegram::Messenger;

/// How a hunting run ended. Both are clean exits, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuntOutcome {
    /// A rare variant was classified on this iteration.
    RareFound { iteration: u64 },
    /// The operator requested a stop; this is the iteration a restarted
    /// session should seed with.
    Stopped { next_iteration: u64 },
}

/// Drives the encounter sequencer iteration after iteration.
pub struct Hunter<S, C, M> {
    sequencer: EncounterSequencer<S, C>,
    messenger: Arc<M>,
    hub: Arc<StatusHub>,
    flags: Arc<ControlFlags>,
}

impl<S: FrameSource, C: Controller, M: Messenger> Hunter<S, C, M> {
    pub fn new(
        sequencer: EncounterSequencer<S, C>,
        messenger: Arc<M>,
        hub: Arc<StatusHub>,
        flags: Arc<ControlFlags>,
    ) -> Self {
        Self {
            sequencer,
            messenger,
            hub,
            flags,
        }
    }

    /// Hunt until a rare variant is found or the operator stops the run.
    ///
    /// `start_iteration` seeds the counter; persisting it across restarts is
    /// the surrounding process's responsibility.
    pub fn hunt(&mut self, start_iteration: u64) -> Result<HuntOutcome> {
        let mut iteration = start_iteration;
        loop {
            info!(iteration, "starting iteration");
            let mut record = EncounterRecord::new(iteration);

            // Stage 1 with the only automatic recovery: report and retry
            // from the top, same iteration.
            loop {
                match self.sequencer.trigger_battle(&mut record)? {
                    StageResult::Success => break,
                    StageResult::Frozen => {
                        warn!("battle trigger frozen, retrying");
                        self.notify_text("Game frozen assumed, starting over!");
                    }
                    StageResult::Error => {
                        warn!("battle trigger errored, retrying");
                        self.notify_text("Game error assumed, starting over!");
                    }
                }
                record = EncounterRecord::new(iteration);
            }

            self.sequencer.await_and_classify(&mut record)?;
            let classification = record
                .classification
                .as_ref()
                .context("classification stage completed without a frame")?;
            let image = encode_jpeg(classification)?;

            // Publish under the lock, send after release.
            self.hub.publish(iteration, image.clone());

            if self.flags.report_every_iteration() {
                self.notify_image(&image, &format!("Iteration: {iteration}"), true);
            }

            if record.is_rare {
                info!(iteration, "rare variant found, halting the run");
                self.notify_image(&image, "Shiny found!", false);
                return Ok(HuntOutcome::RareFound { iteration });
            }

            self.sequencer.return_home()?;

            // The sole cancellation point: between full iterations.
            if self.flags.stop_requested() {
                info!(iteration, "stop requested, ending after this iteration");
                return Ok(HuntOutcome::Stopped {
                    next_iteration: iteration + 1,
                });
            }
            iteration += 1;
        }
    }

    /// Graceful teardown: release the controller pairing.
    pub fn shutdown(&mut self) -> Result<()> {
        self.sequencer.disconnect()
    }

    fn notify_text(&self, text: &str) {
        if let Err(e) = self.messenger.send_text(text) {
            warn!(error = %e, "failed to notify operator");
        }
    }

    fn notify_image(&self, image: &[u8], caption: &str, silent: bool) {
        if let Err(e) = self.messenger.send_image(image, caption, silent) {
            warn!(error = %e, caption, "failed to send operator image");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::test_support::ScriptedSource;
    use crate::controller::test_support::FakeController;
    use crate::frame::test_support::frame_with_pixels;
    use crate::frame::{ColorSpec, Frame, PixelCondition};
    use crate::sequencer::ScreenLayout;
    use crate::snapshots::SnapshotWriter;
    use crate::telegram::test_support::FakeMessenger;
    use std::time::Duration;

    // Zero-bound layout: each bounded await must be satisfied by the very
    // first sample or it times out, which makes scripted runs fully
    // deterministic frame-for-frame.
    fn instant_layout() -> ScreenLayout {
        ScreenLayout {
            dialogue_open: PixelCondition::new(1, 1, ColorSpec::white(), true),
            screen_white: PixelCondition::new(2, 2, ColorSpec::white(), true),
            appearance: [
                PixelCondition::new(3, 3, ColorSpec::white(), true),
                PixelCondition::new(4, 4, ColorSpec::new(255, 255, 255, 10), false),
            ],
            rare_probe: PixelCondition::new(5, 5, ColorSpec::white(), false),
            home_indicator: PixelCondition::new(6, 6, ColorSpec::new(42, 42, 42, 0), true),
            close_dialog: PixelCondition::new(6, 6, ColorSpec::new(9, 22, 29, 0), true),
            confirm_retry: Duration::ZERO,
            trigger_timeout: Duration::ZERO,
            flash_timeout: Duration::ZERO,
            home_retry: Duration::ZERO,
            classify_delay: Duration::ZERO,
        }
    }

    fn pixel(x: u32, y: u32, rgb: [u8; 3]) -> Frame {
        frame_with_pixels(16, 16, [0, 0, 0], &[(x, y, rgb)])
    }

    fn white_at(x: u32, y: u32) -> Frame {
        pixel(x, y, [255, 255, 255])
    }

    fn successful_iteration_frames(audit: [u8; 3]) -> Vec<Frame> {
        vec![
            white_at(1, 1),                                                    // dialogue opens
            white_at(2, 2),                                                    // screen whites out
            white_at(3, 3),                                                    // subject appears
            frame_with_pixels(16, 16, [0, 0, 0], &[(5, 5, audit)]),            // classification
            pixel(6, 6, [42, 42, 42]),                                         // home screen
            pixel(6, 6, [9, 22, 29]),                                          // close dialog
            pixel(6, 6, [42, 42, 42]),                                         // home again
        ]
    }

    fn hunter(
        frames: Vec<Frame>,
        dir: &std::path::Path,
        messenger: Arc<FakeMessenger>,
        hub: Arc<StatusHub>,
        flags: Arc<ControlFlags>,
    ) -> Hunter<ScriptedSource, FakeController, FakeMessenger> {
        let sequencer = EncounterSequencer::new(
            ScriptedSource::new(frames),
            FakeController::default(),
            instant_layout(),
            SnapshotWriter::new(dir),
        );
        Hunter::new(sequencer, messenger, hub, flags)
    }

    #[test]
    fn rare_find_halts_and_notifies_with_the_classification_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::default());
        let hub = Arc::new(StatusHub::new());
        let flags = Arc::new(ControlFlags::new());

        let frames = successful_iteration_frames([200, 10, 10]);
        let mut hunter = hunter(
            frames,
            tmp.path(),
            Arc::clone(&messenger),
            Arc::clone(&hub),
            Arc::clone(&flags),
        );

        let outcome = hunter.hunt(100).unwrap();

        assert_eq!(outcome, HuntOutcome::RareFound { iteration: 100 });
        assert_eq!(messenger.sent_captions(), vec!["Shiny found!"]);
        // The status hub still carries the rare iteration for a late query.
        assert_eq!(hub.take_if_present().unwrap().iteration, 100);
    }

    #[test]
    fn stop_flag_finishes_the_inflight_iteration_first() {
        let tmp = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::default());
        let hub = Arc::new(StatusHub::new());
        let flags = Arc::new(ControlFlags::new());
        flags.request_stop();

        let frames = successful_iteration_frames([255, 255, 255]);
        let mut hunter = hunter(
            frames,
            tmp.path(),
            Arc::clone(&messenger),
            Arc::clone(&hub),
            Arc::clone(&flags),
        );

        let outcome = hunter.hunt(5).unwrap();

        // The flag was set before the run even started, yet the whole
        // iteration ran: classification published and the game closed.
        assert_eq!(outcome, HuntOutcome::Stopped { next_iteration: 6 });
        assert_eq!(hub.take_if_present().unwrap().iteration, 5);
    }

    #[test]
    fn trigger_failures_are_reported_and_retried_without_advancing() {
        let tmp = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::default());
        let hub = Arc::new(StatusHub::new());
        let flags = Arc::new(ControlFlags::new());
        flags.request_stop();

        // First sample misses the dialogue pixel → Frozen → retry; the
        // second attempt runs a clean iteration.
        let mut frames = vec![frame_with_pixels(16, 16, [0, 0, 0], &[])];
        frames.extend(successful_iteration_frames([255, 255, 255]));
        let mut hunter = hunter(
            frames,
            tmp.path(),
            Arc::clone(&messenger),
            Arc::clone(&hub),
            Arc::clone(&flags),
        );

        let outcome = hunter.hunt(30).unwrap();

        assert_eq!(outcome, HuntOutcome::Stopped { next_iteration: 31 });
        assert_eq!(
            messenger.sent_texts(),
            vec!["Game frozen assumed, starting over!"]
        );
        // The retry did not advance the iteration.
        assert_eq!(hub.take_if_present().unwrap().iteration, 30);
    }

    #[test]
    fn per_iteration_report_is_sent_silently_when_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::default());
        let hub = Arc::new(StatusHub::new());
        let flags = Arc::new(ControlFlags::new());
        flags.set_report_every_iteration(true);
        flags.request_stop();

        let frames = successful_iteration_frames([255, 255, 255]);
        let mut hunter = hunter(
            frames,
            tmp.path(),
            Arc::clone(&messenger),
            Arc::clone(&hub),
            Arc::clone(&flags),
        );

        hunter.hunt(12).unwrap();

        let images = messenger.images.lock().unwrap();
        assert_eq!(images.len(), 1);
        let (bytes, caption, silent) = &images[0];
        assert_eq!(caption, "Iteration: 12");
        assert!(*silent);
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn shutdown_disconnects_the_controller() {
        let tmp = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::default());
        let mut hunter = hunter(
            vec![frame_with_pixels(16, 16, [0, 0, 0], &[])],
            tmp.path(),
            messenger,
            Arc::new(StatusHub::new()),
            Arc::new(ControlFlags::new()),
        );

        hunter.shutdown().unwrap();
    }
}
