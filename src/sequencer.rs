//! The encounter sequence state machine.
//!
//! One encounter is three stages, each expressed as awaited pixel
//! conditions over the live frame source:
//!
//! ```text
//! TriggerBattle     → confirm until the dialogue box opens, then until the
//!                     screen whites out (both bounded)
//! AwaitAndClassify  → unbounded wait for the subject, settle, classify
//! ReturnHome        → home → close-game dialog → confirm (all unbounded)
//! ```
//!
//! Stage outcomes are values the caller branches on, never control-flow
//! signals. On a bounded timeout the sequencer persists the most recent
//! frame and triggers the console's own clip recording as diagnostics.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::awaiter::{AwaitOutcome, await_condition};
use crate::capture::FrameSource;
use crate::controller::{Button, Controller};
use crate::frame::{ColorSpec, Frame, PixelCondition};
use crate::snapshots::{
    APPEARED_SNAPSHOT, BATTLE_ENTERED_SNAPSHOT, FROZEN_SNAPSHOT, GAME_ERROR_SNAPSHOT,
    SCREEN_WHITE_SNAPSHOT, SnapshotWriter,
};

/// Outcome of the bounded battle-trigger stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageResult {
    /// Both checkpoints reached; the battle transition is underway.
    Success,
    /// No response to repeated input within the long bound — the game never
    /// opened the dialogue box.
    Frozen,
    /// The dialogue opened but the screen never whited out within the short
    /// bound — the game responded, then stalled.
    Error,
}

/// Everything captured for one iteration. A fresh record is created at the
/// start of each iteration and superseded, never mutated, by the next.
#[derive(Debug)]
pub struct EncounterRecord {
    pub iteration: u64,
    pub battle_entered: Option<Frame>,
    pub screen_white: Option<Frame>,
    pub appeared: Option<Frame>,
    pub classification: Option<Frame>,
    pub is_rare: bool,
}

impl EncounterRecord {
    pub fn new(iteration: u64) -> Self {
        Self {
            iteration,
            battle_entered: None,
            screen_white: None,
            appeared: None,
            classification: None,
            is_rare: false,
        }
    }
}

/// Screen geometry and timing for the fixed encounter sequence.
///
/// The defaults assume the 720x480 composition the capture device is set to;
/// tests substitute a miniature layout.
#[derive(Debug, Clone)]
pub struct ScreenLayout {
    /// Dialogue box open: the text-box area turns white.
    pub dialogue_open: PixelCondition,
    /// Battle transition: the screen center is fully white.
    pub screen_white: PixelCondition,
    /// Subject visible: the "appeared" text box is white and the screen edge
    /// has left the near-white transition flash.
    pub appearance: [PixelCondition; 2],
    /// Rare-variant probe: the audit pixel has left the default white band.
    /// The same coordinate is also compared raw against the probe's target
    /// channels; either check deciding "off-color" marks the encounter rare.
    pub rare_probe: PixelCondition,
    /// Home screen indicator color at the system header.
    pub home_indicator: PixelCondition,
    /// Close-game dialog indicator color at the same header pixel.
    pub close_dialog: PixelCondition,

    pub confirm_retry: Duration,
    pub trigger_timeout: Duration,
    pub flash_timeout: Duration,
    pub home_retry: Duration,
    /// Settling delay measured from the appearance frame's capture
    /// timestamp, so processing latency does not stretch it.
    pub classify_delay: Duration,
}

impl Default for ScreenLayout {
    fn default() -> Self {
        Self {
            dialogue_open: PixelCondition::new(240, 400, ColorSpec::white(), true),
            screen_white: PixelCondition::new(360, 240, ColorSpec::white(), true),
            appearance: [
                PixelCondition::new(55, 400, ColorSpec::white(), true),
                PixelCondition::new(10, 400, ColorSpec::new(255, 255, 255, 10), false),
            ],
            rare_probe: PixelCondition::new(370, 440, ColorSpec::white(), false),
            home_indicator: PixelCondition::new(370, 40, ColorSpec::new(42, 42, 42, 0), true),
            close_dialog: PixelCondition::new(370, 40, ColorSpec::new(9, 22, 29, 0), true),
            confirm_retry: Duration::from_secs(1),
            trigger_timeout: Duration::from_secs(120),
            flash_timeout: Duration::from_secs(20),
            home_retry: Duration::from_millis(1500),
            classify_delay: Duration::from_millis(3100),
        }
    }
}

/// How long the console's Capture button is held to record a clip instead
/// of a still.
const CLIP_RECORD_HOLD: Duration = Duration::from_secs(2);

/// Drives one encounter at a time over a frame source and a controller.
pub struct EncounterSequencer<S, C> {
    source: S,
    controller: C,
    layout: ScreenLayout,
    snapshots: SnapshotWriter,
}

impl<S: FrameSource, C: Controller> EncounterSequencer<S, C> {
    pub fn new(source: S, controller: C, layout: ScreenLayout, snapshots: SnapshotWriter) -> Self {
        Self {
            source,
            controller,
            layout,
            snapshots,
        }
    }

    /// Stage 1: spam confirm until the dialogue box opens, then until the
    /// screen whites out. Retains the frame at each checkpoint.
    pub fn trigger_battle(&mut self, record: &mut EncounterRecord) -> Result<StageResult> {
        info!("pressing confirm until the dialogue box opens");
        let dialogue = [self.layout.dialogue_open];
        let outcome = self.press_until(
            Button::A,
            &dialogue,
            self.layout.confirm_retry,
            Some(self.layout.trigger_timeout),
        )?;
        if outcome == AwaitOutcome::TimedOut {
            warn!("dialogue box never opened, assuming the game froze");
            self.persist_recent(FROZEN_SNAPSHOT);
            self.record_clip()?;
            return Ok(StageResult::Frozen);
        }
        record.battle_entered = self.source.most_recent().cloned();

        info!("confirming until the screen whites out");
        let flash = [self.layout.screen_white];
        let outcome = self.press_until(
            Button::A,
            &flash,
            self.layout.confirm_retry,
            Some(self.layout.flash_timeout),
        )?;
        if outcome == AwaitOutcome::TimedOut {
            warn!("screen never whited out, assuming an in-game error");
            self.persist_recent(GAME_ERROR_SNAPSHOT);
            self.record_clip()?;
            return Ok(StageResult::Error);
        }
        record.screen_white = self.source.most_recent().cloned();

        Ok(StageResult::Success)
    }

    /// Stage 2: wait (unbounded) for the subject, let the composition
    /// settle, then classify the encounter frame.
    ///
    /// No timeout by design: there is no well-defined recovery if the
    /// subject never appears, so a stall here must surface externally.
    pub fn await_and_classify(&mut self, record: &mut EncounterRecord) -> Result<()> {
        info!("waiting for the subject to appear");
        let appearance = self.layout.appearance;
        await_condition(
            &mut self.source,
            &appearance,
            || Ok(()),
            Duration::ZERO,
            None,
        )?;
        let appeared = self
            .source
            .most_recent()
            .cloned()
            .context("appearance satisfied but no frame retained")?;
        info!("subject appeared");

        // Settle relative to the appearance frame's capture instant, not to
        // now, so slow frame decoding does not push the classification past
        // the stable pose.
        let settle_until = appeared.captured_at() + self.layout.classify_delay;
        thread::sleep(settle_until.saturating_duration_since(Instant::now()));
        record.appeared = Some(appeared);

        let classification = self.source.capture()?;
        if let Err(e) = self
            .snapshots
            .save_encounter(record.iteration, &classification)
        {
            warn!(error = %e, "failed to persist encounter snapshot");
        }

        let probe = self.layout.rare_probe;
        let banded_off = probe.matches(&classification);
        let raw = classification.pixel(probe.x, probe.y);
        let raw_off = raw != [probe.color.r, probe.color.g, probe.color.b];
        record.is_rare = banded_off || raw_off;
        info!(
            r = raw[0],
            g = raw[1],
            b = raw[2],
            banded_off,
            raw_off,
            "classified encounter frame"
        );
        record.classification = Some(classification);

        if record.is_rare {
            self.persist_record_for_audit(record);
            self.record_clip()?;
        }
        Ok(())
    }

    /// Stage 3: leave the battle, close the game from the home screen.
    ///
    /// All three waits are unbounded: failure to get home is systemic and
    /// must surface (externally killed/restarted) rather than be silently
    /// retried under a bound.
    pub fn return_home(&mut self) -> Result<()> {
        info!("pressing home until the home screen shows");
        let home = [self.layout.home_indicator];
        let retry = self.layout.home_retry;
        self.press_until(Button::Home, &home, retry, None)?;

        info!("opening the close-game dialog");
        let dialog = [self.layout.close_dialog];
        self.press_until(Button::X, &dialog, retry, None)?;

        info!("confirming game close");
        self.press_until(Button::A, &home, retry, None)?;
        info!("game closed");
        Ok(())
    }

    /// Tear down the controller pairing. Graceful-shutdown path only.
    pub fn disconnect(&mut self) -> Result<()> {
        self.controller.disconnect()
    }

    fn press_until(
        &mut self,
        button: Button,
        conditions: &[PixelCondition],
        retry_interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<AwaitOutcome> {
        let controller = &mut self.controller;
        await_condition(
            &mut self.source,
            conditions,
            || controller.press(&[button], None),
            retry_interval,
            timeout,
        )
    }

    /// Hold the console's Capture button so the hardware records its own
    /// clip as an out-of-band confirmation artifact.
    fn record_clip(&mut self) -> Result<()> {
        self.controller
            .press(&[Button::Capture], Some(CLIP_RECORD_HOLD))
    }

    fn persist_recent(&self, name: &str) {
        match self.source.most_recent() {
            Some(frame) => {
                if let Err(e) = self.snapshots.save_debug(name, frame) {
                    warn!(error = %e, name, "failed to persist diagnostic snapshot");
                }
            }
            None => warn!(name, "no frame captured yet, skipping diagnostic snapshot"),
        }
    }

    fn persist_record_for_audit(&self, record: &EncounterRecord) {
        let stills = [
            (BATTLE_ENTERED_SNAPSHOT, record.battle_entered.as_ref()),
            (SCREEN_WHITE_SNAPSHOT, record.screen_white.as_ref()),
            (APPEARED_SNAPSHOT, record.appeared.as_ref()),
        ];
        for (name, frame) in stills {
            if let Some(frame) = frame {
                if let Err(e) = self.snapshots.save_debug(name, frame) {
                    warn!(error = %e, name, "failed to persist audit snapshot");
                }
            }
        }
    }
}
