//! Press-wait-recheck loop.
//!
//! Every stage of the encounter sequence is the same shape: send an input,
//! sample a pixel, repeat until the screen reaches the expected state or a
//! time bound runs out. Centralizing that loop here lets each stage be one
//! declarative call and makes the retry/timeout policy testable with a fake
//! controller and a scripted frame sequence.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use crate::capture::FrameSource;
use crate::frame::{PixelCondition, all_match};

/// Outcome of one awaited condition. Timeout is an expected result, never an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitOutcome {
    /// The condition held on a sampled frame.
    Satisfied,
    /// The bounded timeout elapsed before the condition held.
    TimedOut,
}

/// Drive `action` repeatedly until every condition in `conditions` holds on
/// a freshly captured frame.
///
/// Each pass captures a frame and tests it first, so a condition that is
/// already true returns [`AwaitOutcome::Satisfied`] without the action ever
/// firing. A bounded `timeout` is checked before each retry: once the
/// elapsed time reaches it, [`AwaitOutcome::TimedOut`] is returned
/// immediately. `timeout: None` means the caller accepts indefinite
/// blocking — used for stages with no sane recovery path.
///
/// No recovery happens here. On timeout the caller owns diagnostics
/// (persisting the most recent frame) and the recovery action.
pub fn await_condition<S, A>(
    source: &mut S,
    conditions: &[PixelCondition],
    mut action: A,
    retry_interval: Duration,
    timeout: Option<Duration>,
) -> Result<AwaitOutcome>
where
    S: FrameSource,
    A: FnMut() -> Result<()>,
{
    let start = Instant::now();
    loop {
        let frame = source.capture()?;
        if all_match(&frame, conditions) {
            return Ok(AwaitOutcome::Satisfied);
        }
        if let Some(bound) = timeout {
            if start.elapsed() >= bound {
                debug!(elapsed = ?start.elapsed(), "await timed out");
                return Ok(AwaitOutcome::TimedOut);
            }
        }
        action()?;
        thread::sleep(retry_interval);
    }
}
