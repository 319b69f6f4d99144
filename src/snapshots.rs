//! Diagnostic image persistence.
//!
//! Stage timeouts and rare-variant finds drop JPEG stills under fixed names
//! so a run can be debugged after the fact. These files are write-only side
//! channels; nothing in the crate reads them back.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::info;

use crate::frame::Frame;

/// Fixed diagnostic names, one per failure/audit point.
pub const FROZEN_SNAPSHOT: &str = "error_frozen_dbg.jpg";
pub const GAME_ERROR_SNAPSHOT: &str = "game_error_dbg.jpg";
pub const BATTLE_ENTERED_SNAPSHOT: &str = "game_loaded_dbg.jpg";
pub const SCREEN_WHITE_SNAPSHOT: &str = "screen_white_dbg.jpg";
pub const APPEARED_SNAPSHOT: &str = "appeared_dbg.jpg";

fn to_rgb_image(frame: &Frame) -> Result<RgbImage> {
    RgbImage::from_raw(frame.width(), frame.height(), frame.rgb_data().to_vec())
        .context("frame buffer does not match its dimensions")
}

/// Encode a frame as JPEG bytes for operator delivery.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>> {
    let image = to_rgb_image(frame)?;
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, image::ImageFormat::Jpeg)
        .context("failed to encode frame as JPEG")?;
    Ok(cursor.into_inner())
}

/// Writes stills under one output directory.
pub struct SnapshotWriter {
    root: PathBuf,
}

impl SnapshotWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist a frame under one of the fixed diagnostic names.
    pub fn save_debug(&self, name: &str, frame: &Frame) -> Result<()> {
        self.save(&self.root.join(name), frame)
    }

    /// Persist the per-iteration classification snapshot.
    pub fn save_encounter(&self, iteration: u64, frame: &Frame) -> Result<PathBuf> {
        let dir = self.root.join("encounters");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(format!("encounter_{iteration}.jpg"));
        self.save(&path, frame)?;
        Ok(path)
    }

    fn save(&self, path: &Path, frame: &Frame) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        to_rgb_image(frame)?
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "snapshot written");
        Ok(())
    }
}
