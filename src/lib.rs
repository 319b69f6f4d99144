//! Vision-driven encounter automation.
//!
//! Watches a capture card pointed at the console, drives an emulated
//! controller through a fixed encounter sequence, classifies the final
//! frame for a rare color variant, and reports to an operator over
//! Telegram. State is inferred exclusively from single pixels sampled at
//! fixed coordinates with small tolerance bands — no general image
//! recognition.

pub mod awaiter;
pub mod capture;
pub mod config;
pub mod controller;
pub mod frame;
pub mod hunter;
pub mod listener;
pub mod sequencer;
pub mod snapshots;
pub mod status;
pub mod telegram;
