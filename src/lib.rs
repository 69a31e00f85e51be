//! Moovforge - MP4/fMP4 remuxing and inspection tool
//!
//! This library crate exposes the command implementations for integration
//! testing. The container engine itself lives in `moovforge-mp4`.

pub mod config;
pub mod remux;
