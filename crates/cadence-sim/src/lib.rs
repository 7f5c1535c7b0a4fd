//! Render-loop simulation toolkit for integration testing.
//!
//! Drives a [`cadence_release::ReleaseControl`] the way a video renderer
//! does, against a fake clock, a fixed-refresh display and a seeded decoder
//! model with configurable stalls and seeks, and reports what happened to
//! every frame.

pub mod scenario;
pub mod simulation;
pub mod vsync_grid;
