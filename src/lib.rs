//! vision-stream library crate.
//!
//! Live camera feed over HTTP with on-demand recording through an external
//! encoder. This module exposes the components for the binary and for
//! integration testing.

pub mod camera;
pub mod cli;
pub mod config;
pub mod overlay;
pub mod pipeline;
pub mod recording;
pub mod server;
pub mod stream;
