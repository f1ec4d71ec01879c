//! ascii-recorder library crate.
//!
//! Renders a video source as ASCII art onto an off-screen surface at a
//! bounded frame rate, records that surface into a chunked WebM container,
//! and transcodes the recording into a portable delivery format.

pub mod ascii;
pub mod capture;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod render_config;
pub mod renderer;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod surface;
pub mod transcode;
