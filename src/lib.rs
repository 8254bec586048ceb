#![cfg_attr(not(test), no_std)]

//! tppm_rx - Tagged PPM-Sum radio-control decoder
//!
//! This library decodes a PPM / PPM-Sum pulse train captured by a hardware
//! timer's input-capture unit, recovering per-channel servo values, frame
//! synchronization, transmitter identity and a fail-safe channel set.
//!
//! The decoder understands two signal flavors through one code path:
//! - plain PPM-Sum: every gap between pulses carries one channel value
//! - tagged PPM-Sum: a secondary bit protocol is superimposed on the fine
//!   variation of the pulse widths, carrying transmitter/receiver identity,
//!   a parity-protected address and a rotating scan index that multiplexes
//!   extra proportional and on/off channels over consecutive frames
//!
//! # Architecture
//!
//! ```text
//! timer capture ISR ──▶ PpmSum::process ──▶ ChannelStore ◀── ChannelReader
//!  (level, ticks)        classifier            (atomic         (main loop)
//!                        signatures             buffer
//!                        tag decoder            flip)
//!                        state machine
//! ```
//!
//! The writer half (`PpmSum`) runs to completion inside the capture
//! interrupt; the reader half (`ChannelReader`) runs in the application
//! main loop and always observes a fully committed frame.

// Timing constants and derived tick thresholds
pub mod config;

// Edge classification and per-frame timing signatures
pub mod signal;

// Superimposed-tag protocol decoder
pub mod tag;

// Triple-buffered channel store and reader handle
pub mod channels;

// Frame state machine
pub mod decoder;

// Interrupt trampoline glue (feature `embassy`)
#[cfg(feature = "embassy")]
pub mod capture;

// Logging macros (defmt / host test / no-op)
pub mod logging;

// Re-export the commonly used types
pub use channels::{ChannelReader, ChannelStore};
pub use config::{ConfigError, DecoderConfig, Result, TimingConfig};
pub use decoder::{DecodeState, PpmSum};
pub use signal::{Level, SignalClass};
