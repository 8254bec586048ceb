//! Capture interrupt glue
//!
//! The decoder instance is owned by its caller, not by a global; the
//! interrupt handler only needs a thin trampoline. [`CaptureCell`] is that
//! trampoline: a critical-section cell the application installs the
//! decoder into at startup and the input-capture ISR drives afterwards.
//!
//! # Example
//!
//! ```ignore
//! static STORE: ChannelStore = ChannelStore::new();
//! static DECODER: CaptureCell = CaptureCell::new();
//!
//! // startup
//! let (decoder, reader) = PpmSum::new(DecoderConfig::default(), &STORE)?;
//! DECODER.install(decoder);
//!
//! // in the timer capture ISR
//! DECODER.on_edge(Level::from(pin_is_high), capture_count);
//!
//! // in the main loop
//! let channels = reader.read();
//! ```

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::decoder::PpmSum;
use crate::signal::Level;

/// Critical-section cell holding the installed decoder
pub struct CaptureCell {
    decoder: Mutex<CriticalSectionRawMutex, RefCell<Option<PpmSum<'static>>>>,
}

impl CaptureCell {
    pub const fn new() -> Self {
        Self {
            decoder: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install the decoder; edges arriving before this are ignored
    pub fn install(&self, decoder: PpmSum<'static>) {
        self.decoder.lock(|cell| {
            cell.replace(Some(decoder));
        });
    }

    /// Feed one level transition from the capture ISR
    pub fn on_edge(&self, level: Level, count: u32) {
        self.decoder.lock(|cell| {
            if let Some(decoder) = cell.borrow_mut().as_mut() {
                decoder.process(level, count);
            }
        });
    }

    /// Run a closure against the installed decoder (e.g. to unpair)
    pub fn with<R>(&self, f: impl FnOnce(&mut PpmSum<'static>) -> R) -> Option<R> {
        self.decoder.lock(|cell| cell.borrow_mut().as_mut().map(f))
    }
}

impl Default for CaptureCell {
    fn default() -> Self {
        Self::new()
    }
}
