//! Triple-buffered channel store
//!
//! Three frames live here: two alternating live frames and one fail-safe
//! frame frozen at synchronization time. The decoder (running inside the
//! capture interrupt) stages incoming channel widths into the inactive
//! live frame and commits a finished frame by flipping the active index;
//! that flip is the only synchronization point between the interrupt
//! writer and the main-loop reader.
//!
//! # Concurrency contract
//!
//! Exactly one writer exists (the decoder, non-reentrant, driven by the
//! capture ISR). It only ever mutates the *inactive* live frame, so a
//! reader that acquire-loads the active index always copies a fully
//! committed frame: either the old one or the new one, never a mix.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use heapless::Vec;

use crate::config::{BASIC_CHANNELS, EXTRA_CHANNELS, MAX_CHANNELS, ONOFF_BYTES, ONOFF_CHANNELS};
use crate::tag::TagDecoder;

/// One committed frame: raw channel widths plus the demultiplexed
/// extra/on-off channel sets
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChannelFrame {
    pub raw: [u16; MAX_CHANNELS],
    pub extra: [u16; EXTRA_CHANNELS],
    pub onoff: [u8; ONOFF_BYTES],
    pub captures: u8,
    pub part_index: u8,
}

impl ChannelFrame {
    const EMPTY: Self = Self {
        raw: [0; MAX_CHANNELS],
        extra: [0; EXTRA_CHANNELS],
        onoff: [0; ONOFF_BYTES],
        captures: 0,
        part_index: 0,
    };
}

/// Shared channel buffers, usable as a `static`
pub struct ChannelStore {
    live: [UnsafeCell<ChannelFrame>; 2],
    fail_safe: UnsafeCell<ChannelFrame>,
    /// Index of the readable live frame
    active: AtomicU8,
    synced: AtomicBool,
    fail_safe_mode: AtomicBool,
    entangled: AtomicBool,
}

// SAFETY: single-writer discipline. The decoder is the only mutator and
// never touches the active live frame; the fail-safe frame is only written
// while readers are directed at the live frames. Readers only copy out.
unsafe impl Sync for ChannelStore {}

impl ChannelStore {
    pub const fn new() -> Self {
        Self {
            live: [
                UnsafeCell::new(ChannelFrame::EMPTY),
                UnsafeCell::new(ChannelFrame::EMPTY),
            ],
            fail_safe: UnsafeCell::new(ChannelFrame::EMPTY),
            active: AtomicU8::new(0),
            synced: AtomicBool::new(false),
            fail_safe_mode: AtomicBool::new(false),
            entangled: AtomicBool::new(false),
        }
    }

    /// Fill every frame with the power-on defaults
    ///
    /// Called once from decoder construction, before any ISR is wired up.
    pub(crate) fn fill_defaults(&self, servo: u16, onoff: u8) {
        let defaults = ChannelFrame {
            raw: [servo; MAX_CHANNELS],
            extra: [servo; EXTRA_CHANNELS],
            onoff: [onoff; ONOFF_BYTES],
            captures: 0,
            part_index: 0,
        };

        // SAFETY: no concurrent reader or writer exists yet (see doc).
        unsafe {
            *self.live[0].get() = defaults;
            *self.live[1].get() = defaults;
            *self.fail_safe.get() = defaults;
        }
    }

    /// Stage one channel width of the in-progress frame
    pub(crate) fn stage(&self, channel: usize, width: u16) {
        if channel >= MAX_CHANNELS {
            return;
        }

        let inactive = self.inactive_index();
        // SAFETY: writer-only method; the inactive frame is never read.
        unsafe {
            (*self.live[inactive].get()).raw[channel] = width;
        }
    }

    /// Commit the staged frame: carry forward what this frame did not
    /// write, demultiplex the scan-addressed channels, then flip the
    /// active index
    pub(crate) fn commit(&self, captures: u8, part_index: u8, demux: Option<&TagDecoder>) {
        let active = self.active.load(Ordering::Relaxed) & 1;
        let inactive = (active ^ 1) as usize;

        // SAFETY: writer-only method. `src` is the active frame, which the
        // reader may also be copying: both sides only read it. `dst` is the
        // inactive frame, invisible to the reader until the flip below.
        unsafe {
            let src = &*self.live[active as usize].get();
            let dst = &mut *self.live[inactive].get();

            for slot in captures as usize..MAX_CHANNELS {
                dst.raw[slot] = src.raw[slot];
            }
            dst.extra = src.extra;
            dst.onoff = src.onoff;
            dst.captures = captures;
            dst.part_index = part_index;

            if let Some(tag) = demux {
                tag.decode(&dst.raw, &mut dst.extra, &mut dst.onoff);
            }
        }

        self.active.store(inactive as u8, Ordering::Release);
    }

    /// Freeze the last committed frame as the fail-safe set
    ///
    /// Must only be called while fail-safe mode is disengaged, so that no
    /// reader is looking at the fail-safe frame.
    pub(crate) fn capture_fail_safe(&self) {
        let active = (self.active.load(Ordering::Relaxed) & 1) as usize;
        // SAFETY: writer-only method; readers are on the live frames.
        unsafe {
            *self.fail_safe.get() = *self.live[active].get();
        }
    }

    pub(crate) fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::Release);
    }

    pub(crate) fn set_fail_safe_mode(&self, engaged: bool) {
        self.fail_safe_mode.store(engaged, Ordering::Release);
    }

    pub(crate) fn set_entangled(&self, entangled: bool) {
        self.entangled.store(entangled, Ordering::Release);
    }

    fn inactive_index(&self) -> usize {
        ((self.active.load(Ordering::Relaxed) & 1) ^ 1) as usize
    }

    /// Copy out the frame a reader should currently see
    pub(crate) fn snapshot(&self) -> ChannelFrame {
        if self.fail_safe_mode.load(Ordering::Acquire) {
            // SAFETY: the fail-safe frame is only written while fail-safe
            // mode is disengaged.
            unsafe { *self.fail_safe.get() }
        } else {
            let active = (self.active.load(Ordering::Acquire) & 1) as usize;
            // SAFETY: the active frame is never mutated by the writer.
            unsafe { *self.live[active].get() }
        }
    }

    pub(crate) fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    pub(crate) fn is_fail_safe(&self) -> bool {
        self.fail_safe_mode.load(Ordering::Acquire)
    }

    pub(crate) fn is_entangled(&self) -> bool {
        self.entangled.load(Ordering::Acquire)
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-side handle onto a [`ChannelStore`]
///
/// Cheap to copy around the application; every accessor observes a fully
/// committed frame.
#[derive(Clone, Copy)]
pub struct ChannelReader<'a> {
    store: &'a ChannelStore,
    channel_min: u32,
    channel_max: u32,
    output_min: u16,
    output_max: u16,
}

impl<'a> ChannelReader<'a> {
    pub(crate) fn new(
        store: &'a ChannelStore,
        channel_min: u32,
        channel_max: u32,
        output_min: u16,
        output_max: u16,
    ) -> Self {
        Self {
            store,
            channel_min,
            channel_max,
            output_min,
            output_max,
        }
    }

    /// Number of channels captured in the current snapshot
    pub fn channels(&self) -> u8 {
        self.store.snapshot().captures
    }

    /// Number of basic (full-rate) channels available
    pub fn basic_channels(&self) -> u8 {
        self.channels().min(BASIC_CHANNELS as u8)
    }

    /// Number of extra channels available
    ///
    /// With a tagged transmitter the multiplexed set is complete; a plain
    /// PPM source only offers whatever raw channels follow the basic ones.
    pub fn extra_channels(&self) -> u8 {
        if self.entangled() {
            EXTRA_CHANNELS as u8
        } else {
            self.channels().saturating_sub(BASIC_CHANNELS as u8)
        }
    }

    /// Number of on/off channels available (0 for a plain PPM source)
    pub fn onoff_channels(&self) -> u8 {
        if self.entangled() {
            ONOFF_CHANNELS as u8
        } else {
            0
        }
    }

    /// True while the decoder is capturing usable frames
    pub fn is_synced(&self) -> bool {
        self.store.is_synced()
    }

    /// True while reads are served from the fail-safe frame
    pub fn is_failsafe(&self) -> bool {
        self.store.is_fail_safe()
    }

    /// True when a tagged transmitter has been identified
    pub fn entangled(&self) -> bool {
        self.store.is_entangled()
    }

    /// Sub-unit addressed by the paired transmitter (0 when untagged)
    pub fn part_index(&self) -> u8 {
        self.store.snapshot().part_index
    }

    /// Snapshot of the channel values, rescaled to the output range
    pub fn read(&self) -> Vec<u16, MAX_CHANNELS> {
        let frame = self.store.snapshot();
        frame.raw[..frame.captures as usize]
            .iter()
            .map(|&w| self.rescale(w))
            .collect()
    }

    /// Snapshot of the channel values in raw timer ticks
    pub fn read_raw(&self) -> Vec<u16, MAX_CHANNELS> {
        let frame = self.store.snapshot();
        Vec::from_slice(&frame.raw[..frame.captures as usize]).unwrap_or_default()
    }

    /// Snapshot of the multiplexed extra channels, rescaled
    pub fn read_extra(&self) -> [u16; EXTRA_CHANNELS] {
        let frame = self.store.snapshot();
        frame.extra.map(|w| self.rescale(w))
    }

    /// Snapshot of the on/off channel bits
    pub fn read_onoff(&self) -> [u8; ONOFF_BYTES] {
        self.store.snapshot().onoff
    }

    /// State of a single on/off channel
    pub fn onoff(&self, channel: usize) -> bool {
        let bits = self.store.snapshot().onoff;
        match bits.get(channel / 8) {
            Some(byte) => byte & (1 << (channel % 8)) != 0,
            None => false,
        }
    }

    /// Linear map from the channel tick domain onto the output range
    fn rescale(&self, width: u16) -> u16 {
        let clamped = (width as u32).clamp(self.channel_min, self.channel_max);
        let span_in = self.channel_max - self.channel_min;
        let span_out = (self.output_max - self.output_min) as u32;

        self.output_min + ((clamped - self.channel_min) * span_out / span_in) as u16
    }
}
