//! PPM-Sum frame state machine
//!
//! [`PpmSum`] is the writer half of the decoder: the input-capture ISR
//! feeds it one `(level, counter)` pair per transition and it runs the
//! whole classify → account → evaluate pipeline to completion, bounded
//! time, no blocking.
//!
//! ## States
//!
//! - `InitDecode`: scrubbed restart; entered on construction, on any
//!   frame mismatch during acknowledge and on loss of signal
//! - `SyncSearch`: discard everything until a sync-class width arrives
//! - `Acknowledge`: collect consecutive frames whose timing signature
//!   repeats the first one; pair with the transmitter's tag if present
//! - `Capture`: steady state; every structurally good frame addressed to
//!   this receiver is committed to the channel store
//!
//! A frame is evaluated when its terminating sync arrives. Between syncs
//! the decoder only accounts widths: gap-level widths become channel
//! values (gap plus the pulse preceding it), pulse-level widths feed the
//! per-frame signatures and the superimposed-tag decoder.

use bitflags::bitflags;

use crate::channels::{ChannelReader, ChannelStore};
use crate::config::{DecoderConfig, Result, TickBounds};
use crate::signal::{Level, Signature, SignalClass, SignalClassifier};
use crate::tag::TagDecoder;
use crate::{log_debug, log_info, log_warn};

/// Reference signature captured from the first good frame
const SIG_REF: usize = 0;

/// Signature of the frame currently being accumulated
const SIG_CUR: usize = 1;

/// Decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeState {
    InitDecode,
    SyncSearch,
    Acknowledge,
    Capture,
}

bitflags! {
    /// Packed decoder status flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct DecoderFlags: u8 {
        /// The gap polarity has been latched from a sync boundary
        const GAP_LEVEL_SET = 1 << 0;
        /// The fail-safe frame has been captured
        const FAIL_SAFE_SET = 1 << 1;
        /// A tagged transmitter has been identified and paired
        const ENTANGLED = 1 << 2;
    }
}

/// PPM-Sum decoder: the single writer of a [`ChannelStore`]
pub struct PpmSum<'a> {
    bounds: TickBounds,
    min_channels: u8,
    max_channels: u8,
    good_threshold: u8,
    hold_threshold: u8,
    delta: u32,
    tag_enabled: bool,

    state: DecodeState,
    flags: DecoderFlags,
    classifier: SignalClassifier,
    /// Level of the edge terminating a gap; latched at each sync
    gap_level: Level,
    /// Validity bounds for the gap-level signature (gap band before the
    /// first sync, full channel band afterwards)
    signal_bounds: (u32, u32),
    /// [SIG_REF|SIG_CUR] × [level]
    signatures: [[Signature; 2]; 2],
    sig_buf: usize,
    /// Width of the pulse preceding the gap being measured
    last_pulse_width: u32,
    tag: TagDecoder,
    good_frames: u8,
    hold_frames: u8,

    store: &'a ChannelStore,
}

impl<'a> PpmSum<'a> {
    /// Build a decoder over `store` and hand back the matching reader
    ///
    /// The store is filled with the configured default values; wire the
    /// capture interrupt up only after this returns.
    pub fn new(
        config: DecoderConfig,
        store: &'a ChannelStore,
    ) -> Result<(Self, ChannelReader<'a>)> {
        let bounds = TickBounds::derive(&config)?;

        store.fill_defaults(
            config.default_servo_ticks(),
            if config.default_onoff { 0xff } else { 0x00 },
        );

        let reader = ChannelReader::new(
            store,
            bounds.channel_min,
            bounds.channel_max,
            config.output_min,
            config.output_max,
        );

        let mut decoder = Self {
            bounds,
            min_channels: config.min_channels,
            max_channels: config.max_channels,
            good_threshold: config.good_frames,
            hold_threshold: config.hold_frames,
            delta: config.signature_delta,
            tag_enabled: config.tag_enabled,
            state: DecodeState::InitDecode,
            flags: DecoderFlags::empty(),
            classifier: SignalClassifier::new(&bounds),
            gap_level: Level::High,
            signal_bounds: (bounds.gap_min, bounds.gap_max),
            signatures: [[Signature::new(); 2]; 2],
            sig_buf: SIG_REF,
            last_pulse_width: 0,
            tag: TagDecoder::new(&bounds, config.decoder_id, config.signature_delta),
            good_frames: 0,
            hold_frames: 0,
            store,
        };
        decoder.restart();

        Ok((decoder, reader))
    }

    /// Feed one level transition: the new pin level and the raw capture
    /// counter at that instant
    ///
    /// Runs to completion; call from the capture ISR only.
    pub fn process(&mut self, level: Level, count: u32) {
        let width = self.classifier.edge(count);

        match self.classifier.classify(width) {
            SignalClass::Lost(_) => {
                log_warn!("signal lost: width {} exceeds sync band", width);
                self.restart();
            }
            SignalClass::Glitch => (),
            SignalClass::Sync(_) => self.on_sync(level),
            SignalClass::Pulse(_) | SignalClass::Gap(_) => self.account(level, width),
        }
    }

    /// Fold a below-sync width into the frame accounting
    fn account(&mut self, level: Level, width: u32) {
        if !self.flags.contains(DecoderFlags::GAP_LEVEL_SET) {
            // no polarity anchor before the first sync
            return;
        }

        if level == self.gap_level {
            // a gap ended: together with its pulse it is one channel
            let channel_width = width + self.last_pulse_width;
            let channel = self.signatures[self.sig_buf][self.gap_level as usize].captures;

            self.store
                .stage(channel as usize, channel_width.min(u16::MAX as u32) as u16);
            self.signatures[self.sig_buf][self.gap_level as usize].update(channel_width);
            self.last_pulse_width = 0;
        } else {
            // a pulse ended: it carries two tag bits
            let pulse_index = self.signatures[self.sig_buf][level as usize].captures;

            self.signatures[self.sig_buf][level as usize].update(width);
            if self.tag_enabled {
                self.tag.update(pulse_index, width);
            }
            self.last_pulse_width = width;
        }
    }

    /// A frame boundary arrived
    fn on_sync(&mut self, level: Level) {
        if self.state == DecodeState::InitDecode {
            self.state = DecodeState::SyncSearch;
        }

        match self.state {
            DecodeState::SyncSearch => self.acquire_sync(level),
            DecodeState::Acknowledge => self.acknowledge_frame(),
            DecodeState::Capture => self.capture_frame(),
            DecodeState::InitDecode => unreachable!(),
        }
    }

    /// First sync after a restart: anchor polarity and start acknowledging
    fn acquire_sync(&mut self, level: Level) {
        self.reset_signatures(SIG_REF);
        self.reset_signatures(SIG_CUR);
        self.tag.reset();

        self.sig_buf = SIG_REF;
        self.gap_level = level;
        self.flags.insert(DecoderFlags::GAP_LEVEL_SET);
        self.flags.remove(DecoderFlags::ENTANGLED);
        self.store.set_entangled(false);
        self.signal_bounds = (self.bounds.channel_min, self.bounds.channel_max);
        self.last_pulse_width = 0;

        self.state = DecodeState::Acknowledge;
        log_debug!("sync acquired, acknowledging");
    }

    /// Evaluate one frame during acknowledge
    fn acknowledge_frame(&mut self) {
        if !self.frame_is_structural() || !self.frame_matches_reference() || !self.tag_accepted() {
            // no partial credit while identifying the transmitter
            self.restart();
            return;
        }

        self.good_frames = self.good_frames.saturating_add(1);
        let captures = self.gap_signature().captures;

        if self.sig_buf == SIG_REF {
            // first good frame: keep it as the reference and, if it
            // carries a tag, entangle with its transmitter
            if self.tag_enabled {
                self.tag.pair();
                if self.tag.is_encoded() {
                    self.flags.insert(DecoderFlags::ENTANGLED);
                    self.store.set_entangled(true);
                    log_info!("entangled with encoder {}", self.tag.fields().encoder_id);
                }
            }
            self.sig_buf = SIG_CUR;
        }

        if self.good_frames >= self.good_threshold {
            let part_index = if self.flags.contains(DecoderFlags::ENTANGLED) {
                self.tag.fields().part_index
            } else {
                0
            };

            self.store.commit(captures, part_index, None);
            self.store.set_fail_safe_mode(false);

            if !self.flags.contains(DecoderFlags::FAIL_SAFE_SET) {
                self.store.capture_fail_safe();
                self.flags.insert(DecoderFlags::FAIL_SAFE_SET);
            }

            self.store.set_synced(true);
            self.state = DecodeState::Capture;
            self.hold_frames = 0;
            log_info!("capture entered after {} good frames", self.good_frames);
        }

        self.reset_signatures(SIG_CUR);
        self.tag.reset();
    }

    /// Evaluate one frame during capture
    fn capture_frame(&mut self) {
        if !self.flags.contains(DecoderFlags::GAP_LEVEL_SET) {
            self.restart();
            return;
        }

        if self.frame_is_structural() {
            let entangled = self.flags.contains(DecoderFlags::ENTANGLED);
            let addressed_to_me = self.tag.is_encoded() && self.tag.is_valid();

            if !entangled || addressed_to_me {
                // usable frame: commit and leave fail-safe, if engaged
                self.hold_frames = 0;
                let captures = self.gap_signature().captures;

                if entangled {
                    let part_index = self.tag.fields().part_index;
                    self.store.commit(captures, part_index, Some(&self.tag));
                } else {
                    self.store.commit(captures, 0, None);
                }
                self.store.set_fail_safe_mode(false);
            } else if !self.tag.is_encoded() {
                // entangled, but this frame carries no tag at all
                self.hold_frames = self.hold_frames.saturating_add(1);
            } else {
                // a well-formed tag for some other receiver: the
                // transmitter is busy elsewhere, freeze on the last
                // good frame
                self.hold_frames = 0;
                self.store.set_fail_safe_mode(false);
            }
        } else {
            self.hold_frames = self.hold_frames.saturating_add(1);
        }

        if self.hold_frames >= self.hold_threshold {
            self.hold_frames = self.hold_threshold;

            if self.flags.contains(DecoderFlags::FAIL_SAFE_SET) && !self.store.is_fail_safe() {
                log_warn!("hold threshold reached, fail-safe engaged");
                self.store.set_fail_safe_mode(true);
            }
        }

        self.reset_signatures(SIG_CUR);
        self.tag.reset();
    }

    /// Checks (a)-(c): pulse signature, channel signature, gap/pulse count
    fn frame_is_structural(&self) -> bool {
        if !self.flags.contains(DecoderFlags::GAP_LEVEL_SET) {
            return false;
        }

        let pulse = self.pulse_signature();
        let gap = self.gap_signature();

        pulse.is_valid(
            self.bounds.pulse_min,
            self.bounds.pulse_max,
            self.min_channels,
            self.max_channels + 1,
        ) && gap.is_valid(
            self.signal_bounds.0,
            self.signal_bounds.1,
            self.min_channels,
            self.max_channels,
        ) && gap.captures + 1 == pulse.captures
    }

    /// Check (d): both levels repeat the reference frame's signature
    fn frame_matches_reference(&self) -> bool {
        let cur = &self.signatures[self.sig_buf];
        let reference = &self.signatures[SIG_REF];

        cur[Level::Low as usize].matches(&reference[Level::Low as usize], self.delta)
            && cur[Level::High as usize].matches(&reference[Level::High as usize], self.delta)
    }

    /// Check (e): a tagged frame must be addressed to this receiver
    fn tag_accepted(&self) -> bool {
        !self.tag_enabled || !self.tag.is_encoded() || self.tag.is_valid()
    }

    /// Full restart: everything but the store's frozen frames is scrubbed
    fn restart(&mut self) {
        self.state = DecodeState::InitDecode;
        self.flags = DecoderFlags::empty();
        self.gap_level = Level::High;
        self.signal_bounds = (self.bounds.gap_min, self.bounds.gap_max);
        self.sig_buf = SIG_REF;
        self.last_pulse_width = 0;
        self.good_frames = 0;
        self.hold_frames = 0;
        self.reset_signatures(SIG_REF);
        self.reset_signatures(SIG_CUR);
        self.tag.reset();

        self.store.set_synced(false);
        self.store.set_entangled(false);
        self.store.set_fail_safe_mode(true);
    }

    fn reset_signatures(&mut self, buffer: usize) {
        self.signatures[buffer][Level::Low as usize].reset();
        self.signatures[buffer][Level::High as usize].reset();
    }

    fn pulse_signature(&self) -> &Signature {
        &self.signatures[self.sig_buf][self.gap_level.opposite() as usize]
    }

    fn gap_signature(&self) -> &Signature {
        &self.signatures[self.sig_buf][self.gap_level as usize]
    }

    /// Current decoder state
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// True once a sync has been found (frames are being captured, usable
    /// or not)
    pub fn capturing(&self) -> bool {
        matches!(self.state, DecodeState::Acknowledge | DecodeState::Capture)
    }

    /// True while the decoder has not yet reached steady-state capture
    pub fn initializing(&self) -> bool {
        self.state != DecodeState::Capture
    }

    /// True when paired with a tagged transmitter
    pub fn entangled(&self) -> bool {
        self.flags.contains(DecoderFlags::ENTANGLED)
    }

    /// Drop the transmitter pairing and restart synchronization
    pub fn unpair(&mut self) {
        self.tag.unpair();
        self.restart();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BASIC_CHANNELS, MAX_CHANNELS};
    use crate::tag::{encode_raw, pulse_widths, TagFields, TAG_PULSES};

    /// Simulated capture line: accumulates widths into a wrapping counter
    struct Line<'a> {
        decoder: PpmSum<'a>,
        count: u32,
        timer_max: u32,
    }

    impl<'a> Line<'a> {
        fn new(decoder: PpmSum<'a>) -> Self {
            let timer_max = decoder.bounds.timer_max;
            Self {
                decoder,
                count: 0,
                timer_max,
            }
        }

        fn edge(&mut self, level: Level, width: u32) {
            self.count = (self.count + width) % self.timer_max;
            self.decoder.process(level, self.count);
        }

        /// One frame of channel widths followed by its sync, with pulse
        /// widths chosen per channel
        fn frame_with_pulses(&mut self, channels: &[u32], pulses: &[u32]) {
            for (i, &channel) in channels.iter().enumerate() {
                self.edge(Level::Low, pulses[i]);
                self.edge(Level::High, channel - pulses[i]);
            }
            self.edge(Level::Low, pulses[channels.len()]);
            self.edge(Level::High, 3000);
        }

        /// Plain PPM frame: every pulse has the same width
        fn frame(&mut self, channels: &[u32]) {
            let pulses = [400u32; MAX_CHANNELS + 1];
            self.frame_with_pulses(channels, &pulses[..channels.len() + 1]);
        }

        /// Tagged frame: pulse widths encode the raw tag word
        fn tagged_frame(&mut self, channels: &[u32; 8], fields: &TagFields) {
            let pulses = pulse_widths(encode_raw(fields), &self.decoder.bounds);
            assert_eq!(pulses.len(), TAG_PULSES);
            self.frame_with_pulses(channels, &pulses);
        }
    }

    fn untagged_config() -> DecoderConfig {
        DecoderConfig {
            tag_enabled: false,
            ..Default::default()
        }
    }

    fn setup<'a>(
        config: DecoderConfig,
        store: &'a ChannelStore,
    ) -> (Line<'a>, crate::ChannelReader<'a>) {
        let (decoder, reader) = PpmSum::new(config, store).unwrap();
        (Line::new(decoder), reader)
    }

    const CHANNELS: [u32; 8] = [1000, 1100, 1200, 1300, 1400, 1500, 1600, 1700];

    #[test]
    fn test_scenario_sync_enters_acknowledge_only() {
        let store = ChannelStore::new();
        let (mut line, reader) = setup(untagged_config(), &store);

        assert_eq!(line.decoder.state(), DecodeState::InitDecode);
        line.edge(Level::High, 2500); // exactly sync_min, no prior pulses

        assert_eq!(line.decoder.state(), DecodeState::Acknowledge);
        assert!(line.decoder.capturing());
        assert!(!reader.is_synced());
    }

    #[test]
    fn test_scenario_ten_good_frames_reach_capture() {
        let store = ChannelStore::new();
        let (mut line, reader) = setup(untagged_config(), &store);

        line.edge(Level::High, 3000);
        for n in 1..=10 {
            line.frame(&CHANNELS);
            if n < 10 {
                assert!(!reader.is_synced(), "synced too early at frame {}", n);
            }
        }

        assert_eq!(line.decoder.state(), DecodeState::Capture);
        assert!(reader.is_synced());
        assert_eq!(reader.channels(), 8);

        // raw snapshot carries the channel widths (pulse + gap)
        assert_eq!(
            reader.read_raw().as_slice(),
            &[1000, 1100, 1200, 1300, 1400, 1500, 1600, 1700]
        );

        // the fail-safe frame froze frame 10's values
        store.set_fail_safe_mode(true);
        assert_eq!(
            reader.read_raw().as_slice(),
            &[1000, 1100, 1200, 1300, 1400, 1500, 1600, 1700]
        );
    }

    #[test]
    fn test_rescaled_read_is_monotonic_in_raw_width() {
        let store = ChannelStore::new();
        let (mut line, reader) = setup(untagged_config(), &store);

        line.edge(Level::High, 3000);
        for _ in 0..10 {
            line.frame(&CHANNELS);
        }

        let scaled = reader.read();
        for pair in scaled.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(scaled.len(), 8);
    }

    #[test]
    fn test_scenario_glitch_frames_engage_fail_safe() {
        let store = ChannelStore::new();
        let (mut line, reader) = setup(untagged_config(), &store);

        line.edge(Level::High, 3000);
        for _ in 0..10 {
            line.frame(&CHANNELS);
        }
        let good = reader.read_raw();

        // 25 "frames" of nothing but glitches and their sync boundaries
        for n in 1..=25 {
            for _ in 0..8 {
                line.edge(Level::Low, 50);
                line.edge(Level::High, 40);
            }
            line.edge(Level::High, 3000);

            if n < 25 {
                assert!(!reader.is_failsafe(), "fail-safe engaged early at {}", n);
            }
        }

        assert!(reader.is_failsafe());
        assert_eq!(reader.read_raw(), good);
        // the decoder keeps trying from where it is, no full restart
        assert_eq!(line.decoder.state(), DecodeState::Capture);

        // one good frame recovers transparently
        line.frame(&CHANNELS);
        assert!(!reader.is_failsafe());
        assert!(reader.is_synced());
    }

    #[test]
    fn test_scenario_lost_signal_restarts_decoder() {
        let store = ChannelStore::new();
        let (mut line, reader) = setup(untagged_config(), &store);

        line.edge(Level::High, 3000);
        for _ in 0..10 {
            line.frame(&CHANNELS);
        }
        assert!(reader.is_synced());

        // one tick above the maximum sync width
        line.edge(Level::High, line.decoder.bounds.sync_max + 1);

        assert_eq!(line.decoder.state(), DecodeState::InitDecode);
        assert!(!reader.is_synced());
    }

    #[test]
    fn test_acknowledge_mismatch_restarts_without_partial_credit() {
        let store = ChannelStore::new();
        let (mut line, reader) = setup(untagged_config(), &store);

        line.edge(Level::High, 3000);
        for _ in 0..5 {
            line.frame(&CHANNELS);
        }

        // different widths: signature no longer matches the reference
        let other = [1050u32, 1100, 1200, 1300, 1400, 1500, 1600, 1700];
        line.frame(&other);
        assert_eq!(line.decoder.state(), DecodeState::InitDecode);

        // ten further good frames are needed from scratch
        line.edge(Level::High, 3000);
        for n in 1..=10 {
            line.frame(&other);
            if n < 10 {
                assert!(!reader.is_synced());
            }
        }
        assert!(reader.is_synced());
    }

    #[test]
    fn test_channel_count_change_aborts_frame() {
        let store = ChannelStore::new();
        let (mut line, _reader) = setup(untagged_config(), &store);

        line.edge(Level::High, 3000);
        line.frame(&CHANNELS);
        // same widths, one channel short: capture count mismatch
        line.frame(&CHANNELS[..7]);

        assert_eq!(line.decoder.state(), DecodeState::InitDecode);
    }

    #[test]
    fn test_tagged_frames_pair_and_demux() {
        let store = ChannelStore::new();
        let config = DecoderConfig {
            decoder_id: 5,
            ..Default::default()
        };
        let (mut line, reader) = setup(config, &store);

        let fields = TagFields {
            encoder_id: 2,
            buttons: 0,
            decoder_id: 5,
            part_index: 3,
            scan_index: 0,
        };

        line.edge(Level::High, 3000);
        for _ in 0..10 {
            line.tagged_frame(&CHANNELS_8, &fields);
        }

        assert!(reader.is_synced());
        assert!(reader.entangled());
        assert!(line.decoder.entangled());
        assert_eq!(reader.part_index(), 3);
        assert_eq!(reader.basic_channels(), 4);
        assert_eq!(reader.extra_channels(), 12);
        assert_eq!(reader.onoff_channels(), 32);

        // one capture frame per scan index demultiplexes the extras
        for scan in 0..4u8 {
            let fields = TagFields {
                scan_index: scan,
                ..fields
            };
            line.tagged_frame(&CHANNELS_8, &fields);
        }
        assert!(reader.is_synced());

        let extra = reader.read_extra();
        // frame slots 4..6 land in every scan position of their group
        for group in 0..3 {
            let expected = reader.read()[BASIC_CHANNELS + group];
            for scan in 0..4 {
                assert_eq!(extra[scan | (group << 2)], expected);
            }
        }
    }

    const CHANNELS_8: [u32; 8] = CHANNELS;

    #[test]
    fn test_scenario_foreign_encoder_freezes_output() {
        let store = ChannelStore::new();
        let config = DecoderConfig {
            decoder_id: 5,
            ..Default::default()
        };
        let (mut line, reader) = setup(config, &store);

        let mine = TagFields {
            encoder_id: 1,
            buttons: 0,
            decoder_id: 5,
            part_index: 0,
            scan_index: 0,
        };

        line.edge(Level::High, 3000);
        for _ in 0..10 {
            line.tagged_frame(&CHANNELS_8, &mine);
        }
        assert!(reader.is_synced());
        let good = reader.read_raw();

        // structurally valid frame, different (valid) encoder
        let foreign = TagFields {
            encoder_id: 2,
            ..mine
        };
        let other_widths = [1900u32, 1900, 1900, 1900, 1900, 1900, 1900, 1900];
        for _ in 0..30 {
            line.tagged_frame(&other_widths, &foreign);
        }

        // no fail-safe, no buffer swap, no restart
        assert!(!reader.is_failsafe());
        assert_eq!(reader.read_raw(), good);
        assert_eq!(line.decoder.state(), DecodeState::Capture);

        // the paired transmitter comes back
        line.tagged_frame(&CHANNELS_8, &mine);
        assert_eq!(reader.read_raw(), good);
        assert!(reader.is_synced());
    }

    #[test]
    fn test_entangled_plain_frames_count_toward_hold() {
        let store = ChannelStore::new();
        let config = DecoderConfig {
            decoder_id: 5,
            ..Default::default()
        };
        let (mut line, reader) = setup(config, &store);

        let mine = TagFields {
            encoder_id: 1,
            buttons: 0,
            decoder_id: 5,
            part_index: 0,
            scan_index: 0,
        };

        line.edge(Level::High, 3000);
        for _ in 0..10 {
            line.tagged_frame(&CHANNELS_8, &mine);
        }
        assert!(reader.is_synced());

        // structurally good but un-tagged frames while entangled
        for n in 1..=25 {
            line.frame(&CHANNELS);
            if n < 25 {
                assert!(!reader.is_failsafe(), "engaged early at {}", n);
            }
        }
        assert!(reader.is_failsafe());
        assert_eq!(line.decoder.state(), DecodeState::Capture);
    }

    #[test]
    fn test_untagged_variant_ignores_tag_bits() {
        let store = ChannelStore::new();
        let (mut line, reader) = setup(untagged_config(), &store);

        // wildly varying pulse widths would form garbage tags; with tag
        // decoding disabled they are only checked against the pulse band
        let pulses = [310u32, 450, 330, 440, 350, 420, 370, 400, 390];
        line.edge(Level::High, 3000);
        for _ in 0..10 {
            line.frame_with_pulses(&CHANNELS, &pulses);
        }

        assert!(reader.is_synced());
        assert!(!reader.entangled());
        assert_eq!(reader.channels(), 8);
        // raw channels past the basic four stand in for the extras
        assert_eq!(reader.extra_channels(), 4);
        assert_eq!(reader.onoff_channels(), 0);
    }

    #[test]
    fn test_unpair_restarts_and_accepts_new_encoder() {
        let store = ChannelStore::new();
        let config = DecoderConfig {
            decoder_id: 5,
            ..Default::default()
        };
        let (mut line, reader) = setup(config, &store);

        let first = TagFields {
            encoder_id: 1,
            buttons: 0,
            decoder_id: 5,
            part_index: 0,
            scan_index: 0,
        };
        line.edge(Level::High, 3000);
        for _ in 0..10 {
            line.tagged_frame(&CHANNELS_8, &first);
        }
        assert!(reader.is_synced());

        line.decoder.unpair();
        assert!(!reader.is_synced());

        let second = TagFields {
            encoder_id: 3,
            ..first
        };
        line.edge(Level::High, 3000);
        for _ in 0..10 {
            line.tagged_frame(&CHANNELS_8, &second);
        }
        assert!(reader.is_synced());
        assert!(reader.entangled());
    }

    #[test]
    fn test_read_idempotent_without_new_frames() {
        let store = ChannelStore::new();
        let (mut line, reader) = setup(untagged_config(), &store);

        line.edge(Level::High, 3000);
        for _ in 0..10 {
            line.frame(&CHANNELS);
        }

        assert_eq!(reader.read(), reader.read());
        assert_eq!(reader.read_raw(), reader.read_raw());
    }

    #[test]
    fn test_wraparound_mid_frame_decodes_cleanly() {
        let store = ChannelStore::new();
        let (mut line, reader) = setup(untagged_config(), &store);

        // park the counter close to the top so frames straddle the wrap
        line.count = 0xff00;
        line.edge(Level::High, 3000);
        for _ in 0..10 {
            line.frame(&CHANNELS);
        }

        assert!(reader.is_synced());
        assert_eq!(reader.read_raw().as_slice(), &CHANNELS.map(|w| w as u16));
    }
}
