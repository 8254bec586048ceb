//! Superimposed-tag protocol decoder
//!
//! A tagged transmitter modulates the width of every pulse in a frame to
//! carry two bits per pulse, four quantization levels over the legal pulse
//! band. Across the 9 pulses of an 8-channel frame this yields an 18-bit
//! word:
//!
//! ```text
//! bit  0..=1   encoder id
//! bit  2..=3   quick push-buttons
//! bit  4..=7   decoder id        (addressed receiver)
//! bit  8..=11  part index        (addressed receiver sub-unit)
//! bit 12..=14  scan index        (rotates 0..7, one step per frame)
//! bit 15       encoder group parity
//! bit 16       decoder group parity
//! bit 17       scan group parity
//! ```
//!
//! Each parity bit makes the total number of ones in its group odd. An
//! un-tagged transmitter sends constant-width pulses, which can only ever
//! produce the four degenerate words `00…00`, `0101…01`, `1010…10` and
//! `11…11`; those are rejected outright, and the parity layout is chosen
//! so that none of them could pass all three checks anyway.
//!
//! The scan index doubles as a demultiplexing selector: frame channels 4-6
//! carry 12 logical extra channels and frame channel 7 carries 32 on/off
//! bits, spread over a full 8-frame scan cycle (see [`TagDecoder::decode`]).

use crate::config::{TickBounds, BASIC_CHANNELS, EXTRA_CHANNELS, MAX_CHANNELS, ONOFF_BYTES};

/// Pulses carrying tag bits in one frame (8 channels = 9 pulses)
pub const TAG_PULSES: usize = 9;

/// Channels in a tagged frame
pub const TAGGED_FRAME_CHANNELS: usize = TAG_PULSES - 1;

/// Frame slot carrying the on/off nibble
const ONOFF_CHANNEL_SLOT: usize = TAGGED_FRAME_CHANNELS - 1;

/// Bits actually used in the raw tag word
const TAG_BITS: u32 = (TAG_PULSES as u32) * 2;

/// Mask of the used bits
const TAG_MASK: u32 = (1 << TAG_BITS) - 1;

/// Raw words an un-tagged constant-width PPM source would produce
const DEGENERATE_WORDS: [u32; 4] = [
    0,
    0b01_0101_0101_0101_0101,
    0b10_1010_1010_1010_1010,
    TAG_MASK,
];

// Field positions inside the raw word
const ENCODER_SHIFT: u32 = 0;
const BUTTONS_SHIFT: u32 = 2;
const DECODER_SHIFT: u32 = 4;
const PART_SHIFT: u32 = 8;
const SCAN_SHIFT: u32 = 12;
const ENCODER_PARITY_BIT: u32 = 15;
const DECODER_PARITY_BIT: u32 = 16;
const SCAN_PARITY_BIT: u32 = 17;

/// Parity groups, each including its own parity bit
const ENCODER_GROUP: u32 = 0b1000_0000_0000_1111;
const DECODER_GROUP: u32 = 0b1_0000_1111_1111_0000;
const SCAN_GROUP: u32 = 0b10_0111_0000_0000_0000;

/// Decoded tag fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TagFields {
    /// Transmitter identity
    pub encoder_id: u8,
    /// Momentary push-button bits
    pub buttons: u8,
    /// Addressed receiver identity
    pub decoder_id: u8,
    /// Addressed receiver sub-unit
    pub part_index: u8,
    /// Rotating multiplex selector (0..7)
    pub scan_index: u8,
}

impl TagFields {
    fn unpack(raw: u32) -> Self {
        Self {
            encoder_id: ((raw >> ENCODER_SHIFT) & 0x03) as u8,
            buttons: ((raw >> BUTTONS_SHIFT) & 0x03) as u8,
            decoder_id: ((raw >> DECODER_SHIFT) & 0x0f) as u8,
            part_index: ((raw >> PART_SHIFT) & 0x0f) as u8,
            scan_index: ((raw >> SCAN_SHIFT) & 0x07) as u8,
        }
    }
}

/// Decodes the bit protocol superimposed on a frame's pulse widths
pub struct TagDecoder {
    raw: u32,
    pulse_min: u32,
    pulse_max: u32,

    encoded: bool,
    trusted: bool,
    valid: bool,
    fields: TagFields,

    /// Paired transmitter; frames from any other encoder are untrusted
    paired: Option<u8>,
    /// This receiver's configured identity
    my_id: u8,

    band_min: u32,
    band_max: u32,
    step: u32,
    onoff_min: u32,
    onoff_step: u32,
    delta: u32,
}

impl TagDecoder {
    pub fn new(bounds: &TickBounds, decoder_id: u8, delta: u32) -> Self {
        Self {
            raw: 0,
            pulse_min: u32::MAX,
            pulse_max: 0,
            encoded: false,
            trusted: false,
            valid: false,
            fields: TagFields::default(),
            paired: None,
            my_id: decoder_id & 0x0f,
            band_min: bounds.tag_min,
            band_max: bounds.tag_max,
            step: bounds.tag_step,
            onoff_min: bounds.channel_min,
            onoff_step: bounds.onoff_step,
            delta,
        }
    }

    /// Clear the per-frame state; pairing survives
    pub fn reset(&mut self) {
        self.raw = 0;
        self.pulse_min = u32::MAX;
        self.pulse_max = 0;
        self.encoded = false;
        self.trusted = false;
        self.valid = false;
    }

    /// Fold one pulse into the tag word
    ///
    /// `pulse_index` is the zero-based position of the pulse in the frame.
    /// The word is finalized when the last expected pulse arrives; a frame
    /// with more pulses than the protocol carries can never hold a tag.
    pub fn update(&mut self, pulse_index: u8, pulse_width: u32) {
        let index = pulse_index as usize;

        if index >= TAG_PULSES {
            self.reset();
            return;
        }

        self.pulse_min = self.pulse_min.min(pulse_width);
        self.pulse_max = self.pulse_max.max(pulse_width);

        if pulse_width >= self.band_min && pulse_width <= self.band_max {
            let symbol = self.quantize(pulse_width);
            let shift = (index as u32) * 2;
            self.raw = (self.raw & !(0b11 << shift)) | (symbol << shift);
        } else {
            // one bad pulse invalidates the whole frame's tag
            self.raw = 0;
        }

        if index == TAG_PULSES - 1 {
            self.finalize();
        }
    }

    /// Map a pulse width inside the band onto a 2-bit symbol
    fn quantize(&self, width: u32) -> u32 {
        if width >= self.band_min + 3 * self.step {
            0b11
        } else if width >= self.band_min + 2 * self.step {
            0b10
        } else if width >= self.band_min + self.step {
            0b01
        } else {
            0b00
        }
    }

    fn finalize(&mut self) {
        self.raw &= TAG_MASK;

        self.encoded = !crate::signal::widths_close(self.pulse_min, self.pulse_max, self.delta)
            && !DEGENERATE_WORDS.contains(&self.raw);

        if !self.encoded {
            return;
        }

        self.fields = TagFields::unpack(self.raw);

        let parity_ok = odd_parity(self.raw & ENCODER_GROUP)
            && odd_parity(self.raw & DECODER_GROUP)
            && odd_parity(self.raw & SCAN_GROUP);

        self.trusted = parity_ok
            && self
                .paired
                .map_or(true, |encoder| encoder == self.fields.encoder_id);

        self.valid = self.trusted && self.fields.decoder_id == self.my_id;
    }

    /// Latch the current frame's encoder as the paired transmitter
    ///
    /// One-way: only [`TagDecoder::unpair`] (or rebuilding the decoder)
    /// releases the pairing. A no-op unless the current tag is valid.
    pub fn pair(&mut self) {
        if self.valid {
            self.paired = Some(self.fields.encoder_id);
        }
    }

    /// Release the pairing so any encoder is acceptable again
    pub fn unpair(&mut self) {
        self.paired = None;
    }

    pub fn is_encoded(&self) -> bool {
        self.encoded
    }

    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_paired(&self) -> bool {
        self.paired.is_some()
    }

    pub fn fields(&self) -> &TagFields {
        &self.fields
    }

    /// Demultiplex the scan-addressed channels of one raw frame
    ///
    /// Frame channels 4-6 each carry one of four logical extra channels
    /// selected by `scan % 4`; frame channel 7 carries one on/off nibble,
    /// addressed by byte `scan / 2` and nibble `scan % 2`. Over 4
    /// consecutive frames every extra channel is refreshed exactly once,
    /// over 8 every on/off bit.
    pub fn decode(
        &self,
        raw_channels: &[u16; MAX_CHANNELS],
        extra_channels: &mut [u16; EXTRA_CHANNELS],
        onoff_channels: &mut [u8; ONOFF_BYTES],
    ) {
        let scan = self.fields.scan_index as usize;

        for slot in 0..3 {
            extra_channels[(scan & 3) | (slot << 2)] = raw_channels[BASIC_CHANNELS + slot];
        }

        let nibble = self.quantize_onoff(raw_channels[ONOFF_CHANNEL_SLOT]);
        let byte = scan >> 1;
        let shift = (scan & 1) << 2;

        onoff_channels[byte] &= !(0x0f << shift);
        onoff_channels[byte] |= nibble << shift;
    }

    /// Map a channel width onto the 16-level on/off nibble
    fn quantize_onoff(&self, width: u16) -> u8 {
        let above = (width as u32).saturating_sub(self.onoff_min);
        (above / self.onoff_step).min(15) as u8
    }
}

/// True when the word has an odd number of set bits
fn odd_parity(word: u32) -> bool {
    word.count_ones() % 2 == 1
}

/// Pack tag fields into a raw word with correct parity bits
///
/// Test helper mirroring what a tagged transmitter emits.
#[cfg(test)]
pub(crate) fn encode_raw(fields: &TagFields) -> u32 {
    let mut raw = ((fields.encoder_id as u32 & 0x03) << ENCODER_SHIFT)
        | ((fields.buttons as u32 & 0x03) << BUTTONS_SHIFT)
        | ((fields.decoder_id as u32 & 0x0f) << DECODER_SHIFT)
        | ((fields.part_index as u32 & 0x0f) << PART_SHIFT)
        | ((fields.scan_index as u32 & 0x07) << SCAN_SHIFT);

    for (group, parity_bit) in [
        (ENCODER_GROUP, ENCODER_PARITY_BIT),
        (DECODER_GROUP, DECODER_PARITY_BIT),
        (SCAN_GROUP, SCAN_PARITY_BIT),
    ] {
        if !odd_parity(raw & group) {
            raw |= 1 << parity_bit;
        }
    }

    raw
}

/// Pulse widths (band centers) that encode a raw tag word
#[cfg(test)]
pub(crate) fn pulse_widths(raw: u32, bounds: &TickBounds) -> [u32; TAG_PULSES] {
    let mut widths = [0u32; TAG_PULSES];
    for (i, width) in widths.iter_mut().enumerate() {
        let symbol = (raw >> (i * 2)) & 0b11;
        *width = bounds.tag_min + symbol * bounds.tag_step + bounds.tag_step / 2;
    }
    widths
}
