//! Decoder configuration and derived tick thresholds
//!
//! All timing is configured in microseconds and converted once, at decoder
//! construction, into capture-timer ticks. Nothing here is runtime-mutable:
//! the derived [`TickBounds`] are computed by [`TickBounds::derive`] and then
//! owned by the decoder for its whole lifetime.

use core::fmt;

/// Result type for configuration validation
pub type Result<T> = core::result::Result<T, ConfigError>;

/// Number of basic (always-present, full-rate) channels in a frame
pub const BASIC_CHANNELS: usize = 4;

/// Number of multiplexed extra proportional channels
pub const EXTRA_CHANNELS: usize = 12;

/// Maximum raw channels in a single frame
pub const MAX_CHANNELS: usize = BASIC_CHANNELS + EXTRA_CHANNELS;

/// Number of multiplexed on/off channels (4 bits per frame, 8-frame cycle)
pub const ONOFF_CHANNELS: usize = 32;

/// On/off channels packed as bits
pub const ONOFF_BYTES: usize = ONOFF_CHANNELS / 8;

/// Configuration errors
///
/// Only construction can fail; the decode path itself never returns errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Tick scale is zero
    InvalidTickScale,
    /// A microsecond bound pair is inverted or the guard swallows a band
    InvalidBand,
    /// Pulse, gap and sync bands are not disjoint and ascending
    OverlappingBands,
    /// Channel count limits out of the supported range
    InvalidChannelRange,
    /// Output rescale range is empty
    InvalidOutputRange,
    /// Receiver identity does not fit the 4-bit tag field
    InvalidDecoderId,
    /// A derived channel width does not fit the 16-bit channel slot
    ChannelWidthOverflow,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidTickScale => write!(f, "tick scale must be non-zero"),
            ConfigError::InvalidBand => write!(f, "inverted or degenerate timing band"),
            ConfigError::OverlappingBands => write!(f, "pulse/gap/sync bands overlap"),
            ConfigError::InvalidChannelRange => write!(f, "channel count limits out of range"),
            ConfigError::InvalidOutputRange => write!(f, "output range is empty"),
            ConfigError::InvalidDecoderId => write!(f, "decoder id exceeds 4 bits"),
            ConfigError::ChannelWidthOverflow => write!(f, "channel width exceeds 16 bits"),
        }
    }
}

/// Capture-timer timing constants, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingConfig {
    /// Minimum full channel width (pulse + gap)
    pub channel_min_us: u32,
    /// Maximum full channel width
    pub channel_max_us: u32,
    /// Minimum pulse width
    pub pulse_min_us: u32,
    /// Maximum pulse width
    pub pulse_max_us: u32,
    /// Minimum sync separator width
    pub sync_min_us: u32,
    /// Guard margin applied around the pulse/gap/channel bands
    pub guard_us: u32,
    /// Capture timer ticks per microsecond
    pub ticks_per_us: u32,
    /// Free-running counter top (wraparound modulus)
    pub timer_max: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            channel_min_us: 976,
            channel_max_us: 2000,
            pulse_min_us: 300,
            pulse_max_us: 460,
            sync_min_us: 2500,
            guard_us: 25,
            ticks_per_us: 1,
            timer_max: 0xffff,
        }
    }
}

/// Full decoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecoderConfig {
    /// Signal timing constants
    pub timing: TimingConfig,
    /// Minimum channels per frame for a frame to be structurally valid
    pub min_channels: u8,
    /// Maximum channels per frame
    pub max_channels: u8,
    /// Consecutive good frames required before entering capture
    pub good_frames: u8,
    /// Consecutive bad frames tolerated in capture before fail-safe engages
    pub hold_frames: u8,
    /// This receiver's identity in the superimposed tag (4 bits)
    pub decoder_id: u8,
    /// Closeness tolerance for signature equality, in ticks (0 = exact)
    pub signature_delta: u32,
    /// Lower end of the reader's rescaled output range
    pub output_min: u16,
    /// Upper end of the reader's rescaled output range
    pub output_max: u16,
    /// Servo value all channels report before the first capture, in µs
    pub default_servo_us: u32,
    /// On/off value all switch channels report before the first capture
    pub default_onoff: bool,
    /// Decode the superimposed tag protocol; `false` selects plain PPM-Sum
    pub tag_enabled: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            min_channels: BASIC_CHANNELS as u8,
            max_channels: MAX_CHANNELS as u8,
            good_frames: 10,
            hold_frames: 25,
            decoder_id: 0,
            signature_delta: 0,
            output_min: 0,
            output_max: 255,
            default_servo_us: 1500,
            default_onoff: false,
            tag_enabled: true,
        }
    }
}

/// Timing thresholds in capture-timer ticks, derived once from a
/// [`DecoderConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickBounds {
    pub pulse_min: u32,
    pub pulse_max: u32,
    pub gap_min: u32,
    pub gap_max: u32,
    pub channel_min: u32,
    pub channel_max: u32,
    pub sync_min: u32,
    pub sync_max: u32,
    /// Tag quantization band (raw pulse bounds, no guard)
    pub tag_min: u32,
    pub tag_max: u32,
    /// Tag quantization step (band span / 4)
    pub tag_step: u32,
    /// On/off nibble quantization step ((channel span) / 16)
    pub onoff_step: u32,
    /// Wraparound modulus of the capture counter
    pub timer_max: u32,
}

impl TickBounds {
    /// Derive and validate all tick thresholds from the configuration
    pub fn derive(config: &DecoderConfig) -> Result<Self> {
        let t = &config.timing;

        if t.ticks_per_us == 0 {
            return Err(ConfigError::InvalidTickScale);
        }
        if t.pulse_min_us > t.pulse_max_us
            || t.channel_min_us > t.channel_max_us
            || t.pulse_min_us <= t.guard_us
            || t.channel_min_us <= t.pulse_max_us + t.guard_us
        {
            return Err(ConfigError::InvalidBand);
        }

        let to_ticks = |us: u32| us * t.ticks_per_us;

        let bounds = Self {
            pulse_min: to_ticks(t.pulse_min_us - t.guard_us),
            pulse_max: to_ticks(t.pulse_max_us + t.guard_us),
            gap_min: to_ticks(t.channel_min_us - t.pulse_max_us - t.guard_us),
            gap_max: to_ticks(t.channel_max_us - t.pulse_min_us + t.guard_us),
            channel_min: to_ticks(t.channel_min_us - t.guard_us),
            channel_max: to_ticks(t.channel_max_us + t.guard_us),
            sync_min: to_ticks(t.sync_min_us),
            sync_max: to_ticks(
                (t.channel_max_us + t.guard_us) * config.max_channels as u32 + t.sync_min_us,
            ),
            tag_min: to_ticks(t.pulse_min_us),
            tag_max: to_ticks(t.pulse_max_us),
            tag_step: to_ticks(t.pulse_max_us - t.pulse_min_us) / 4,
            onoff_step: to_ticks(t.channel_max_us - t.channel_min_us) / 16,
            timer_max: t.timer_max,
        };

        if bounds.pulse_max >= bounds.gap_min || bounds.gap_max >= bounds.sync_min {
            return Err(ConfigError::OverlappingBands);
        }
        if bounds.tag_step == 0 || bounds.onoff_step == 0 {
            return Err(ConfigError::InvalidBand);
        }
        if config.min_channels < BASIC_CHANNELS as u8
            || config.max_channels as usize > MAX_CHANNELS
            || config.min_channels > config.max_channels
        {
            return Err(ConfigError::InvalidChannelRange);
        }
        if config.output_min >= config.output_max {
            return Err(ConfigError::InvalidOutputRange);
        }
        if config.decoder_id > 0x0f {
            return Err(ConfigError::InvalidDecoderId);
        }
        if bounds.channel_max > u16::MAX as u32 {
            return Err(ConfigError::ChannelWidthOverflow);
        }

        Ok(bounds)
    }
}

impl DecoderConfig {
    /// Power-on servo value in capture-timer ticks
    pub(crate) fn default_servo_ticks(&self) -> u16 {
        (self.default_servo_us * self.timing.ticks_per_us).min(u16::MAX as u32) as u16
    }
}
