//! Sample formats, channel layouts, output flags and I/O handles

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sample encodings
///
/// `Default` means "unspecified": a request with `Default` accepts any
/// format the profile offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AudioFormat {
    #[default]
    Default,
    Pcm16Bit,
    Pcm8Bit,
    Pcm32Bit,
    Pcm8_24Bit,
    PcmFloat,
    Mp3,
    Aac,
    Ac3,
    Eac3,
}

impl AudioFormat {
    pub fn is_linear_pcm(self) -> bool {
        matches!(
            self,
            AudioFormat::Pcm16Bit
                | AudioFormat::Pcm8Bit
                | AudioFormat::Pcm32Bit
                | AudioFormat::Pcm8_24Bit
                | AudioFormat::PcmFloat
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            AudioFormat::Default => "DEFAULT",
            AudioFormat::Pcm16Bit => "PCM_16_BIT",
            AudioFormat::Pcm8Bit => "PCM_8_BIT",
            AudioFormat::Pcm32Bit => "PCM_32_BIT",
            AudioFormat::Pcm8_24Bit => "PCM_8_24_BIT",
            AudioFormat::PcmFloat => "PCM_FLOAT",
            AudioFormat::Mp3 => "MP3",
            AudioFormat::Aac => "AAC",
            AudioFormat::Ac3 => "AC3",
            AudioFormat::Eac3 => "EAC3",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches("AUDIO_FORMAT_");
        [
            AudioFormat::Default,
            AudioFormat::Pcm16Bit,
            AudioFormat::Pcm8Bit,
            AudioFormat::Pcm32Bit,
            AudioFormat::Pcm8_24Bit,
            AudioFormat::PcmFloat,
            AudioFormat::Mp3,
            AudioFormat::Aac,
            AudioFormat::Ac3,
            AudioFormat::Eac3,
        ]
        .into_iter()
        .find(|format| format.name() == name)
        .ok_or_else(|| format!("unknown audio format '{}'", s))
    }
}

impl TryFrom<String> for AudioFormat {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AudioFormat> for String {
    fn from(format: AudioFormat) -> Self {
        format.name().to_string()
    }
}

bitflags! {
    /// Output channel positions
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ChannelMask: u32 {
        const FRONT_LEFT = 0x1;
        const FRONT_RIGHT = 0x2;
        const FRONT_CENTER = 0x4;
        const LOW_FREQUENCY = 0x8;
        const BACK_LEFT = 0x10;
        const BACK_RIGHT = 0x20;
        const SIDE_LEFT = 0x40;
        const SIDE_RIGHT = 0x80;
    }
}

impl ChannelMask {
    pub const MONO: Self = Self::FRONT_LEFT;
    pub const STEREO: Self = Self::FRONT_LEFT.union(Self::FRONT_RIGHT);
    pub const QUAD: Self = Self::STEREO.union(Self::BACK_LEFT).union(Self::BACK_RIGHT);
    pub const SURROUND_5_1: Self = Self::QUAD
        .union(Self::FRONT_CENTER)
        .union(Self::LOW_FREQUENCY);
    pub const SURROUND_7_1: Self = Self::SURROUND_5_1
        .union(Self::SIDE_LEFT)
        .union(Self::SIDE_RIGHT);

    pub fn channel_count(self) -> u32 {
        self.bits().count_ones()
    }

    /// Parse a layout name as reported by an output port
    pub fn from_layout_name(name: &str) -> Option<Self> {
        match name.trim().trim_start_matches("AUDIO_CHANNEL_OUT_") {
            "MONO" => Some(Self::MONO),
            "STEREO" => Some(Self::STEREO),
            "QUAD" => Some(Self::QUAD),
            "5POINT1" => Some(Self::SURROUND_5_1),
            "7POINT1" => Some(Self::SURROUND_7_1),
            _ => None,
        }
    }
}

bitflags! {
    /// Input channel positions
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct InputChannelMask: u32 {
        const LEFT = 0x4;
        const RIGHT = 0x8;
        const FRONT = 0x10;
        const BACK = 0x20;
        const VOICE_UPLINK = 0x4000;
        const VOICE_DNLINK = 0x8000;
    }
}

impl InputChannelMask {
    pub const MONO: Self = Self::FRONT;
    pub const STEREO: Self = Self::LEFT.union(Self::RIGHT);
}

bitflags! {
    /// Output port flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct OutputFlags: u32 {
        /// Exact client format, single client, no software mixing
        const DIRECT = 0x1;
        /// The platform's main output
        const PRIMARY = 0x2;
        const FAST = 0x4;
        const DEEP_BUFFER = 0x8;
    }
}

/// Handle of an opened output or input port
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IoHandle(pub u32);

impl fmt::Display for IoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of a loaded hardware module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleHandle(pub u32);

/// Audio session identifier
///
/// Session 0 is the query session: it may be routed but never receives
/// per-session zone volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u32);

impl SessionId {
    pub const QUERY: SessionId = SessionId(0);
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
