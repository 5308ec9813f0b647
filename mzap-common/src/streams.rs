//! Stream types and the policy classifications derived from them

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Global playback stream types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamType {
    VoiceCall,
    System,
    Ring,
    Music,
    Alarm,
    Notification,
    BluetoothSco,
    EnforcedAudible,
    Dtmf,
    Tts,
}

impl StreamType {
    pub const COUNT: usize = 10;

    pub const ALL: [StreamType; StreamType::COUNT] = [
        StreamType::VoiceCall,
        StreamType::System,
        StreamType::Ring,
        StreamType::Music,
        StreamType::Alarm,
        StreamType::Notification,
        StreamType::BluetoothSco,
        StreamType::EnforcedAudible,
        StreamType::Dtmf,
        StreamType::Tts,
    ];

    /// Slot of this stream in per-stream tables
    pub fn index(self) -> usize {
        self as usize
    }

    /// Routing strategy the stream belongs to
    pub fn strategy(self) -> RoutingStrategy {
        match self {
            StreamType::VoiceCall | StreamType::BluetoothSco => RoutingStrategy::Phone,
            StreamType::Ring | StreamType::Alarm => RoutingStrategy::Sonification,
            StreamType::Notification => RoutingStrategy::SonificationRespectful,
            StreamType::Dtmf => RoutingStrategy::Dtmf,
            StreamType::EnforcedAudible => RoutingStrategy::EnforcedAudible,
            StreamType::System | StreamType::Tts | StreamType::Music => RoutingStrategy::Media,
        }
    }

    /// Streams that are muted rather than replaced by a tone during a call
    pub fn is_low_visibility(self) -> bool {
        matches!(
            self,
            StreamType::System | StreamType::Notification | StreamType::Dtmf
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            StreamType::VoiceCall => "VOICE_CALL",
            StreamType::System => "SYSTEM",
            StreamType::Ring => "RING",
            StreamType::Music => "MUSIC",
            StreamType::Alarm => "ALARM",
            StreamType::Notification => "NOTIFICATION",
            StreamType::BluetoothSco => "BLUETOOTH_SCO",
            StreamType::EnforcedAudible => "ENFORCED_AUDIBLE",
            StreamType::Dtmf => "DTMF",
            StreamType::Tts => "TTS",
        }
    }
}

/// Fixed-size table holding one value per stream type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerStream<T>([T; StreamType::COUNT]);

impl<T: Copy> PerStream<T> {
    pub fn filled(value: T) -> Self {
        PerStream([value; StreamType::COUNT])
    }
}

impl<T> PerStream<T> {
    pub fn iter(&self) -> impl Iterator<Item = (StreamType, &T)> {
        StreamType::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T: Copy + Default> Default for PerStream<T> {
    fn default() -> Self {
        PerStream([T::default(); StreamType::COUNT])
    }
}

impl<T> Index<StreamType> for PerStream<T> {
    type Output = T;

    fn index(&self, stream: StreamType) -> &T {
        &self.0[stream.index()]
    }
}

impl<T> IndexMut<StreamType> for PerStream<T> {
    fn index_mut(&mut self, stream: StreamType) -> &mut T {
        &mut self.0[stream.index()]
    }
}

/// Policy classification of stream types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    Media,
    Phone,
    Sonification,
    SonificationRespectful,
    Dtmf,
    EnforcedAudible,
}

impl RoutingStrategy {
    pub fn is_sonification(self) -> bool {
        matches!(
            self,
            RoutingStrategy::Sonification | RoutingStrategy::SonificationRespectful
        )
    }
}

/// Volume-curve classification of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    Headset,
    Speaker,
    Earpiece,
}

/// Telephony state of the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneState {
    #[default]
    Normal,
    Ringtone,
    InCall,
    InCommunication,
}

impl PhoneState {
    pub fn is_in_call(self) -> bool {
        matches!(self, PhoneState::InCall | PhoneState::InCommunication)
    }
}

/// Usages whose routing can be forced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceUse {
    Communication,
    Media,
    Record,
    Dock,
    System,
}

impl ForceUse {
    pub const COUNT: usize = 5;

    pub const ALL: [ForceUse; ForceUse::COUNT] = [
        ForceUse::Communication,
        ForceUse::Media,
        ForceUse::Record,
        ForceUse::Dock,
        ForceUse::System,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether `config` is meaningful for this usage
    pub fn accepts(self, config: ForcedConfig) -> bool {
        use ForcedConfig::*;
        match self {
            ForceUse::Communication => matches!(config, None | Speaker | BtSco),
            ForceUse::Media => matches!(
                config,
                None | Headphones | BtA2dp | WiredAccessory | AnalogDock | DigitalDock | NoBtA2dp
            ),
            ForceUse::Record => matches!(config, None | BtSco | WiredAccessory),
            ForceUse::Dock => matches!(
                config,
                None | BtCarDock | BtDeskDock | WiredAccessory | AnalogDock | DigitalDock
            ),
            ForceUse::System => matches!(config, None | SystemEnforced),
        }
    }
}

/// Forced routing configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedConfig {
    #[default]
    None,
    Speaker,
    Headphones,
    BtSco,
    BtA2dp,
    WiredAccessory,
    BtCarDock,
    BtDeskDock,
    AnalogDock,
    DigitalDock,
    NoBtA2dp,
    SystemEnforced,
}

/// Capture sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    #[default]
    Default,
    Mic,
    VoiceUplink,
    VoiceDownlink,
    VoiceCall,
    Camcorder,
    VoiceRecognition,
    VoiceCommunication,
    RemoteSubmix,
    AuxiliaryInput,
}

impl InputSource {
    /// Numeric value sent in the `input_source` HAL parameter
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Tones the mixer can generate on request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneType {
    CallWaiting,
}
