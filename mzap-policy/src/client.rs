//! Audio HAL client interface
//!
//! The policy never touches hardware itself. Every port operation, volume
//! push and parameter string goes through an [`AudioPolicyClient`]; the
//! policy only decides *what* to ask for.
//!
//! Failures are reported as `None` from the open calls. The policy treats
//! a `None` exactly like an unavailable port and moves on to the next
//! candidate.

use mzap_common::{
    AudioFormat, ChannelMask, InputChannelMask, InputDevices, IoHandle, ModuleHandle,
    OutputDevices, OutputFlags, SessionId, StreamType, ToneType,
};

/// Requested (in) and actual (out) configuration of an output port
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputConfig {
    pub devices: OutputDevices,
    /// 0 lets the port pick
    pub sampling_rate: u32,
    pub format: AudioFormat,
    pub channel_mask: ChannelMask,
    pub latency_ms: u32,
}

/// Requested (in) and actual (out) configuration of an input port
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputConfig {
    pub device: InputDevices,
    pub sampling_rate: u32,
    pub format: AudioFormat,
    pub channel_mask: InputChannelMask,
}

/// Services the policy requires from the audio HAL
pub trait AudioPolicyClient {
    fn load_hw_module(&mut self, name: &str) -> Option<ModuleHandle>;

    /// Open an output port on `module`
    ///
    /// The client may rewrite `config` with the values the port actually uses.
    fn open_output(
        &mut self,
        module: ModuleHandle,
        config: &mut OutputConfig,
        flags: OutputFlags,
    ) -> Option<IoHandle>;

    /// Open a duplicating output mirroring its mix onto `outputs`
    fn open_duplicate_output(&mut self, outputs: &[IoHandle]) -> Option<IoHandle>;

    fn close_output(&mut self, output: IoHandle);

    fn suspend_output(&mut self, output: IoHandle);

    fn restore_output(&mut self, output: IoHandle);

    fn open_input(&mut self, module: ModuleHandle, config: &mut InputConfig) -> Option<IoHandle>;

    fn close_input(&mut self, input: IoHandle);

    /// Send a `key=value;...` parameter string to a port
    fn set_parameters(&mut self, io: IoHandle, params: &str, delay_ms: u32);

    /// Query `keys` from a port; the reply is a `key=value;...` string
    fn get_parameters(&mut self, io: IoHandle, keys: &str) -> String;

    fn set_stream_volume(&mut self, stream: StreamType, volume: f32, output: IoHandle, delay_ms: u32);

    fn set_voice_volume(&mut self, volume: f32, delay_ms: u32);

    /// Per-child gain of a duplicating output
    fn set_duplicating_volume(&mut self, duplicating: IoHandle, output: IoHandle, volume: f32);

    /// Per-session gain applied on `output`
    fn set_zone_volume(&mut self, output: IoHandle, session: SessionId, volume: f32);

    /// Move every track of `stream` onto `output`
    fn set_stream_output(&mut self, stream: StreamType, output: IoHandle);

    fn start_tone(&mut self, tone: ToneType, stream: StreamType);

    fn stop_tone(&mut self);
}
