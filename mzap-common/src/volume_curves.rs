//! Volume curves
//!
//! Each curve is a 4-point piecewise-linear table mapping a 0-100 volume
//! step onto a dB attenuation. A stream picks one curve per device
//! category; see [`VolumeCurve::for_stream`].
//!
//! **Conversion:**
//! - UI index in `[index_min, index_max]` is rescaled onto the curve's step range
//! - Steps below the first point are silent, steps above the last are full scale
//! - dB is linearly interpolated inside the segment, then converted with
//!   `amplitude = exp(dB × ln(10) / 20)`

use crate::streams::{DeviceCategory, StreamType};
use serde::{Deserialize, Serialize};
use std::f32::consts::LN_10;

/// One control point of a volume curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    /// Step on the 0-100 scale
    pub index: i32,
    /// Attenuation at this step
    pub db: f32,
}

const fn point(index: i32, db: f32) -> CurvePoint {
    CurvePoint { index, db }
}

/// Volume curve tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeCurve {
    Default,
    DefaultMedia,
    SpeakerMedia,
    SpeakerSonification,
    DefaultSystem,
    HeadsetSystem,
    DefaultVoice,
    SpeakerVoice,
}

const DEFAULT: [CurvePoint; 4] = [point(1, -49.5), point(33, -33.5), point(66, -17.0), point(100, 0.0)];
const DEFAULT_MEDIA: [CurvePoint; 4] = [point(1, -58.0), point(20, -40.0), point(60, -17.0), point(100, 0.0)];
const SPEAKER_MEDIA: [CurvePoint; 4] = [point(1, -56.0), point(20, -34.0), point(60, -11.0), point(100, 0.0)];
const SPEAKER_SONIFICATION: [CurvePoint; 4] = [point(1, -29.7), point(33, -20.1), point(66, -10.2), point(100, 0.0)];
const DEFAULT_SYSTEM: [CurvePoint; 4] = [point(1, -24.0), point(33, -18.0), point(66, -12.0), point(100, -6.0)];
const HEADSET_SYSTEM: [CurvePoint; 4] = [point(1, -30.0), point(33, -26.0), point(66, -22.0), point(100, -18.0)];
const DEFAULT_VOICE: [CurvePoint; 4] = [point(0, -42.0), point(33, -28.0), point(66, -14.0), point(100, 0.0)];
const SPEAKER_VOICE: [CurvePoint; 4] = [point(0, -24.0), point(33, -16.0), point(66, -8.0), point(100, 0.0)];

impl VolumeCurve {
    pub fn points(&self) -> &'static [CurvePoint; 4] {
        match self {
            VolumeCurve::Default => &DEFAULT,
            VolumeCurve::DefaultMedia => &DEFAULT_MEDIA,
            VolumeCurve::SpeakerMedia => &SPEAKER_MEDIA,
            VolumeCurve::SpeakerSonification => &SPEAKER_SONIFICATION,
            VolumeCurve::DefaultSystem => &DEFAULT_SYSTEM,
            VolumeCurve::HeadsetSystem => &HEADSET_SYSTEM,
            VolumeCurve::DefaultVoice => &DEFAULT_VOICE,
            VolumeCurve::SpeakerVoice => &SPEAKER_VOICE,
        }
    }

    /// Curve used for `stream` on a device of `category`
    pub fn for_stream(stream: StreamType, category: DeviceCategory) -> VolumeCurve {
        // [headset, speaker, earpiece]
        let profile = match stream {
            StreamType::VoiceCall | StreamType::BluetoothSco => [
                VolumeCurve::DefaultVoice,
                VolumeCurve::SpeakerVoice,
                VolumeCurve::DefaultVoice,
            ],
            StreamType::System | StreamType::EnforcedAudible | StreamType::Dtmf => [
                VolumeCurve::HeadsetSystem,
                VolumeCurve::DefaultSystem,
                VolumeCurve::DefaultSystem,
            ],
            StreamType::Ring | StreamType::Alarm | StreamType::Notification => [
                VolumeCurve::Default,
                VolumeCurve::SpeakerSonification,
                VolumeCurve::Default,
            ],
            StreamType::Music | StreamType::Tts => [
                VolumeCurve::DefaultMedia,
                VolumeCurve::SpeakerMedia,
                VolumeCurve::DefaultMedia,
            ],
        };
        match category {
            DeviceCategory::Headset => profile[0],
            DeviceCategory::Speaker => profile[1],
            DeviceCategory::Earpiece => profile[2],
        }
    }

    /// Convert a UI volume index into a linear amplitude
    ///
    /// # Arguments
    /// * `index` - UI index, normally within `[index_min, index_max]`
    /// * `index_min`, `index_max` - the stream's configured index range
    ///
    /// # Returns
    /// Amplitude multiplier (0.0 = silence, 1.0 = full scale)
    pub fn amplitude(&self, index: i32, index_min: i32, index_max: i32) -> f32 {
        if index_max <= index_min {
            return 0.0;
        }
        let curve = self.points();
        let nb_steps = 1 + curve[3].index - curve[0].index;
        let vol_idx = (i64::from(nb_steps) * (i64::from(index) - i64::from(index_min))
            / (i64::from(index_max) - i64::from(index_min)))
            .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;

        if vol_idx < curve[0].index {
            return 0.0;
        }
        let segment = if vol_idx < curve[1].index {
            0
        } else if vol_idx < curve[2].index {
            1
        } else if vol_idx <= curve[3].index {
            2
        } else {
            return 1.0;
        };

        let from = curve[segment];
        let to = curve[segment + 1];
        let db = (to.db - from.db) * (vol_idx - from.index) as f32 / (to.index - from.index) as f32
            + from.db;
        db_to_amplitude(db)
    }
}

/// Convert a dB attenuation into a linear amplitude
pub fn db_to_amplitude(db: f32) -> f32 {
    (db * LN_10 / 20.0).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORIES: [DeviceCategory; 3] = [
        DeviceCategory::Headset,
        DeviceCategory::Speaker,
        DeviceCategory::Earpiece,
    ];

    #[test]
    fn test_db_conversion() {
        assert!((db_to_amplitude(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_amplitude(-20.0) - 0.1).abs() < 1e-5);
        assert!((db_to_amplitude(-6.0) - 0.501).abs() < 1e-3);
    }

    #[test]
    fn test_full_index_reaches_top_of_curve() {
        // Media curves end at 0 dB
        let ampl = VolumeCurve::SpeakerMedia.amplitude(15, 0, 15);
        assert!((ampl - 1.0).abs() < 1e-6);

        // System curve tops out at -6 dB
        let ampl = VolumeCurve::DefaultSystem.amplitude(7, 0, 7);
        assert!((ampl - db_to_amplitude(-6.0)).abs() < 1e-6);
    }

    #[test]
    fn test_minimum_index_is_silent_for_media() {
        assert_eq!(VolumeCurve::DefaultMedia.amplitude(0, 0, 15), 0.0);
    }

    #[test]
    fn test_voice_curve_is_audible_at_minimum() {
        // Voice curves start at step 0 so the lowest index still plays
        let ampl = VolumeCurve::DefaultVoice.amplitude(1, 1, 5);
        assert!((ampl - db_to_amplitude(-42.0)).abs() < 1e-6);
    }

    #[test]
    fn test_interpolates_inside_segment() {
        // Step 50 of 100 lies in the middle segment of the default curve
        let ampl = VolumeCurve::Default.amplitude(50, 0, 100);
        let expected_db = (-17.0 - -33.5) * (50 - 33) as f32 / (66 - 33) as f32 + -33.5;
        assert!((ampl - db_to_amplitude(expected_db)).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_index() {
        assert_eq!(VolumeCurve::Default.amplitude(-3, 0, 10), 0.0);
        assert_eq!(VolumeCurve::Default.amplitude(40, 0, 10), 1.0);
        assert_eq!(VolumeCurve::Default.amplitude(5, 5, 5), 0.0);
    }

    #[test]
    fn test_full_width_index_range() {
        let top = VolumeCurve::SpeakerMedia.amplitude(i32::MAX, 0, i32::MAX);
        assert!((top - 1.0).abs() < 1e-6);
        assert_eq!(VolumeCurve::SpeakerMedia.amplitude(0, 0, i32::MAX), 0.0);

        let middle = VolumeCurve::Default.amplitude(i32::MAX / 2, 0, i32::MAX);
        assert!(middle > 0.0 && middle < 1.0);
    }

    #[test]
    fn test_monotonic_for_every_stream_and_category() {
        for stream in StreamType::ALL {
            for category in CATEGORIES {
                let curve = VolumeCurve::for_stream(stream, category);
                let mut previous = 0.0;
                for index in 0..=15 {
                    let ampl = curve.amplitude(index, 0, 15);
                    assert!(
                        ampl >= previous,
                        "{:?}/{:?} dropped at index {}",
                        stream,
                        category,
                        index
                    );
                    previous = ampl;
                }
            }
        }
    }

    #[test]
    fn test_curve_profiles() {
        assert_eq!(
            VolumeCurve::for_stream(StreamType::Ring, DeviceCategory::Speaker),
            VolumeCurve::SpeakerSonification
        );
        assert_eq!(
            VolumeCurve::for_stream(StreamType::BluetoothSco, DeviceCategory::Earpiece),
            VolumeCurve::DefaultVoice
        );
        assert_eq!(
            VolumeCurve::for_stream(StreamType::Dtmf, DeviceCategory::Headset),
            VolumeCurve::HeadsetSystem
        );
        assert_eq!(
            VolumeCurve::for_stream(StreamType::Tts, DeviceCategory::Speaker),
            VolumeCurve::SpeakerMedia
        );
    }
}
