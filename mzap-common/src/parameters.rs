//! HAL parameter strings
//!
//! Parameters travel as `key=value` pairs joined by `;`. Capability
//! replies list alternatives separated by `|`
//! (e.g. `sup_sampling_rates=44100|48000`).

use std::fmt;
use std::str::FromStr;

pub const KEY_ROUTING: &str = "routing";
pub const KEY_INPUT_SOURCE: &str = "input_source";
pub const KEY_CLOSING: &str = "closing";
pub const KEY_CALL_ROUTING: &str = "call_routing";
pub const KEY_A2DP_SINK_ADDRESS: &str = "a2dp_sink_address";
pub const KEY_SUP_SAMPLING_RATES: &str = "sup_sampling_rates";
pub const KEY_SUP_FORMATS: &str = "sup_formats";
pub const KEY_SUP_CHANNELS: &str = "sup_channels";

/// Ordered set of `key=value` parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioParameter {
    pairs: Vec<(String, String)>,
}

impl AudioParameter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`AudioParameter::add`]
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.add(key, value);
        self
    }

    /// Set `key`, replacing any earlier value
    pub fn add(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// Split a capability reply value into its alternatives
    pub fn alternatives(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .map(|v| v.split('|').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for AudioParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, (key, value)) in self.pairs.iter().enumerate() {
            if position > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

impl FromStr for AudioParameter {
    type Err = std::convert::Infallible;

    /// Malformed fragments without `=` are ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut param = AudioParameter::new();
        for fragment in s.split(';') {
            if let Some((key, value)) = fragment.split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    param.add(key, value.trim());
                }
            }
        }
        Ok(param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_joins_pairs_in_insertion_order() {
        let param = AudioParameter::new()
            .with(KEY_ROUTING, 2)
            .with(KEY_INPUT_SOURCE, 1);
        assert_eq!(param.to_string(), "routing=2;input_source=1");
    }

    #[test]
    fn test_add_replaces_existing_key() {
        let mut param = AudioParameter::new().with(KEY_CLOSING, false);
        param.add(KEY_CLOSING, true);
        assert_eq!(param.to_string(), "closing=true");
    }

    #[test]
    fn test_parse_reply_with_alternatives() {
        let reply: AudioParameter = "sup_sampling_rates=44100|48000; sup_formats=PCM_16_BIT;junk"
            .parse()
            .unwrap();
        assert_eq!(reply.alternatives(KEY_SUP_SAMPLING_RATES), vec!["44100", "48000"]);
        assert_eq!(reply.get(KEY_SUP_FORMATS), Some("PCM_16_BIT"));
        assert!(reply.alternatives(KEY_SUP_CHANNELS).is_empty());
    }

    #[test]
    fn test_get_int() {
        let reply: AudioParameter = "card=1;device=x".parse().unwrap();
        assert_eq!(reply.get_int("card"), Some(1));
        assert_eq!(reply.get_int("device"), None);
    }
}
