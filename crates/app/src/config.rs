use std::fs;
use std::path::Path;

use brf_sdr::channel::ChannelConfig;
use brf_sdr::scan::ScanRange;
use brf_sdr::stream::StreamConfig;
use serde::{Deserialize, Serialize};

/// Radio settings loaded from `--profile <file.json>`.
/// Missing sections keep the built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub rx: ChannelConfig,
    pub tx: ChannelConfig,
    pub stream: StreamConfig,
    pub scan: ScanProfile,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            rx: ChannelConfig::default_rx(),
            tx: ChannelConfig::default_tx(),
            stream: StreamConfig::default(),
            scan: ScanProfile::default(),
        }
    }
}

/// Channel setup applied before a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanProfile {
    pub range: ScanRange,
    pub sample_rate: u32,
    pub bandwidth: u32,
}

impl Default for ScanProfile {
    fn default() -> Self {
        Self {
            range: ScanRange::default(),
            sample_rate: 12_000_000,
            bandwidth: 5_000_000,
        }
    }
}

pub fn load(path: &Path) -> Result<Profile, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse(&text).map_err(|e| format!("{}: {}", path.display(), e))
}

pub fn parse(text: &str) -> Result<Profile, String> {
    let profile: Profile = serde_json::from_str(text).map_err(|e| format!("invalid profile: {}", e))?;

    if profile.rx.channel.direction != brf_sdr::Direction::Rx {
        return Err("rx.channel must be an RX channel".to_string());
    }
    if profile.tx.channel.direction != brf_sdr::Direction::Tx {
        return Err("tx.channel must be a TX channel".to_string());
    }
    if !profile.stream.is_aligned() {
        // Left for the transfer engine to reject, so the failure carries its status
        log::warn!(
            "stream.buffer_size {} is not a multiple of {}",
            profile.stream.buffer_size,
            brf_sdr::stream::BUFFER_ALIGNMENT
        );
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use brf_sdr::{Channel, Format};

    #[test]
    fn test_empty_profile_is_default() {
        assert_eq!(parse("{}").unwrap(), Profile::default());
    }

    #[test]
    fn test_partial_profile() {
        let text = r#"{
            "rx": {
                "channel": { "direction": "rx", "index": 1 },
                "frequency": 433920000,
                "bandwidth": 1000000,
                "sample_rate": 2000000,
                "gain": 20
            },
            "stream": { "buffer_size": 4096, "format": "sc16_q11_meta" }
        }"#;
        let profile = parse(text).unwrap();

        assert_eq!(profile.rx.channel, Channel::rx(1));
        assert_eq!(profile.rx.frequency, 433_920_000);
        assert_eq!(profile.tx, ChannelConfig::default_tx());
        assert_eq!(profile.stream.buffer_size, 4096);
        assert_eq!(profile.stream.num_buffers, 16);
        assert_eq!(profile.stream.format, Format::Sc16Q11Meta);
        assert_eq!(profile.scan.sample_rate, 12_000_000);
    }

    #[test]
    fn test_wrong_direction_rejected() {
        let text = r#"{
            "tx": {
                "channel": { "direction": "rx" },
                "frequency": 918000000,
                "bandwidth": 1500000,
                "sample_rate": 250000,
                "gain": -14
            }
        }"#;
        assert!(parse(text).unwrap_err().contains("TX channel"));
    }

    #[test]
    fn test_misaligned_buffer_is_not_rounded() {
        let profile = parse(r#"{ "stream": { "buffer_size": 1000 } }"#).unwrap();
        assert_eq!(profile.stream.buffer_size, 1000);
    }

    #[test]
    fn test_malformed_json() {
        assert!(parse("{ not json").is_err());
    }
}
