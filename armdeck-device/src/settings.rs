//! Tunable delays, timeouts and protocol constants
//!
//! Every field has a serde default, so a config file only needs the values it
//! changes.

use std::time::Duration;

use armdeck_transport::protocol::{button, cmd, timing as wire_timing};
use armdeck_transport::ExchangeTiming;
use serde::{Deserialize, Serialize};

use crate::stage::StagePolicy;

/// All settings of the device layer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckSettings {
    pub timing: Timing,
    pub protocol: ProtocolSettings,
}

/// Delays and timeouts, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Write to first read
    pub processing_delay_ms: u64,
    /// Before the re-read after an empty read
    pub retry_delay_ms: u64,
    /// Minimum gap between a disconnect and the next connect
    pub reconnect_cooldown_ms: u64,
    /// Idle wait after the link comes up, before service discovery
    pub stabilization_ms: u64,
    pub connect_timeout_ms: u64,
    pub discovery_timeout_ms: u64,
    /// Extra discovery attempts after a timeout
    pub discovery_retries: u32,
    pub endpoint_timeout_ms: u64,
    /// Pause between endpoint acquisition and the communication test
    pub settle_delay_ms: u64,
    pub communication_timeout_ms: u64,
    /// Gap between GET_BUTTON requests during a bulk load
    pub slot_load_gap_ms: u64,
    /// Gap between SET_BUTTON requests during save-all
    pub slot_save_gap_ms: u64,
    /// Inactivity before an edited slot is saved
    pub save_debounce_ms: u64,
    /// Gap between keymap chunks
    pub keymap_chunk_gap_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            processing_delay_ms: wire_timing::PROCESSING_DELAY_MS,
            retry_delay_ms: wire_timing::EMPTY_READ_RETRY_DELAY_MS,
            reconnect_cooldown_ms: 3000,
            stabilization_ms: 2000,
            connect_timeout_ms: 10_000,
            discovery_timeout_ms: 5000,
            discovery_retries: 2,
            endpoint_timeout_ms: 5000,
            settle_delay_ms: 1000,
            communication_timeout_ms: 5000,
            slot_load_gap_ms: 50,
            slot_save_gap_ms: 100,
            save_debounce_ms: 1500,
            keymap_chunk_gap_ms: wire_timing::KEYMAP_CHUNK_DELAY_MS,
        }
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

impl Timing {
    pub fn exchange(&self) -> ExchangeTiming {
        ExchangeTiming {
            processing_delay: ms(self.processing_delay_ms),
            retry_delay: ms(self.retry_delay_ms),
        }
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        ms(self.reconnect_cooldown_ms)
    }

    pub fn stabilization(&self) -> Duration {
        ms(self.stabilization_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        ms(self.settle_delay_ms)
    }

    pub fn slot_load_gap(&self) -> Duration {
        ms(self.slot_load_gap_ms)
    }

    pub fn slot_save_gap(&self) -> Duration {
        ms(self.slot_save_gap_ms)
    }

    pub fn save_debounce(&self) -> Duration {
        ms(self.save_debounce_ms)
    }

    pub fn keymap_chunk_gap(&self) -> Duration {
        ms(self.keymap_chunk_gap_ms)
    }

    pub fn connect_stage(&self) -> StagePolicy {
        StagePolicy::once(ms(self.connect_timeout_ms))
    }

    pub fn discovery_stage(&self) -> StagePolicy {
        StagePolicy::new(ms(self.discovery_timeout_ms), self.discovery_retries)
    }

    pub fn endpoint_stage(&self) -> StagePolicy {
        StagePolicy::once(ms(self.endpoint_timeout_ms))
    }

    pub fn communication_stage(&self) -> StagePolicy {
        StagePolicy::once(ms(self.communication_timeout_ms))
    }
}

/// Values that differ between firmware generations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    /// RESET_CONFIG opcode (0x22 current, 0x52 on early builds)
    pub reset_opcode: u8,
    /// Slots assumed until GET_INFO reports a count
    pub default_button_count: u8,
    /// Largest single write to the keymap endpoint
    pub keymap_chunk_size: usize,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            reset_opcode: cmd::RESET_CONFIG,
            default_button_count: button::DEFAULT_COUNT,
            keymap_chunk_size: wire_timing::KEYMAP_CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = DeckSettings::default();
        assert_eq!(s.timing.save_debounce(), Duration::from_millis(1500));
        assert_eq!(s.timing.discovery_stage().retries, 2);
        assert_eq!(s.timing.exchange().processing_delay, Duration::from_millis(100));
        assert_eq!(s.protocol.reset_opcode, 0x22);
        assert_eq!(s.protocol.default_button_count, 15);
        assert_eq!(s.protocol.keymap_chunk_size, 500);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let s: DeckSettings =
            serde_json::from_str(r#"{"protocol":{"reset_opcode":82},"timing":{"stabilization_ms":5000}}"#)
                .unwrap();
        assert_eq!(s.protocol.reset_opcode, 0x52);
        assert_eq!(s.protocol.default_button_count, 15);
        assert_eq!(s.timing.stabilization(), Duration::from_secs(5));
        assert_eq!(s.timing.reconnect_cooldown_ms, 3000);
    }
}
