//! Protocol constants for ArmDeck macro pad communication

use uuid::Uuid;

/// Frame magic marker, first two bytes of every frame
pub const MAGIC: [u8; 2] = [0xAD, 0xDC];

/// Bytes around the body: magic(2) + cmd(1) + len(1) + checksum(1)
pub const FRAME_OVERHEAD: usize = 5;

/// Largest body the one-byte length field can describe
pub const MAX_PAYLOAD: usize = 255;

/// Commands (ARMDECK_CMD_*)
pub mod cmd {
    pub const GET_INFO: u8 = 0x10;
    pub const GET_CONFIG: u8 = 0x20;
    pub const SET_CONFIG: u8 = 0x21;
    pub const RESET_CONFIG: u8 = 0x22;
    /// Reset opcode used by earlier firmware builds
    pub const RESET_CONFIG_LEGACY: u8 = 0x52;
    pub const GET_BUTTON: u8 = 0x30;
    pub const SET_BUTTON: u8 = 0x31;
    pub const TEST_BUTTON: u8 = 0x40;
    pub const RESTART: u8 = 0x50;
    pub const ACK: u8 = 0xA0;
    pub const NACK: u8 = 0xA1;

    /// Get human-readable name for command byte
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            GET_INFO => "GET_INFO",
            GET_CONFIG => "GET_CONFIG",
            SET_CONFIG => "SET_CONFIG",
            RESET_CONFIG => "RESET_CONFIG",
            RESET_CONFIG_LEGACY => "RESET_CONFIG_LEGACY",
            GET_BUTTON => "GET_BUTTON",
            SET_BUTTON => "SET_BUTTON",
            TEST_BUTTON => "TEST_BUTTON",
            RESTART => "RESTART",
            ACK => "ACK",
            NACK => "NACK",
            _ => "UNKNOWN",
        }
    }
}

/// Error codes carried in the first body byte of a response
pub mod error_code {
    pub const NONE: u8 = 0x00;
    pub const INVALID_CMD: u8 = 0x01;
    pub const INVALID_PARAM: u8 = 0x02;
    pub const CHECKSUM: u8 = 0x03;
    pub const LENGTH: u8 = 0x04;
    pub const BUSY: u8 = 0x05;
    pub const MEMORY: u8 = 0x06;
}

/// Action type tags in the button record
pub mod action_type {
    pub const NONE: u8 = 0x00;
    pub const KEY: u8 = 0x01;
    pub const MEDIA: u8 = 0x02;
    pub const MACRO: u8 = 0x03;
    pub const CUSTOM: u8 = 0x04;
}

/// GATT identifiers
pub mod uuids {
    use super::Uuid;

    /// Application service carrying the command and keymap endpoints
    pub const ARMDECK_SERVICE: Uuid = Uuid::from_u128(0x7a0b1000_0000_1000_8000_00805f9b34fb);
    /// Standard Device Information service, only used to filter scans
    pub const DEVICE_INFO_SERVICE: Uuid = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
    /// Bulk keymap endpoint (optional, write)
    pub const KEYMAP_ENDPOINT: Uuid = Uuid::from_u128(0xfb349b5f_8000_0080_0010_000001100b7a);
    /// Command endpoint (mandatory, read + write)
    pub const COMMAND_ENDPOINT: Uuid = Uuid::from_u128(0xfb349b5f_8000_0080_0010_000002100b7a);
}

/// Advertised name prefix of ArmDeck devices
pub const DEVICE_NAME_PREFIX: &str = "ArmDeck";

/// Button layout limits
pub mod button {
    /// Size of one button record on the wire
    pub const RECORD_SIZE: usize = 16;
    /// Label field width including the NUL terminator
    pub const LABEL_FIELD: usize = 8;
    /// Printable characters the device keeps
    pub const LABEL_MAX_CHARS: usize = 7;
    /// Button count assumed until the device reports one
    pub const DEFAULT_COUNT: u8 = 15;
    /// Slots in the firmware's config table
    pub const CONFIG_TABLE_SLOTS: usize = 15;
}

/// Timing constants
pub mod timing {
    /// Firmware turnaround between a write and the reply being readable (ms)
    pub const PROCESSING_DELAY_MS: u64 = 100;
    /// Wait before the single re-read after an empty read (ms)
    pub const EMPTY_READ_RETRY_DELAY_MS: u64 = 100;
    /// Maximum bytes per keymap endpoint write
    pub const KEYMAP_CHUNK_SIZE: usize = 500;
    /// Pause between keymap chunks (ms)
    pub const KEYMAP_CHUNK_DELAY_MS: u64 = 20;
}

/// XOR of every byte, in order
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}
