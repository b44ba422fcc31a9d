// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "armdeck")]
#[command(author, version, about = "ArmDeck BLE macro pad driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/armdeck/armdeck.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Connect only to this address / peripheral id
    #[arg(short, long, global = true)]
    pub address: Option<String>,

    /// Scan duration in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub scan_seconds: Option<u64>,

    /// Print JSON instead of text where supported
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    // === Query Commands ===
    /// List ArmDeck devices in range
    #[command(visible_aliases = ["list", "ls"])]
    Scan,

    /// Show firmware, battery and uptime
    #[command(visible_aliases = ["version", "ver", "i"])]
    Info,

    /// Show the button configuration
    #[command(visible_aliases = ["btn", "b"])]
    Buttons {
        /// Read the table stored on the device (GET_CONFIG) instead
        #[arg(long)]
        stored: bool,
    },

    // === Configuration Commands ===
    /// Change one button and save it
    #[command(visible_alias = "s")]
    Set {
        /// Slot index (0-based)
        slot: u8,
        /// Label (up to 7 characters)
        #[arg(short, long)]
        label: Option<String>,
        /// Action name: KEY_<name>, a media name, MACRO, CUSTOM or "" for none
        #[arg(long)]
        action: Option<String>,
        /// Color as RRGGBB or #RRGGBB
        #[arg(long)]
        color: Option<String>,
    },

    /// Restore the device's factory button configuration
    Reset,

    /// Trigger a button's action as if it were pressed
    #[command(visible_alias = "t")]
    Test {
        /// Slot index (0-based)
        slot: u8,
    },

    /// Reboot the device
    Restart,

    /// Print the keymap document, apply one, or upload it
    #[command(visible_alias = "km")]
    Keymap {
        /// Apply a keymap JSON file and save the changed buttons
        #[arg(long, value_name = "FILE", conflicts_with = "push")]
        apply: Option<PathBuf>,
        /// Upload the current keymap to the bulk keymap endpoint
        #[arg(long)]
        push: bool,
    },

    // === Utility Commands ===
    /// Show the effective configuration
    #[command(visible_alias = "cfg")]
    Config {
        /// Write it to the config file
        #[arg(long)]
        write: bool,
    },
}
