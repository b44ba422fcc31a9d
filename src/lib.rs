// ArmDeck driver - shared library
// Configuration file handling used by the `armdeck` binary

pub mod config;

pub use config::{DeviceSection, DriverConfig};
