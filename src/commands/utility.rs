//! Utility command handlers.

use std::path::Path;

use armdeck_driver::DriverConfig;

use super::CommandResult;

/// Print the effective configuration, optionally persisting it
pub fn config(config: &DriverConfig, path: &Path, write: bool) -> CommandResult {
    print!("{}", config.to_toml()?);
    if write {
        config.save(path)?;
        eprintln!("Wrote {}", path.display());
    }
    Ok(())
}
