//! Device discovery for ArmDeck macro pads

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{DiscoveredDevice, ScanFilter};
use crate::Transport;

/// Device discovery abstraction
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    /// Scan for `duration` and return the devices accepted by `filter`
    async fn scan(
        &self,
        filter: &ScanFilter,
        duration: Duration,
    ) -> Result<Vec<DiscoveredDevice>, TransportError>;

    /// Open a link to a scanned device
    async fn connect(&self, device: &DiscoveredDevice)
        -> Result<Arc<dyn Transport>, TransportError>;
}
