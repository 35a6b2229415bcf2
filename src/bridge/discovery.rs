//! Bounded discovery window
//!
//! Listens for device announcements for a fixed window, attaching each newly
//! seen device exactly once. Devices that show up after the window are not
//! picked up.

use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::{Bridge, Discoverer};
use crate::stagelinq::{Device, DeviceId, DeviceState};

/// Drives discovery and then holds the resulting sessions
#[derive(Debug, Clone)]
pub struct Orchestrator {
    window: Duration,
    announce_interval: Duration,
}

impl Orchestrator {
    pub fn new(window: Duration, announce_interval: Duration) -> Self {
        Self {
            window,
            announce_interval,
        }
    }

    /// Run the discovery window, attaching every new device to `bridge`
    ///
    /// Returns the distinct devices found, in arrival order.
    pub async fn discover(
        &self,
        discoverer: &mut dyn Discoverer,
        bridge: &mut Bridge,
    ) -> Vec<Device> {
        info!("📡 Listening for devices for {:?}", self.window);
        discoverer.announce_every(self.announce_interval);

        let deadline = Instant::now() + self.window;
        let mut seen: HashSet<DeviceId> = HashSet::new();
        let mut found = Vec::new();

        loop {
            let next = tokio::select! {
                biased;

                _ = sleep_until(deadline) => break,
                next = discoverer.discover(self.window) => next,
            };

            let (device, state) = match next {
                Ok(announcement) => announcement,
                Err(e) if e.is_timeout() => {
                    warn!("⚠️  No announcement within {:?}", self.window);
                    continue;
                },
                Err(e) => {
                    warn!("⚠️  Discovery failed: {}", e);
                    continue;
                },
            };

            if state != DeviceState::Present {
                debug!("{} is leaving", device.name);
                continue;
            }
            if !seen.insert(device.id()) {
                continue;
            }

            info!(
                "✅ {} {} {} {}",
                device.ip, device.name, device.software_name, device.software_version
            );
            bridge.attach(device.clone()).await;
            found.push(device);
        }

        info!("Found devices: {}", found.len());
        found
    }

    /// Discover, then keep every session running until the process is stopped
    ///
    /// Never returns. The discoverer stays alive so its announcements keep
    /// the devices aware of us.
    pub async fn run<D: Discoverer>(self, mut discoverer: D, mut bridge: Bridge) {
        self.discover(&mut discoverer, &mut bridge).await;
        bridge.hold().await;
        drop(discoverer);
    }
}
