//! Broadcasting tag reads to every simulated reader

use rfid_protocol::{active_data_frame, parse_tags, ProtocolError};
use tokio::io::AsyncWrite;
use tokio_serial::SerialStream;
use tracing::{debug, warn};

use crate::device::DeviceHandle;
use crate::error::SimError;

/// Outcome of a broadcast on one reader
#[derive(Debug)]
pub struct DeviceOutcome {
    pub index: usize,
    pub result: Result<(), SimError>,
}

/// Per-reader outcomes of one broadcast, in reader order
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub outcomes: Vec<DeviceOutcome>,
}

impl BroadcastReport {
    /// Whether every reader accepted the frame
    pub fn all_ok(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Number of readers the frame was written to
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Readers that failed, with their errors
    pub fn failures(&self) -> impl Iterator<Item = (usize, &SimError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.index, e)))
    }
}

/// An ordered set of readers driven together
#[derive(Debug)]
pub struct DeviceFanout<L = SerialStream> {
    devices: Vec<DeviceHandle<L>>,
}

impl<L> DeviceFanout<L>
where
    L: AsyncWrite + Unpin + Send,
{
    /// Create a fan-out over `devices`, kept in the given order
    pub fn new(devices: Vec<DeviceHandle<L>>) -> Self {
        Self { devices }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn devices(&self) -> &[DeviceHandle<L>] {
        &self.devices
    }

    /// Send the same tag batch from every reader
    ///
    /// The frame is encoded once; a malformed tag rejects the whole batch
    /// before any reader is written. A failing reader is recorded in the
    /// report and the remaining readers are still attempted.
    pub async fn broadcast<S: AsRef<str>>(
        &mut self,
        tags: &[S],
    ) -> Result<BroadcastReport, ProtocolError> {
        let tags = parse_tags(tags)?;
        let frame = active_data_frame(&tags)?;
        debug!(
            "Broadcasting {} tag(s) to {} reader(s)",
            tags.len(),
            self.devices.len()
        );

        let mut report = BroadcastReport::default();
        for device in &mut self.devices {
            let result = device.write_frame(&frame).await;
            if let Err(e) = &result {
                warn!("Reader {} failed: {}", device.index(), e);
            }
            report.outcomes.push(DeviceOutcome {
                index: device.index(),
                result,
            });
        }
        Ok(report)
    }

    /// Close every reader
    pub async fn close_all(&mut self) {
        for device in &mut self.devices {
            device.close().await;
        }
    }
}
