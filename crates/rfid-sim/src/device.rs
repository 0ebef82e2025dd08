//! Simulated reader device
//!
//! A `DeviceHandle` couples one link with the frame encoder. It owns the
//! link's helper process and must be closed at session end.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rfid_protocol::{active_data_frame, parse_tags};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Child;
use tokio::time::timeout;
use tokio_serial::SerialStream;
use tracing::{debug, info, trace, warn};

use crate::error::SimError;
use crate::link::{terminate_helper, ProvisionedLink};

/// Default upper bound on writing one frame
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// One simulated reader
#[derive(Debug)]
pub struct DeviceHandle<L = SerialStream> {
    index: usize,
    /// Path the timing client opens, if the link lives on the filesystem
    client_path: Option<PathBuf>,
    link: Option<L>,
    helper: Option<Child>,
    write_timeout: Duration,
    frames_sent: u64,
}

impl DeviceHandle<SerialStream> {
    /// Take ownership of a provisioned link and its helper
    pub fn from_provisioned(link: ProvisionedLink) -> Self {
        Self {
            index: link.index,
            client_path: Some(link.paths.device),
            link: Some(link.port),
            helper: Some(link.helper),
            write_timeout: link.write_timeout,
            frames_sent: 0,
        }
    }
}

impl<L> DeviceHandle<L>
where
    L: AsyncWrite + Unpin + Send,
{
    /// Create a reader over an arbitrary writer with no helper process
    pub fn new(index: usize, link: L) -> Self {
        Self {
            index,
            client_path: None,
            link: Some(link),
            helper: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            frames_sent: 0,
        }
    }

    /// Bound each frame write by `write_timeout`
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Reader number
    pub fn index(&self) -> usize {
        self.index
    }

    /// Path the timing client should open
    pub fn client_path(&self) -> Option<&Path> {
        self.client_path.as_deref()
    }

    /// Whether the link is still open
    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Number of frames written successfully
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Borrow the underlying link
    pub fn link(&self) -> Option<&L> {
        self.link.as_ref()
    }

    /// Report `tags` as detected by this reader
    ///
    /// Every tag is validated before anything is written, so a malformed tag
    /// never produces a partial frame.
    pub async fn send_tags<S: AsRef<str>>(&mut self, tags: &[S]) -> Result<(), SimError> {
        let tags = parse_tags(tags)?;
        let frame = active_data_frame(&tags)?;
        self.write_frame(&frame).await
    }

    /// Write one pre-encoded frame with a single write
    ///
    /// A link nobody drains stops accepting bytes; the write then fails with
    /// `WriteTimeout` and part of the frame may already be on the link.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<(), SimError> {
        let index = self.index;
        let limit = self.write_timeout;
        let link = self.link.as_mut().ok_or(SimError::DeviceClosed(index))?;

        let write = async {
            link.write_all(frame).await?;
            link.flush().await
        };
        match timeout(limit, write).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => return Err(SimError::Write { index, source }),
            Err(_) => {
                return Err(SimError::WriteTimeout {
                    index,
                    waited_ms: limit.as_millis() as u64,
                })
            }
        }

        self.frames_sent += 1;
        trace!("Reader {} sent {} bytes: {:02X?}", index, frame.len(), frame);
        Ok(())
    }

    /// Close the link, then stop the helper
    ///
    /// Safe to call more than once.
    pub async fn close(&mut self) {
        let had_link = if let Some(mut link) = self.link.take() {
            if let Err(e) = link.shutdown().await {
                debug!("Reader {} link shutdown failed: {}", self.index, e);
            }
            true
        } else {
            false
        };

        let had_helper = if let Some(mut helper) = self.helper.take() {
            terminate_helper(self.index, &mut helper).await;
            true
        } else {
            false
        };

        if had_link || had_helper {
            info!(
                "Reader {} closed after {} frames",
                self.index, self.frames_sent
            );
        }
    }
}

impl<L> Drop for DeviceHandle<L> {
    fn drop(&mut self) {
        if let Some(helper) = self.helper.as_mut() {
            warn!("Reader {} dropped without close; killing helper", self.index);
            let _ = helper.start_kill();
        }
    }
}
