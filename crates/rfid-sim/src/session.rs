//! One simulator session: roster, readers, and the run loop
//!
//! A session owns everything a run needs. The roster is loaded before any
//! link is provisioned, so a roster failure never leaves helpers behind.

use std::future::Future;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;
use tokio::task::JoinSet;
use tokio_serial::SerialStream;
use tracing::{error, info, warn};

use crate::device::DeviceHandle;
use crate::error::SimError;
use crate::fanout::DeviceFanout;
use crate::link::{self, LinkConfig};
use crate::roster::{load_roster, Roster, RosterSource};
use crate::trigger::TriggerSource;

/// Default number of simulated readers
pub const DEFAULT_DEVICE_COUNT: usize = 2;

/// What to do when some readers fail to come up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionPolicy {
    /// Close the readers that did come up and fail the session
    #[default]
    Abort,
    /// Run with the readers that came up
    Continue,
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of readers
    pub devices: usize,
    pub link: LinkConfig,
    pub provision_policy: ProvisionPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            devices: DEFAULT_DEVICE_COUNT,
            link: LinkConfig::default(),
            provision_policy: ProvisionPolicy::default(),
        }
    }
}

/// Counters from one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Batches received from the trigger source
    pub batches: u64,
    /// Batches rejected because a tag could not be encoded
    pub rejected: u64,
    /// Frames written, summed over readers
    pub frames_written: u64,
    /// Failed reader writes, summed over readers
    pub failed_writes: u64,
    /// Whether the run ended on the shutdown signal
    pub interrupted: bool,
}

/// A running simulator
#[derive(Debug)]
pub struct Session<L = SerialStream> {
    roster: Roster,
    fanout: DeviceFanout<L>,
}

impl Session<SerialStream> {
    /// Load the roster, then bring up every reader concurrently
    pub async fn start(
        config: &SessionConfig,
        roster_source: &dyn RosterSource,
        race_id: u32,
    ) -> Result<Self, SimError> {
        let roster = load_roster(roster_source, race_id)?;
        let devices = provision_all(config).await?;
        info!(
            "Session started: {} reader(s), {} participant(s)",
            devices.len(),
            roster.len()
        );
        Ok(Self::from_parts(roster, DeviceFanout::new(devices)))
    }

    /// Like [`Session::start`], giving up when `shutdown` resolves first
    ///
    /// Returns `Ok(None)` on shutdown. Links still being provisioned are
    /// dropped, which kills their helpers.
    pub async fn start_until<F>(
        config: &SessionConfig,
        roster_source: &dyn RosterSource,
        race_id: u32,
        shutdown: F,
    ) -> Result<Option<Self>, SimError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                info!("Shutdown requested during startup");
                Ok(None)
            }
            session = Self::start(config, roster_source, race_id) => session.map(Some),
        }
    }
}

impl<L> Session<L>
where
    L: AsyncWrite + Unpin + Send,
{
    /// Assemble a session from an already loaded roster and readers
    pub fn from_parts(roster: Roster, fanout: DeviceFanout<L>) -> Self {
        Self { roster, fanout }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn fanout(&self) -> &DeviceFanout<L> {
        &self.fanout
    }

    /// Paths timing clients should open, in reader order
    pub fn client_paths(&self) -> Vec<&Path> {
        self.fanout
            .devices()
            .iter()
            .filter_map(|d| d.client_path())
            .collect()
    }

    /// Broadcast batches from `trigger` until it finishes or `shutdown` resolves
    ///
    /// Each batch is written to every reader before the next one is awaited.
    /// Shutdown also interrupts a batch that is still being written.
    pub async fn run<T, F>(&mut self, trigger: &mut T, shutdown: F) -> RunSummary
    where
        T: TriggerSource,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();

        loop {
            let batch = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    summary.interrupted = true;
                    break;
                }
                batch = trigger.next_batch() => batch,
            };

            let Some(tags) = batch else {
                info!("Trigger source finished");
                break;
            };
            summary.batches += 1;

            let result = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested while sending {}", tags.join(" "));
                    summary.interrupted = true;
                    break;
                }
                result = self.fanout.broadcast(&tags) => result,
            };

            match result {
                Ok(report) => {
                    let delivered = report.delivered();
                    summary.frames_written += delivered as u64;
                    summary.failed_writes += (report.outcomes.len() - delivered) as u64;
                    if report.all_ok() {
                        info!("Sent {} to {} reader(s)", tags.join(" "), delivered);
                    } else {
                        warn!(
                            "Sent {} to {} of {} reader(s)",
                            tags.join(" "),
                            delivered,
                            report.outcomes.len()
                        );
                    }
                }
                Err(e) => {
                    warn!("Rejected {:?}: {}", tags, e);
                    summary.rejected += 1;
                }
            }
        }

        summary
    }

    /// Close every reader and stop its helper
    pub async fn close(&mut self) {
        self.fanout.close_all().await;
        info!("Session closed");
    }
}

/// Provision every configured reader concurrently and apply the policy
async fn provision_all(config: &SessionConfig) -> Result<Vec<DeviceHandle>, SimError> {
    if config.devices == 0 {
        return Err(SimError::NoDevices);
    }

    let mut set = JoinSet::new();
    for index in 0..config.devices {
        let link_config = config.link.clone();
        set.spawn(async move { (index, link::provision(&link_config, index).await) });
    }

    let mut devices = Vec::with_capacity(config.devices);
    let mut errors: Vec<(usize, SimError)> = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(link))) => devices.push(DeviceHandle::from_provisioned(link)),
            Ok((index, Err(e))) => {
                error!("Reader {} failed to start: {}", index, e);
                errors.push((index, e));
            }
            Err(e) => {
                error!("Provisioning task failed: {}", e);
                errors.push((usize::MAX, SimError::Io(io::Error::other(e))));
            }
        }
    }
    devices.sort_by_key(|d| d.index());
    errors.sort_by_key(|(index, _)| *index);

    let Some((_, first_error)) = errors.into_iter().next() else {
        return Ok(devices);
    };

    match config.provision_policy {
        ProvisionPolicy::Abort => {
            for device in &mut devices {
                device.close().await;
            }
            Err(first_error)
        }
        ProvisionPolicy::Continue if devices.is_empty() => Err(SimError::NoDevices),
        ProvisionPolicy::Continue => {
            warn!(
                "Continuing with {} of {} reader(s)",
                devices.len(),
                config.devices
            );
            Ok(devices)
        }
    }
}
