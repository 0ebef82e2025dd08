//! Virtual serial links
//!
//! Each simulated reader gets a pair of connected pseudo-terminals created by
//! an external bridging helper (`socat`). The device end is what the timing
//! client opens as if it were a real reader; we write frames into our end.
//!
//! ```text
//! dev/rfid0   <- timing client opens this
//! dev/rfid0_  <- simulator writes here
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout, Instant};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use crate::error::SimError;

/// Default directory for link paths
pub const DEFAULT_DEVICE_DIR: &str = "dev";
/// Default bridging helper
pub const DEFAULT_HELPER: &str = "socat";
/// Line rate of the reader's serial port
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// How long to wait for a helper to exit after being killed
const HELPER_EXIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for provisioning links
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    /// Managed directory holding the link paths
    pub dir: PathBuf,
    /// Helper executable that creates the pseudo-terminal pair
    pub helper: String,
    /// Baud rate for our end of the link
    pub baud_rate: u32,
    /// Upper bound on waiting for the helper to create the link
    pub ready_timeout_ms: u64,
    /// Interval between readiness checks
    pub poll_interval_ms: u64,
    /// Upper bound on writing one frame to our end
    pub write_timeout_ms: u64,
}

impl LinkConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_DEVICE_DIR),
            helper: DEFAULT_HELPER.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            ready_timeout_ms: 5000,
            poll_interval_ms: 50,
            write_timeout_ms: 1000,
        }
    }
}

/// The two filesystem paths of one link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPaths {
    /// Path the timing client opens
    pub device: PathBuf,
    /// Path the simulator writes to
    pub ours: PathBuf,
}

impl LinkPaths {
    /// Paths for reader `index` under `dir`
    pub fn for_index(dir: &Path, index: usize) -> Self {
        Self {
            device: dir.join(format!("rfid{index}")),
            ours: dir.join(format!("rfid{index}_")),
        }
    }

    /// Arguments passed to the helper to create this pair in raw mode without echo
    pub fn helper_args(&self) -> Vec<String> {
        vec![
            "-d".to_string(),
            "-d".to_string(),
            format!("PTY,link={},raw,echo=0", self.device.display()),
            format!("PTY,link={},raw,echo=0", self.ours.display()),
        ]
    }
}

/// A link that is up and ready to be written to
#[derive(Debug)]
pub struct ProvisionedLink {
    pub index: usize,
    pub paths: LinkPaths,
    /// Our end of the link
    pub port: SerialStream,
    /// Helper process keeping the link alive
    pub helper: Child,
    /// Upper bound on writing one frame
    pub write_timeout: Duration,
}

/// Create the link for reader `index` and open our end of it
///
/// Fails without leaving a helper running if the helper cannot be started,
/// exits early, or the link does not come up within the configured timeout.
pub async fn provision(config: &LinkConfig, index: usize) -> Result<ProvisionedLink, SimError> {
    tokio::fs::create_dir_all(&config.dir).await?;

    let paths = LinkPaths::for_index(&config.dir, index);
    remove_stale(&paths).await?;

    let mut helper = Command::new(&config.helper)
        .args(paths.helper_args())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| SimError::HelperSpawn {
            index,
            helper: config.helper.clone(),
            source,
        })?;

    debug!(
        "Spawned {} (pid {:?}) for reader {}",
        config.helper,
        helper.id(),
        index
    );

    if let Err(e) = wait_ready(config, index, &paths, &mut helper).await {
        terminate_helper(index, &mut helper).await;
        return Err(e);
    }

    let port = match tokio_serial::new(paths.ours.to_string_lossy(), config.baud_rate)
        .open_native_async()
    {
        Ok(port) => port,
        Err(source) => {
            terminate_helper(index, &mut helper).await;
            return Err(SimError::OpenFailed {
                index,
                path: paths.ours.clone(),
                source,
            });
        }
    };

    info!(
        "Reader {} ready: client path {}",
        index,
        paths.device.display()
    );

    Ok(ProvisionedLink {
        index,
        paths,
        port,
        helper,
        write_timeout: config.write_timeout(),
    })
}

/// Poll until both link paths exist
///
/// The helper gives no readiness signal of its own, so the symlinks it creates
/// are the signal. Stale links are removed before spawning so they cannot be
/// mistaken for a fresh link.
async fn wait_ready(
    config: &LinkConfig,
    index: usize,
    paths: &LinkPaths,
    helper: &mut Child,
) -> Result<(), SimError> {
    let deadline = Duration::from_millis(config.ready_timeout_ms);
    let poll = Duration::from_millis(config.poll_interval_ms.max(1));
    let started = Instant::now();

    loop {
        if let Some(status) = helper.try_wait()? {
            return Err(SimError::HelperExited {
                index,
                status: status.to_string(),
            });
        }

        if path_exists(&paths.device).await && path_exists(&paths.ours).await {
            debug!(
                "Link for reader {} up after {}ms",
                index,
                started.elapsed().as_millis()
            );
            return Ok(());
        }

        if started.elapsed() >= deadline {
            return Err(SimError::LinkTimeout {
                index,
                path: paths.ours.clone(),
                waited_ms: config.ready_timeout_ms,
            });
        }

        sleep(poll).await;
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Remove links left behind by an earlier run
async fn remove_stale(paths: &LinkPaths) -> io::Result<()> {
    for path in [&paths.device, &paths.ours] {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed stale link {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Kill a helper and reap it, waiting a bounded time
pub(crate) async fn terminate_helper(index: usize, helper: &mut Child) {
    if let Err(e) = helper.start_kill() {
        debug!("Kill of link helper for reader {} failed: {}", index, e);
    }

    match timeout(HELPER_EXIT_TIMEOUT, helper.wait()).await {
        Ok(Ok(status)) => debug!("Link helper for reader {} exited ({})", index, status),
        Ok(Err(e)) => warn!("Failed to reap link helper for reader {}: {}", index, e),
        Err(_) => warn!("Link helper for reader {} did not exit in time", index),
    }
}
