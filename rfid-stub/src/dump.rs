//! Reader monitor: prints tags received on reader device paths
//!
//! Each path is watched by its own task that reconnects until shutdown, so
//! the monitor can be started before the simulator.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rfid_protocol::{ParseError, ProtocolCodec, ReaderCommand, RfidCodec};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

/// Pause between connection attempts
pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(100);

/// Something observed on a reader path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpEvent {
    Connected(PathBuf),
    Disconnected { path: PathBuf, reason: String },
    Tag { path: PathBuf, tag: String },
}

impl fmt::Display for DumpEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpEvent::Connected(path) => write!(f, "{} connected", path.display()),
            DumpEvent::Disconnected { path, reason } => {
                write!(f, "{} disconnected: {}", path.display(), reason)
            }
            DumpEvent::Tag { path, tag } => write!(f, "{} {}", path.display(), tag),
        }
    }
}

/// Watch `paths` and print events to stdout until `shutdown` resolves
pub async fn run<F>(paths: Vec<PathBuf>, baud_rate: u32, shutdown: F)
where
    F: Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::channel(128);
    let mut watchers = JoinSet::new();
    for path in paths {
        info!("Watching {}", path.display());
        watchers.spawn(watch_reader(path, baud_rate, tx.clone()));
    }
    drop(tx);

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = rx.recv() => match event {
                Some(event) => println!("{event}"),
                None => break,
            },
        }
    }
    watchers.shutdown().await;
}

/// Keep a reader path open, reconnecting after every disconnect
///
/// Returns once the event receiver is gone.
pub async fn watch_reader(path: PathBuf, baud_rate: u32, tx: mpsc::Sender<DumpEvent>) {
    loop {
        match tokio_serial::new(path.to_string_lossy(), baud_rate).open_native_async() {
            Ok(port) => {
                if tx.send(DumpEvent::Connected(path.clone())).await.is_err() {
                    return;
                }
                let reason = read_frames(&path, port, &tx).await;
                let event = DumpEvent::Disconnected {
                    path: path.clone(),
                    reason,
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            Err(e) => trace!("{} not available: {}", path.display(), e),
        }

        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(RECONNECT_INTERVAL).await;
    }
}

/// Decode frames from `reader` and forward tag events until it fails
///
/// Returns the reason the stream ended.
pub async fn read_frames<R>(path: &Path, mut reader: R, tx: &mpsc::Sender<DumpEvent>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut codec = RfidCodec::new();
    let mut buf = [0u8; 512];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return "end of stream".to_string(),
            Ok(n) => n,
            Err(e) => return e.to_string(),
        };
        codec.push_bytes(&buf[..n]);

        while let Some(result) = codec.decode_next() {
            match result {
                Ok((frame, raw)) => {
                    debug!("{}: {:02X?}", path.display(), raw);
                    match frame.command {
                        ReaderCommand::ActiveData(record) => {
                            for read in &record.tags {
                                let event = DumpEvent::Tag {
                                    path: path.to_path_buf(),
                                    tag: read.tag_hex(),
                                };
                                if tx.send(event).await.is_err() {
                                    return "monitor stopped".to_string();
                                }
                            }
                        }
                        ReaderCommand::Unknown { code, .. } => {
                            warn!("{}: unknown command 0x{:02X}", path.display(), code)
                        }
                    }
                }
                Err(ParseError::InvalidHeader) => {}
                Err(e) => warn!("{}: {}", path.display(), e),
            }
        }
    }
}
