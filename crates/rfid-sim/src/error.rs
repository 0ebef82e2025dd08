//! Error types for the reader simulator

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while provisioning or driving simulated readers
#[derive(Debug, Error)]
pub enum SimError {
    /// Link helper process could not be started
    #[error("failed to start link helper {helper:?} for reader {index}: {source}")]
    HelperSpawn {
        index: usize,
        helper: String,
        #[source]
        source: io::Error,
    },

    /// Link helper exited before the link came up
    #[error("link helper for reader {index} exited early ({status})")]
    HelperExited { index: usize, status: String },

    /// Link paths did not appear in time
    #[error("link {path} for reader {index} not ready after {waited_ms}ms")]
    LinkTimeout {
        index: usize,
        path: PathBuf,
        waited_ms: u64,
    },

    /// Our end of the link could not be opened
    #[error("failed to open {path} for reader {index}: {source}")]
    OpenFailed {
        index: usize,
        path: PathBuf,
        #[source]
        source: tokio_serial::Error,
    },

    /// Writing a frame to a reader link failed
    #[error("write to reader {index} failed: {source}")]
    Write {
        index: usize,
        #[source]
        source: io::Error,
    },

    /// Reader link did not accept a frame in time
    #[error("write to reader {index} timed out after {waited_ms}ms")]
    WriteTimeout { index: usize, waited_ms: u64 },

    /// Reader was already closed
    #[error("reader {0} is closed")]
    DeviceClosed(usize),

    /// No reader could be provisioned
    #[error("no readers available")]
    NoDevices,

    /// Tags could not be encoded
    #[error("encoding error: {0}")]
    Protocol(#[from] rfid_protocol::ProtocolError),

    /// Roster could not be loaded
    #[error("roster error: {0}")]
    Roster(#[from] RosterError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors that can occur while loading a roster
#[derive(Debug, Error)]
pub enum RosterError {
    /// Roster file could not be read
    #[error("failed to read roster {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Roster file is not valid registration JSON
    #[error("failed to parse roster {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
