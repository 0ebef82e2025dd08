//! RFID Reader Simulation Library
//!
//! This crate stands in for race-timing RFID readers so a timing client can be
//! exercised without hardware. It includes:
//!
//! - **Links**: virtual serial pairs created by a bridging helper
//! - **DeviceHandle / DeviceFanout**: readers that report tag batches
//! - **Triggers**: operator selection from the roster, or a tag generator
//! - **Session**: roster, readers and the run loop tied together
//!
//! # Example
//!
//! ```rust
//! use rfid_sim::{DeviceFanout, DeviceHandle};
//!
//! # tokio_test_block(async {
//! let mut fanout = DeviceFanout::new(vec![
//!     DeviceHandle::new(0, Vec::new()),
//!     DeviceHandle::new(1, Vec::new()),
//! ]);
//!
//! let report = fanout.broadcast(&["E200A1B2C3"]).await.unwrap();
//! assert!(report.all_ok());
//! fanout.close_all().await;
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod device;
pub mod error;
pub mod fanout;
pub mod link;
pub mod roster;
pub mod session;
pub mod trigger;

pub use device::DeviceHandle;
pub use error::{RosterError, SimError};
pub use fanout::{BroadcastReport, DeviceFanout, DeviceOutcome};
pub use link::{provision, LinkConfig, LinkPaths, ProvisionedLink};
pub use roster::{
    load_roster, Category, FixtureRoster, JsonFileRoster, Participant, Roster, RosterConfig,
    RosterEntry, RosterSource, SeededRoster, Track,
};
pub use session::{ProvisionPolicy, RunSummary, Session, SessionConfig};
pub use trigger::{
    GeneratorTrigger, InteractiveTrigger, KeyAction, Renderer, Selector, TagGenerator,
    TriggerSource,
};
