//! Snapshot-transfer engine for the statrelay agent.
//!
//! One [`Worker`] serves one monitored instance: it keeps a session to the
//! target and a session to the repository, runs a scheduling loop at the
//! configured cadence, and relays each enabled data source through the
//! fetch-then-relay protocol with savepoint isolation. The owning
//! supervisor drives a worker through its [`WorkerHandle`].

pub mod catalog;
pub mod control;
pub mod error;
pub mod session;
pub mod snapshot;
pub mod value;
pub mod worker;

pub use control::WorkerHandle;
pub use error::RelayError;
pub use worker::Worker;
