//! SafeCampus worker core.
//!
//! The offline layer of the SafeCampus emergency app: cache strategies over
//! versioned tiers, the install/activate lifecycle, the offline alert queue,
//! installability tracking and push notification handling.
//!
//! The platform is abstracted behind traits in [`platform`], [`cache`],
//! [`network`] and [`sync`]. A host builds one [`worker::Worker`] and feeds
//! it [`worker::WorkerEvent`]s, settling each returned lifetime before the
//! worker may suspend.

pub mod cache;
pub mod config;
pub mod emergency;
pub mod error;
pub mod install;
pub mod lifecycle;
pub mod lifetime;
pub mod messages;
pub mod models;
pub mod network;
pub mod notify;
pub mod platform;
pub mod routing;
pub mod state;
pub mod strategy;
pub mod sync;
pub mod testing;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{LocationError, Result, WorkerError};
pub use worker::{Dispatch, Outcome, Worker, WorkerEvent, WorkerParts, WorkerStatus};
