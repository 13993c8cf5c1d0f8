//! Data models shared by the worker components.
//!
//! - `Request`, `Response`: what the fetch interceptor sees and returns
//! - `EmergencyAlert`, `QueuedAlert`: alert payloads and their queued form
//! - `Coordinates`: a location fix attached to an alert

pub mod alert;
pub mod http;

pub use alert::{Coordinates, EmergencyAlert, QueuedAlert};
pub use http::{Method, Request, RequestMode, Response, OFFLINE_STATUS};
