//! Warden: a guardrail registry with tool and workload associations.
//!
//! Guardrails are named protection policies. They are attached to tools,
//! and a workload that adopts a tool inherits a snapshot of the tool's
//! attachments. A guardrail cannot be deleted while anything references it.
//!
//! See `DESIGN.md` for the component map.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod association;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod guardrail;
pub mod inheritance;
pub mod lifecycle;
pub mod logging;
pub mod references;
pub mod store;
pub mod warden;

pub use error::{Error, ErrorKind, Result};
pub use warden::Warden;
