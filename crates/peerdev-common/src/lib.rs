//! Crate-wide error handling and logging bootstrap shared by every
//! subsystem crate in this workspace.

pub mod error;
pub mod logging;

pub use error::{Context, Error, FromMessage, Kind, Result};
