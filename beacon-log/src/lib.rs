//! Logging facade for beacon.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with a [`LogConfig`]. The
//! configuration implements `serde` traits, so it can be obtained from
//! configuration files. Initialization requires the `init` feature.
//!
//! # Logging
//!
//! The basic use of this crate is through the five logging macros: [`error!`],
//! [`warn!`], [`info!`], [`debug!`] and [`trace!`] where `error!` represents
//! the highest-priority log messages and `trace!` the lowest. The log messages
//! are filtered by configuring the log level to exclude messages with a lower
//! priority.
//!
//! ## Conventions
//!
//! Log messages should start lowercase and end without punctuation. Prefer
//! short and precise log messages over verbose text. Choose the log level
//! according to these rules:
//!
//! - [`error!`] for bugs and invalid behavior.
//! - [`warn!`] for undesirable behavior.
//! - [`info!`] for messages relevant to the average user.
//! - [`debug!`] for messages usually relevant to debugging.
//! - [`trace!`] for full auxiliary information.
//!
//! ## Examples
//!
//! ```
//! beacon_log::info!("startup complete");
//! ```
//!
//! # Testing
//!
//! For unit testing, there is a separate initialization macro [`init_test!`]
//! that should be called at the beginning of the test method. It enables test
//! mode of the logger and customizes log levels for the current crate. It
//! requires the `test` feature.
//!
//! ```ignore
//! #[test]
//! fn test_something() {
//!     beacon_log::init_test!();
//! }
//! ```

#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
mod test;
#[cfg(feature = "test")]
pub use test::*;

// Expose the minimal tracing facade.
#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};
