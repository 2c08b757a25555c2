//! libctr - local container image store
//!
//! libctr keeps container images on the local filesystem: a content
//! addressed blob store, per-namespace image metadata and directory
//! snapshots of unpacked layers. It is the library behind the `ctr` CLI.
//!
//! # Quick Start
//!
//! ```no_run
//! use libctr::{Client, PlatformMatcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder().root("/var/lib/ctr").build().await?;
//!
//!     for image in client.list_images(&[]).await? {
//!         let check = client.check(&image, &PlatformMatcher::Default).await?;
//!         println!("{} complete={}", image.name, check.is_complete());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Main Types
//!
//! - [`Client`] - Main entry point, one namespace of a store root
//! - [`Image`] - A named image record
//! - [`ImportOptions`] - How archive entries become images
//! - [`PlatformMatcher`] - Which platforms of a multi-platform image count
//! - [`Digest`] - Content digest validation and handling
//!
//! The lower level modules are public for callers that need to work on the
//! stores directly, but are hidden from the documentation.

#![warn(clippy::all)]

/// Returns the libctr crate version.
///
/// # Examples
///
/// ```
/// let version = libctr::version();
/// assert!(!version.is_empty());
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub use archive::ImportOptions;
pub use client::{Client, ClientBuilder};
pub use digest::Digest;
pub use encryption::DecryptConfig;
pub use error::{CtrError, Result};
pub use images::resolve::{CheckResult, SizeReport};
pub use images::{DeleteOptions, Image, ImageService};
pub use platform::{Platform, PlatformMatcher};
pub use unpack::{DEFAULT_SNAPSHOTTER, UnpackOptions};

#[doc(hidden)]
pub mod archive;
#[doc(hidden)]
pub mod client;
#[doc(hidden)]
pub mod content;
#[doc(hidden)]
pub mod digest;
#[doc(hidden)]
pub mod encryption;
#[doc(hidden)]
pub mod error;
#[doc(hidden)]
pub mod filters;
#[doc(hidden)]
pub mod format;
#[doc(hidden)]
pub mod gc;
#[doc(hidden)]
pub mod images;
#[doc(hidden)]
pub mod oci;
#[doc(hidden)]
pub mod platform;
#[doc(hidden)]
pub mod reference;
#[doc(hidden)]
pub mod unpack;

#[cfg(test)]
mod testutil;
