//! # Kairos Core
//!
//! Core types for deciding which tag of a container image is current.
//!
//! This crate provides the data structures shared by the registry and CLI
//! crates:
//!
//! - [`ContainerImage`] - Parsed image reference
//! - [`VersionConstraint`] - Sort mode, match predicate and version range
//! - [`TagInfo`] - Metadata recovered from a tag's manifest
//! - [`TagList`] - Ordered result of tag resolution
//!
//! ## Example
//!
//! ```rust
//! use kairos_core::{ContainerImage, MatchPredicate, SortMode, VersionConstraint};
//!
//! let image = ContainerImage::from_identifier("ghcr.io/foo/bar:1.2.0")?;
//! let constraint = VersionConstraint::new(SortMode::SemVer)
//!     .with_match(MatchPredicate::parse("regexp:^1\\.")?)
//!     .with_range("~1.2")?;
//!
//! assert_eq!(image.name, "foo/bar");
//! assert!(constraint.accepts("1.2.3"));
//! # Ok::<(), kairos_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod constraint;
pub mod error;
pub mod image;
pub mod tag;

#[cfg(test)]
mod proptest_tests;

// Re-export main types at crate root
pub use constraint::{parse_version, MatchPredicate, SortMode, VersionConstraint};
pub use error::{Error, Result};
pub use image::ContainerImage;
pub use tag::{ImageTag, TagInfo, TagList};
