//! Coverage collection and normalization core: drives a VM-Service RPC
//! session or lowers browser precise-coverage payloads into a canonical
//! per-source hit map, and renders that hit map as LCOV or an annotated
//! source listing.
//!
//! See the `vmservice`, `browser`, `hitmap`, `resolve`, and `report` modules
//! for the pieces named C1-C4 in this crate's design notes.

pub mod browser;
pub mod error;
pub mod hitmap;
pub mod report;
pub mod resolve;
pub mod vmservice;

pub use error::{CollectError, Result};
pub use hitmap::{CoverageMap, HitMap};
