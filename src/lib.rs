//! Incremental test selection.
//!
//! Records which source files each passing test artifact exercised, then on the
//! next change answers which artifacts must run again. Two suites share the
//! machinery: unit test files and behavior-spec feature files.

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod detect;
pub mod error;
pub mod extract;
pub mod git;
pub mod hash;
pub mod select;
pub mod suite;

pub use cache::{CacheDocument, CacheEntry, CacheStore};
pub use error::{CacheError, ExtractError};
pub use select::{Decision, Reason, Selection};
pub use suite::{FeatureSuite, Suite, UnitSuite};
