//! acrflow build context packaging
//!
//! This crate turns a local source tree into the gzip-compressed tar archive that
//! is uploaded to the registry as build input, filtering entries through
//! ordered ignore rules.

pub mod archive;
pub mod error;
pub mod ignore;

pub use archive::{ContextArchive, SealedArchive};
pub use error::{ContextError, Result};
pub use ignore::{COMMON_IGNORE, Decision, IgnoreRule, IgnoreRules, read_patterns};
