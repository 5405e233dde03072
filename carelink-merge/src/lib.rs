//! Conflict detection and resolution for CareLink records.
//!
//! When a locally edited record is pushed and the server already holds a
//! different snapshot, the two are diffed field by field and merged:
//!
//! - [`ConflictResolver::detect_conflicts`]: walks both `data` trees and
//!   lists every differing leaf as a dot path
//! - [`ConflictResolver::resolve_conflict`]: applies a [`ResolutionStrategy`]
//!   to those paths, or defers to a [`ManualResolver`] registered per type
//!
//! Both strategies are mirror images: `ClientWins` yields the client's value
//! at every conflicting path and the server's value everywhere else.

mod diff;
mod error;
mod resolver;

pub use diff::{diff_paths, get_path, set_path, split_path};
pub use error::{MergeError, MergeResult};
pub use resolver::{
    ConflictMetadata, ConflictResolver, ManualResolver, MergeInput, ResolutionStrategy,
};
