//! Shared value types used by every crate in the workspace.

pub mod types;

pub use types::{Money, OwnerId, ProductId};
