//! Database models.
//!
//! These models map directly to the database schema. Status columns are
//! validated into closed enums on read so a foreign value fails loudly.

pub mod history;
pub mod queue_item;

pub use history::*;
pub use queue_item::*;
