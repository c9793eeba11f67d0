//! Klipper-style `.cfg` files.
//!
//! - **document**: layout-preserving tree and byte-exact writer.
//! - **parse**: text to [`Document`].
//! - **edit**: queries and mutations (set, rename, move, placeholders,
//!   the excluded block).
//! - **literal**: Python literal values used by `drying_data` and `mmu_vars.cfg`.
//! - **value**: typed, bounds-checked option reads.

pub mod document;
mod edit;
pub mod literal;
mod parse;
pub mod value;

pub use document::{Document, Duplicate, EXCLUSION_MARKER, Item, OptionEntry, Scope, Section};
pub use literal::Literal;
pub use value::{Bounds, Choice, OptionReader, Value, split_list};
