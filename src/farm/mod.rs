//! The link engine and its pure helpers.
//!
//! - [`PathResolver`] maps source-relative paths to destinations
//! - [`ExclusionFilter`] decides which entries never become links
//! - [`LinkEngine`] links, unlinks, adds and materializes entries

mod add;
mod engine;
mod exclusion;
pub mod fs;
mod pattern;
mod resolver;

pub use add::{Added, MappingStore, MaterializeReport};
pub use engine::{Conflict, LinkEngine, LinkReport, UnlinkReport};
pub use exclusion::ExclusionFilter;
pub use pattern::{PathPattern, is_under};
pub use resolver::PathResolver;
