//! `.env` loading and the export diff.

mod diff;
mod loader;

pub use diff::*;
pub use loader::*;
