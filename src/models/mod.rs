//! Domain models for autoenv.
//!
//! # Core Concepts
//!
//! ## Registry (replicable)
//!
//! - [`Project`]: A registered directory tree whose root `.env` is activated on entry.
//! - [`Setting`]: A user default, e.g. the GitHub owner for secret uploads.
//!
//! ## Per-shell state (local only)
//!
//! - [`Session`]: What a shell last activated, and from which file version.
//! - [`Fingerprint`]: Digest of an activated value, stored per variable name.
//!
//! ## Ephemeral
//!
//! - [`EnvSnapshot`]: The parsed `.env` of one directory, read on every invocation.

mod envfile;
mod project;
mod session;
mod setting;

pub use envfile::*;
pub use project::*;
pub use session::*;
pub use setting::*;
