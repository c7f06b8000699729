//! Tabled evaluation core for a logic programming engine.
//!
//! The crate is organized the way the evaluation itself is layered:
//!
//! - `store`: the answer/variant store the tables are built on.
//! - `solve`: worklists and clusters, the SCC component tree, delayed
//!   literals under the well-founded semantics, and the incremental
//!   dependency graph (IDG).
//! - `program`: a small SLG evaluator over Datalog-style rules that
//!   drives a `Session` end to end.

#![recursion_limit = "1024"]

#[macro_use]
extern crate error_chain;

#[macro_use]
mod macros;

#[macro_use]
pub mod arena;
pub mod config;
pub mod errors;
pub mod program;
pub mod solve;
pub mod store;

pub use config::TablingConfig;
pub use errors::{Error, ErrorKind, Result};
pub use solve::{Session, Tables};
