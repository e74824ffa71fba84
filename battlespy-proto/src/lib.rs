#![warn(missing_docs)]
//! Filter normaliser/evaluator, server-list encoder, and enctypex codec for
//! the battlespy master-server query core.
//!
//! This crate is the "hard part" of the query path (C1-C4 of the design):
//! it owns no I/O and no shared state, only pure transformations over a
//! fixed [`schema`] of server attributes.

pub mod encode;
pub mod enctypex;
pub mod error;
pub mod filter;
pub mod schema;

pub use filter::{run_filter, Expr};
pub use schema::GameServer;
