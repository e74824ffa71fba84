#![warn(missing_docs)]
//! The live server registry (C5) and its database-backed persistence (C10).
//!
//! Sits between the heartbeat collaborator (writer, out of scope here) and
//! the query path (reader, `battlespy-server`'s Session): a concurrent map
//! of validated [`GameServer`](battlespy_proto::schema::GameServer) records
//! plus online/offline persistence through a pluggable [`Database`].

pub mod database;
pub mod registry;

pub use database::{Database, DatabaseError, InMemoryDatabase, MySqlDatabase};
pub use registry::Registry;
