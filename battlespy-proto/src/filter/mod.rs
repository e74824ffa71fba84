//! The filter normaliser (C1) and evaluator (C2).
//!
//! A raw, possibly-malformed client filter string flows through
//! [`normalize`] to repair it into the canonical grammar, [`parse`] to turn
//! it into an [`ast::Expr`] tree, and [`apply_filter`] to evaluate that tree
//! against each candidate [`GameServer`](crate::schema::GameServer).

pub mod ast;
pub mod eval;
pub mod normalize;
pub mod parse;
pub mod token;

use crate::schema::GameServer;

pub use ast::{Expr, Literal, Op};
pub use eval::{apply_filter, evaluate};
pub use normalize::normalize;
pub use parse::parse;

/// Runs the full C1 → C2 pipeline over a raw client filter string: repair,
/// then parse into an AST. A parse failure on normalised output is surfaced
/// so the caller can log it before falling back to match-all (§4.1, §4.2).
pub fn normalize_and_parse(raw: &str) -> Result<Option<Expr>, crate::error::ParseError> {
    parse(&normalize(raw))
}

/// Runs the entire filter pipeline — normalise, parse, evaluate — against a
/// slice of candidate servers, falling back to "match all" on either a parse
/// error or an evaluator error (the query path never fails because a client
/// sent a broken filter, §7). Logged once per query.
pub fn run_filter<'a>(raw: &str, servers: &'a [GameServer]) -> Vec<&'a GameServer> {
    match normalize_and_parse(raw) {
        Ok(expr) => apply_filter(&expr, servers),
        Err(err) => {
            tracing::warn!(filter = raw, error = %err, "filter parse failed, falling back to match-all");
            servers.iter().collect()
        }
    }
}
