//! crate error types

use thiserror::Error;

/// Errors raised while evaluating a canonical filter predicate against a
/// server record (§4.2). The query path never surfaces these to the client;
/// they are logged once per query and the filter falls back to match-all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluatorError {
    /// The filter referenced a field outside the filterable schema, e.g. `databaseId`.
    #[error("field {0:?} is not filterable")]
    NotFilterable(String),
    /// The filter referenced a field that doesn't exist in the schema at all.
    #[error("unknown field {0:?}")]
    UnknownField(String),
    /// A comparison's literal couldn't be coerced to the field's type.
    #[error("cannot compare field {field:?} ({expected}) against {literal:?}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        literal: String,
    },
}

/// Errors raised while parsing a canonical filter predicate into an AST.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of filter")]
    UnexpectedEof,
    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),
    #[error("expected identifier, found {0:?}")]
    ExpectedIdent(String),
    #[error("expected comparison operator, found {0:?}")]
    ExpectedOperator(String),
    #[error("expected ')'")]
    UnclosedParen,
    #[error("trailing input after filter: {0:?}")]
    TrailingInput(String),
}

/// Should be unreachable: the encoder is infallible over the closed schema.
/// Kept as a typed error so a session can still dispose cleanly if it ever fires.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("field count {0} exceeds the wire format's u8 limit")]
    TooManyFields(usize),
}
