//! The canonical filter grammar's abstract syntax tree.
//!
//! `expr := term (( "and" | "or" ) term)*`
//! `term := '(' expr ')' | predicate`
//! `predicate := ["not"] ident op (literal | ident)`

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Bool(bool),
    /// The right-hand side was a bare identifier rather than a quoted/bare literal.
    Ident(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare {
        field: String,
        op: Op,
        value: Literal,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}
