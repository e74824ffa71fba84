//! Tree-walking evaluation of a parsed [`Expr`] against a [`GameServer`] (§4.2).

use crate::error::EvaluatorError;
use crate::filter::ast::{Expr, Literal, Op};
use crate::schema::{self, FieldValue, GameServer};

/// Evaluate `expr` against `server`, returning whether the record matches.
///
/// `not` short-circuits its operand; `and`/`or` short-circuit the usual way.
/// Type coercion follows the field's own type: an `Int` field compares
/// numerically against a numeric or bare-identifier literal, a `Bool` field
/// accepts `1`/`0`/`true`/`false`, and `like` is only legal against `Str`
/// fields.
pub fn evaluate(expr: &Expr, server: &GameServer) -> Result<bool, EvaluatorError> {
    match expr {
        Expr::Compare { field, op, value } => evaluate_compare(field, *op, value, server),
        Expr::And(left, right) => Ok(evaluate(left, server)? && evaluate(right, server)?),
        Expr::Or(left, right) => Ok(evaluate(left, server)? || evaluate(right, server)?),
        Expr::Not(inner) => Ok(!evaluate(inner, server)?),
    }
}

fn evaluate_compare(
    field: &str,
    op: Op,
    value: &Literal,
    server: &GameServer,
) -> Result<bool, EvaluatorError> {
    if !schema::is_known_field(field) {
        return Err(EvaluatorError::UnknownField(field.to_string()));
    }
    if !schema::is_filterable(field) {
        return Err(EvaluatorError::NotFilterable(field.to_string()));
    }

    let actual = schema::resolve(field, server);

    match &actual {
        FieldValue::Str(s) => eval_str(field, s, op, value),
        FieldValue::Int(n) => eval_int(field, *n, op, value),
        FieldValue::Bool(b) => eval_bool(field, *b, op, value),
        FieldValue::Absent => Ok(false),
    }
}

fn literal_as_str(value: &Literal) -> String {
    match value {
        Literal::Str(s) => s.clone(),
        Literal::Ident(s) => s.clone(),
        Literal::Int(n) => n.to_string(),
        Literal::Bool(b) => if *b { "1" } else { "0" }.to_string(),
    }
}

fn literal_as_int(field: &str, value: &Literal) -> Result<i64, EvaluatorError> {
    match value {
        Literal::Int(n) => Ok(*n),
        Literal::Ident(s) | Literal::Str(s) => s.parse::<i64>().map_err(|_| EvaluatorError::TypeMismatch {
            field: field.to_string(),
            expected: "int",
            literal: s.clone(),
        }),
        Literal::Bool(b) => Ok(if *b { 1 } else { 0 }),
    }
}

fn literal_as_bool(field: &str, value: &Literal) -> Result<bool, EvaluatorError> {
    match value {
        Literal::Bool(b) => Ok(*b),
        Literal::Int(n) => Ok(*n != 0),
        Literal::Ident(s) | Literal::Str(s) => match s.as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            other => Err(EvaluatorError::TypeMismatch {
                field: field.to_string(),
                expected: "bool",
                literal: other.to_string(),
            }),
        },
    }
}

fn eval_str(field: &str, actual: &str, op: Op, value: &Literal) -> Result<bool, EvaluatorError> {
    let expected = literal_as_str(value);
    Ok(match op {
        Op::Eq => actual.eq_ignore_ascii_case(&expected),
        Op::Ne => !actual.eq_ignore_ascii_case(&expected),
        Op::Like => glob_match(&expected, actual),
        Op::Lt | Op::Gt | Op::Le | Op::Ge => {
            return Err(EvaluatorError::TypeMismatch {
                field: field.to_string(),
                expected: "string",
                literal: expected,
            })
        }
    })
}

fn eval_int(field: &str, actual: i64, op: Op, value: &Literal) -> Result<bool, EvaluatorError> {
    let expected = literal_as_int(field, value)?;
    Ok(match op {
        Op::Eq => actual == expected,
        Op::Ne => actual != expected,
        Op::Lt => actual < expected,
        Op::Gt => actual > expected,
        Op::Le => actual <= expected,
        Op::Ge => actual >= expected,
        Op::Like => {
            return Err(EvaluatorError::TypeMismatch {
                field: field.to_string(),
                expected: "int",
                literal: literal_as_str(value),
            })
        }
    })
}

fn eval_bool(field: &str, actual: bool, op: Op, value: &Literal) -> Result<bool, EvaluatorError> {
    let expected = literal_as_bool(field, value)?;
    match op {
        Op::Eq => Ok(actual == expected),
        Op::Ne => Ok(actual != expected),
        Op::Lt | Op::Gt | Op::Le | Op::Ge | Op::Like => Err(EvaluatorError::TypeMismatch {
            field: field.to_string(),
            expected: "bool",
            literal: literal_as_str(value),
        }),
    }
}

/// `%` matches any run of characters, `_` matches exactly one, and `[...]`
/// matches any single character in the bracketed set — the normaliser (§4.1
/// step 1) escapes a literal `[` as `[[]`, a one-character class containing
/// only `[`, so a mashed-together clan tag like `[CLAN]%` still matches.
/// Matching is case-insensitive, mirroring the rest of the evaluator's string
/// comparisons.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let text: Vec<char> = text.to_ascii_lowercase().chars().collect();
    glob_match_inner(&pattern, &text)
}

/// Finds the index of the `]` closing the class opened by `pattern[0]` (`[`),
/// scanning from `pattern[1]`. `None` if unterminated.
fn find_class_end(pattern: &[char]) -> Option<usize> {
    pattern.iter().skip(1).position(|&c| c == ']').map(|i| i + 1)
}

fn glob_match_inner(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('%') => {
            glob_match_inner(&pattern[1..], text)
                || (!text.is_empty() && glob_match_inner(pattern, &text[1..]))
        }
        Some('_') => !text.is_empty() && glob_match_inner(&pattern[1..], &text[1..]),
        Some('[') => match find_class_end(pattern) {
            Some(end) => {
                let class = &pattern[1..end];
                !text.is_empty()
                    && class.contains(&text[0])
                    && glob_match_inner(&pattern[end + 1..], &text[1..])
            }
            // Unterminated bracket: no matching `]`, so treat `[` literally.
            None => text.first() == Some(&'[') && glob_match_inner(&pattern[1..], &text[1..]),
        },
        Some(c) => text.first() == Some(c) && glob_match_inner(&pattern[1..], &text[1..]),
    }
}

/// Evaluate `expr` (if present) against every server in `servers`, logging and
/// discarding the filter to fall back to match-all on the first evaluator
/// error encountered (§4.2: a query must never fail outright because one
/// client supplied a bad filter).
pub fn apply_filter<'a>(expr: &Option<Expr>, servers: &'a [GameServer]) -> Vec<&'a GameServer> {
    let Some(expr) = expr else {
        return servers.iter().collect();
    };

    let mut matched = Vec::with_capacity(servers.len());
    for server in servers {
        match evaluate(expr, server) {
            Ok(true) => matched.push(server),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(error = %err, "filter evaluation failed, falling back to match-all");
                return servers.iter().collect();
            }
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample() -> GameServer {
        GameServer {
            ip: Ipv4Addr::new(1, 2, 3, 4),
            query_port: 16567,
            game_port: 16567,
            hostname: "flying high".into(),
            game_type: "gpm_cq".into(),
            map_name: "strike_at_karkand".into(),
            game_variant: "bf2".into(),
            num_players: 8,
            max_players: 32,
            round_time: 900,
            connection_type: "LAN".into(),
            password_protected: false,
            ranked: true,
            punkbuster: true,
            dedicated: true,
            time_limit: 30,
            anticheat: true,
            last_refreshed: 1_700_000_000,
            is_validated: true,
            database_id: 42,
        }
    }

    #[test]
    fn numeric_comparison() {
        let expr = Expr::Compare {
            field: "numplayers".into(),
            op: Op::Gt,
            value: Literal::Int(0),
        };
        assert!(evaluate(&expr, &sample()).unwrap());
    }

    #[test]
    fn like_wildcard_matches() {
        let expr = Expr::Compare {
            field: "gametype".into(),
            op: Op::Like,
            value: Literal::Str("%cq%".into()),
        };
        assert!(evaluate(&expr, &sample()).unwrap());
    }

    #[test]
    fn like_is_case_insensitive() {
        let expr = Expr::Compare {
            field: "hostname".into(),
            op: Op::Like,
            value: Literal::Str("FLYING%".into()),
        };
        assert!(evaluate(&expr, &sample()).unwrap());
    }

    #[test]
    fn like_matches_normaliser_escaped_literal_bracket() {
        // normalize()'s step-1 escaping turns a literal `[` into `[[]`: a
        // one-character class containing only `[`.
        let mut server = sample();
        server.hostname = "[clan]server".into();
        let expr = Expr::Compare {
            field: "hostname".into(),
            op: Op::Like,
            value: Literal::Str("[[]clan]%".into()),
        };
        assert!(evaluate(&expr, &server).unwrap());
    }

    #[test]
    fn like_bracket_class_matches_any_listed_char() {
        let expr = Expr::Compare {
            field: "hostname".into(),
            op: Op::Like,
            value: Literal::Str("[fg]lying high".into()),
        };
        assert!(evaluate(&expr, &sample()).unwrap());
    }

    #[test]
    fn like_unterminated_bracket_is_literal() {
        let mut server = sample();
        server.hostname = "[unclosed".into();
        let expr = Expr::Compare {
            field: "hostname".into(),
            op: Op::Like,
            value: Literal::Str("[unclosed".into()),
        };
        assert!(evaluate(&expr, &server).unwrap());
    }

    #[test]
    fn not_filterable_field_errors() {
        let expr = Expr::Compare {
            field: "databaseid".into(),
            op: Op::Eq,
            value: Literal::Int(42),
        };
        assert_eq!(
            evaluate(&expr, &sample()),
            Err(EvaluatorError::NotFilterable("databaseid".into()))
        );
    }

    #[test]
    fn and_short_circuits_to_false() {
        let expr = Expr::And(
            Box::new(Expr::Compare {
                field: "numplayers".into(),
                op: Op::Gt,
                value: Literal::Int(100),
            }),
            Box::new(Expr::Compare {
                field: "databaseid".into(),
                op: Op::Eq,
                value: Literal::Int(1),
            }),
        );
        // left is false, so the not-filterable right side is never evaluated.
        assert!(!evaluate(&expr, &sample()).unwrap());
    }

    #[test]
    fn apply_filter_falls_back_to_match_all_on_error() {
        let servers = vec![sample()];
        let expr = Some(Expr::Compare {
            field: "databaseid".into(),
            op: Op::Eq,
            value: Literal::Int(1),
        });
        assert_eq!(apply_filter(&expr, &servers).len(), 1);
    }

    #[test]
    fn not_negates_operand() {
        let expr = Expr::Not(Box::new(Expr::Compare {
            field: "ranked".into(),
            op: Op::Eq,
            value: Literal::Bool(false),
        }));
        assert!(evaluate(&expr, &sample()).unwrap());
    }
}
