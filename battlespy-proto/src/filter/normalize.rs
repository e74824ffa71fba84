//! The filter normaliser (§4.1): repairs a raw client filter string into the
//! canonical grammar the [parser](crate::filter::parse) accepts.
//!
//! This is a thin orchestration over [`token`](crate::filter::token): escape
//! brackets, tokenize, reclassify/split words, then re-emit them with the
//! auto-join and quote-neutralisation rules of §4.1.1.

use crate::filter::token::{escape_brackets, tokenize, Word, WordKind};
use crate::schema;

/// Normalise a raw filter string into the canonical predicate grammar.
///
/// An empty (or whitespace-only) input normalises to an empty string, which
/// the parser reads as "match all" (§4.1).
pub fn normalize(input: &str) -> String {
    let escaped = escape_brackets(input);
    let words = tokenize(&escaped, schema::is_filterable);
    let words = reclassify_and_split(words);
    emit(&words)
}

/// Reclassifies `and`/`or`/`like`/`not` spelled as `Other` words, and splits
/// an `Other` word that has a filterable property name mashed into it (step 6),
/// e.g. `0gametype` becomes the two words `0` and `gametype`.
fn reclassify_and_split(words: Vec<Word>) -> Vec<Word> {
    let mut out = Vec::with_capacity(words.len());
    for word in words {
        if word.kind != WordKind::Other {
            out.push(word);
            continue;
        }

        match word.text.to_ascii_lowercase().as_str() {
            "and" | "or" => {
                out.push(Word {
                    kind: WordKind::Logical,
                    text: word.text,
                });
                continue;
            }
            "like" | "not" => {
                out.push(Word {
                    kind: WordKind::Comparison,
                    text: word.text,
                });
                continue;
            }
            _ => {}
        }

        let lower = word.text.to_ascii_lowercase();
        if let Some((start, len)) = find_property_span(&lower) {
            let prefix = &word.text[..start];
            let property = &word.text[start..start + len];
            let suffix = &word.text[start + len..];
            if !prefix.is_empty() {
                out.push(Word {
                    kind: WordKind::Other,
                    text: prefix.to_string(),
                });
            }
            out.push(Word {
                kind: WordKind::Other,
                text: property.to_string(),
            });
            if !suffix.is_empty() {
                out.push(Word {
                    kind: WordKind::Other,
                    text: suffix.to_string(),
                });
            }
            continue;
        }

        out.push(word);
    }
    out
}

/// Finds the earliest (ties broken by longest) occurrence of a filterable
/// schema name inside `lower`, unless it spans the whole word (nothing to
/// split in that case).
fn find_property_span(lower: &str) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for field in schema::SCHEMA.iter().filter(|f| f.filterable) {
        if let Some(start) = lower.find(field.name) {
            let len = field.name.len();
            if start == 0 && len == lower.len() {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_start, best_len)) => start < best_start || (start == best_start && len > best_len),
            };
            if better {
                best = Some((start, len));
            }
        }
    }
    best
}

/// Neutralises every quote character inside a string literal's body except
/// the enclosing pair, replacing it with the evaluator's `_` wildcard.
fn render_string_literal(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    let quote = chars[0];
    let has_close = chars.len() > 1 && *chars.last().unwrap() == quote;
    let body_end = if has_close { chars.len() - 1 } else { chars.len() };
    let body: String = chars[1..body_end]
        .iter()
        .map(|&c| if c == quote { '_' } else { c })
        .collect();

    let mut out = String::with_capacity(chars.len());
    out.push(quote);
    out.push_str(&body);
    if has_close {
        out.push(quote);
    }
    out
}

/// Emission rules (§4.1.1): joins the word list back into one string,
/// inserting separators and the auto-`and` operator.
fn emit(words: &[Word]) -> String {
    let mut out = String::new();
    let mut prev: Option<WordKind> = None;

    for word in words {
        let no_space = match prev {
            None => true,
            Some(WordKind::OpenBracket) => true,
            _ => word.kind == WordKind::CloseBracket,
        };

        if !no_space {
            out.push(' ');
            if word.kind == WordKind::Other
                && !matches!(prev, Some(WordKind::Logical) | Some(WordKind::Comparison))
            {
                out.push_str("and ");
            } else if word.kind == WordKind::OpenBracket
                && matches!(prev, Some(WordKind::Other) | Some(WordKind::String))
            {
                out.push_str("and ");
            }
        }

        if word.kind == WordKind::String {
            out.push_str(&render_string_literal(&word.text));
        } else {
            out.push_str(&word.text);
        }

        prev = Some(word.kind);
    }

    out
}
