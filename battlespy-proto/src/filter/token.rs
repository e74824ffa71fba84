//! Character-level classification and string-literal scanning for the filter
//! normaliser (§4.1, steps 1-4).

/// Classification of one normaliser token. `None` is a separator only and
/// never survives into the emitted word list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordKind {
    None,
    String,
    OpenBracket,
    CloseBracket,
    Comparison,
    Logical,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub kind: WordKind,
    pub text: String,
}

fn classify_char(c: char) -> WordKind {
    match c {
        c if c.is_whitespace() => WordKind::None,
        '(' => WordKind::OpenBracket,
        ')' => WordKind::CloseBracket,
        '=' | '!' | '<' | '>' => WordKind::Comparison,
        '\'' | '"' => WordKind::String,
        _ => WordKind::Other,
    }
}

/// Step 1: escape every `[` as `[[]` so the evaluator's glob matcher treats it literally.
pub fn escape_brackets(input: &str) -> String {
    input.replace('[', "[[]")
}

/// Scans a string literal starting at `chars[start]` (the opening quote).
///
/// Implements the unescaped-quote heuristic of §4.1 step 3: when more than one
/// occurrence of the closing quote remains, each candidate is accepted only if
/// the text after it looks like the start of a new clause (closing paren,
/// opening paren, `and `/`or `, or a filterable property name), falling back
/// to the last occurrence unconditionally.
///
/// Returns the literal's text (including both quote characters, if present)
/// and the index just past the consumed span.
fn scan_string_literal(chars: &[char], start: usize, is_property: impl Fn(&str) -> bool) -> (String, usize) {
    let quote = chars[start];
    let body_start = start + 1;

    let occurrences: Vec<usize> = chars[body_start..]
        .iter()
        .enumerate()
        .filter(|(_, &c)| c == quote)
        .map(|(i, _)| body_start + i)
        .collect();

    let closing = match occurrences.len() {
        0 => None,
        1 => Some(occurrences[0]),
        _ => {
            let wildcard_literal = chars.get(body_start) == Some(&'%');
            let last = *occurrences.last().unwrap();
            occurrences
                .iter()
                .copied()
                .find(|&idx| {
                    if idx == last {
                        return true;
                    }
                    if wildcard_literal && chars.get(idx.wrapping_sub(1)) != Some(&'%') {
                        return false;
                    }
                    looks_like_clause_start(chars, idx + 1, &is_property)
                })
                .or(Some(last))
        }
    };

    match closing {
        Some(idx) => (chars[start..=idx].iter().collect(), idx + 1),
        None => (chars[start..].iter().collect(), chars.len()),
    }
}

fn looks_like_clause_start(chars: &[char], from: usize, is_property: &impl Fn(&str) -> bool) -> bool {
    let mut i = from;
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    let rest: String = chars[i..].iter().collect();
    if rest.starts_with(')') || rest.starts_with('(') {
        return true;
    }
    let lower = rest.to_ascii_lowercase();
    if lower.starts_with("and ") || lower.starts_with("or ") {
        return true;
    }
    let ident_end = rest
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    is_property(&rest[..ident_end])
}

/// Step 2-4: scan `input` (already bracket-escaped) into a flat word list.
/// Whitespace separators are dropped; brackets are always their own word.
pub fn tokenize(input: &str, is_property: impl Fn(&str) -> bool) -> Vec<Word> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut i = 0;
    let mut current: Option<(WordKind, String)> = None;

    let flush = |current: &mut Option<(WordKind, String)>, words: &mut Vec<Word>| {
        if let Some((kind, text)) = current.take() {
            if kind != WordKind::None {
                words.push(Word { kind, text });
            }
        }
    };

    while i < chars.len() {
        let c = chars[i];
        let kind = classify_char(c);

        match kind {
            WordKind::String => {
                flush(&mut current, &mut words);
                let (text, next) = scan_string_literal(&chars, i, &is_property);
                words.push(Word {
                    kind: WordKind::String,
                    text,
                });
                i = next;
                continue;
            }
            WordKind::OpenBracket | WordKind::CloseBracket => {
                flush(&mut current, &mut words);
                words.push(Word {
                    kind,
                    text: c.to_string(),
                });
            }
            WordKind::None => {
                flush(&mut current, &mut words);
            }
            _ => match &mut current {
                Some((cur_kind, text)) if *cur_kind == kind => text.push(c),
                _ => {
                    flush(&mut current, &mut words);
                    current = Some((kind, c.to_string()));
                }
            },
        }
        i += 1;
    }
    flush(&mut current, &mut words);

    words
}
