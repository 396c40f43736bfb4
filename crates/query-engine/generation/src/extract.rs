//! Pull SQL statements out of free-form completion text.
//!
//! Completions wrap SQL in markdown fences, prefix it with an explanation or
//! follow it with one. None of that may reach the validator as SQL, and a
//! second statement must never be dropped silently.

use query_engine_metadata::metadata::DatabaseType;

/// Keywords that start a statement, recognised in any case.
const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "CREATE", "DROP", "ALTER", "TRUNCATE",
    "GRANT", "REVOKE", "EXPLAIN", "COMMIT", "ROLLBACK",
];

/// Keywords that start a statement but are also plain English words. Before
/// any SQL has been seen they only count when written in upper case.
const UPPERCASE_STATEMENT_KEYWORDS: &[&str] = &[
    "WITH", "SET", "SHOW", "DESCRIBE", "BEGIN", "START", "CALL", "DO", "COPY", "LOCK", "VALUES",
    "TABLE", "REPLACE", "USE", "ANALYZE", "VACUUM",
];

/// Words that can start a later line of a statement.
const CLAUSE_KEYWORDS: &[&str] = &[
    "FROM", "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "FETCH", "JOIN", "INNER",
    "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL", "UNION", "INTERSECT", "EXCEPT", "WINDOW",
];

const UPPERCASE_CLAUSE_KEYWORDS: &[&str] = &[
    "AS", "AND", "OR", "ON", "USING", "CASE", "WHEN", "THEN", "ELSE", "END",
];

/// Every statement found in a completion, in order, without trailing
/// semicolons.
///
/// Inside a code fence every segment between semicolons is a statement. In
/// unfenced text the SQL starts at the first statement keyword, and only the
/// text after the last semicolon may be dropped as a closing remark.
pub fn extract_statements(completion: &str, database_type: DatabaseType) -> Vec<String> {
    if let Some(block) = fenced_block(completion) {
        let segments = split_statements(block, database_type);
        return match segments.first() {
            Some(first) if opens_statement(skip_comments(first)) => {
                segments.into_iter().map(str::to_string).collect()
            }
            _ => Vec::new(),
        };
    }

    let Some(candidate) = from_first_statement(completion) else {
        return Vec::new();
    };
    let mut segments = split_statements(candidate, database_type);
    if segments.len() > 1
        && segments
            .last()
            .is_some_and(|last| !opens_statement(skip_comments(last)))
    {
        segments.pop();
    }

    let last = segments.len().saturating_sub(1);
    segments
        .into_iter()
        .enumerate()
        .map(|(index, segment)| {
            if index == last {
                trim_trailing_prose(segment).to_string()
            } else {
                segment.to_string()
            }
        })
        .collect()
}

/// The contents of the first markdown code fence, without its language tag.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
    let body = &after_fence[body_start..];
    let body = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    Some(body)
}

/// The text from the first line that starts a statement, or failing that from
/// the first upper case statement keyword.
fn from_first_statement(text: &str) -> Option<&str> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        if starts_statement_in_prose(&line[indent..]) {
            return Some(&text[offset + indent..]);
        }
        offset += line.len();
    }

    STATEMENT_KEYWORDS
        .iter()
        .filter_map(|keyword| {
            text.match_indices(keyword)
                .find(|(position, _)| is_word_at(text, *position, keyword.len()))
                .map(|(position, _)| position)
        })
        .min()
        .map(|position| &text[position..])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State<'a> {
    Code,
    Quoted { quote: u8, backslash_escapes: bool },
    LineComment,
    BlockComment(usize),
    DollarQuoted(&'a str),
}

/// Split SQL text on semicolons that are not inside string literals, quoted
/// identifiers, dollar-quoted bodies or comments. Segments that hold nothing
/// but whitespace and comments are dropped.
///
/// Backslash escapes a quote only in MySQL strings and PostgreSQL `E''`
/// strings.
pub fn split_statements(sql: &str, database_type: DatabaseType) -> Vec<&str> {
    let bytes = sql.as_bytes();
    let mut segments = Vec::new();
    let mut state = State::Code;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            State::Code => match byte {
                b'\'' | b'"' | b'`' => {
                    state = State::Quoted {
                        quote: byte,
                        backslash_escapes: backslash_escapes(sql, i, database_type),
                    };
                }
                b'-' if next == Some(b'-') => {
                    state = State::LineComment;
                    i += 1;
                }
                b'/' if next == Some(b'*') => {
                    state = State::BlockComment(1);
                    i += 1;
                }
                b'$' => {
                    if let Some(tag) = dollar_tag(&sql[i..]) {
                        state = State::DollarQuoted(tag);
                        i += tag.len() - 1;
                    }
                }
                b';' => {
                    segments.push(&sql[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
            State::Quoted {
                quote,
                backslash_escapes,
            } => {
                if byte == b'\\' && backslash_escapes {
                    i += 1;
                } else if byte == quote {
                    if next == Some(quote) {
                        i += 1;
                    } else {
                        state = State::Code;
                    }
                }
            }
            State::LineComment => {
                if byte == b'\n' {
                    state = State::Code;
                }
            }
            State::BlockComment(depth) => {
                if byte == b'/' && next == Some(b'*') {
                    state = State::BlockComment(depth + 1);
                    i += 1;
                } else if byte == b'*' && next == Some(b'/') {
                    state = if depth == 1 {
                        State::Code
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    i += 1;
                }
            }
            State::DollarQuoted(tag) => {
                if sql[i..].starts_with(tag) {
                    state = State::Code;
                    i += tag.len() - 1;
                }
            }
        }
        i += 1;
    }
    segments.push(&sql[start..]);

    segments
        .into_iter()
        .map(str::trim)
        .filter(|segment| !skip_comments(segment).is_empty())
        .collect()
}

/// Whether the quote opened at `position` is a string in which backslash
/// escapes the next character.
fn backslash_escapes(sql: &str, position: usize, database_type: DatabaseType) -> bool {
    let quote = sql.as_bytes()[position];
    match database_type {
        DatabaseType::Mysql => quote != b'`',
        DatabaseType::Postgresql => {
            let prefix = &sql[..position];
            quote == b'\''
                && prefix.ends_with(['E', 'e'])
                && !prefix[..prefix.len() - 1]
                    .ends_with(|c: char| c.is_alphanumeric() || c == '_' || c == '$')
        }
    }
}

/// `$tag$` at the start of `text`, including both dollar signs.
fn dollar_tag(text: &str) -> Option<&str> {
    let rest = text.get(1..)?;
    let end = rest.find('$')?;
    let tag = &rest[..end];
    let valid = tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !tag.starts_with(|c: char| c.is_ascii_digit());
    valid.then(|| &text[..end + 2])
}

/// The text after any leading whitespace and comments.
fn skip_comments(mut text: &str) -> &str {
    loop {
        text = text.trim_start();
        if let Some(rest) = text.strip_prefix("--") {
            text = rest.find('\n').map_or("", |end| &rest[end..]);
        } else if let Some(rest) = text.strip_prefix("/*") {
            text = rest.find("*/").map_or("", |end| &rest[end + 2..]);
        } else {
            return text;
        }
    }
}

fn first_word(text: &str) -> &str {
    let end = text
        .find(|c: char| !(c.is_ascii_alphabetic() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

fn is_keyword(word: &str, any_case: &[&str], uppercase_only: &[&str]) -> bool {
    !word.is_empty()
        && (any_case.iter().any(|k| k.eq_ignore_ascii_case(word)) || uppercase_only.contains(&word))
}

/// Whether unfenced text starts with SQL rather than with an English
/// sentence that happens to begin with a keyword.
fn starts_statement_in_prose(text: &str) -> bool {
    is_keyword(
        first_word(text),
        STATEMENT_KEYWORDS,
        UPPERCASE_STATEMENT_KEYWORDS,
    ) || starts_common_table_expression(text)
}

/// Whether text known to hold SQL starts a new statement.
fn opens_statement(text: &str) -> bool {
    let word = first_word(text);
    is_keyword(word, STATEMENT_KEYWORDS, &[])
        || is_keyword(word, UPPERCASE_STATEMENT_KEYWORDS, &[])
}

/// `WITH [RECURSIVE] name [(columns)] AS (`, in any case.
fn starts_common_table_expression(text: &str) -> bool {
    let Some(rest) = strip_word(text, "WITH") else {
        return false;
    };
    let rest = strip_word(rest, "RECURSIVE").unwrap_or(rest);
    let name = identifier_len(rest);
    if name == 0 {
        return false;
    }
    let mut rest = rest[name..].trim_start();
    if rest.starts_with('(') {
        let Some(close) = rest.find(')') else {
            return false;
        };
        rest = &rest[close + 1..];
    }
    strip_word(rest, "AS").is_some_and(|rest| rest.starts_with('('))
}

fn strip_word<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let text = text.trim_start();
    let word = first_word(text);
    word.eq_ignore_ascii_case(keyword)
        .then(|| text[word.len()..].trim_start())
}

fn identifier_len(text: &str) -> usize {
    match text.as_bytes().first() {
        Some(&quote @ (b'"' | b'`')) => text[1..]
            .find(char::from(quote))
            .map_or(0, |close| close + 2),
        _ => text
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(text.len()),
    }
}

fn continues_statement(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("--")
        || line.starts_with(|c: char| "(),;*+-/=<>'\"`".contains(c))
        || starts_statement_in_prose(line)
        || is_keyword(first_word(line), CLAUSE_KEYWORDS, UPPERCASE_CLAUSE_KEYWORDS)
}

fn is_word_at(text: &str, position: usize, len: usize) -> bool {
    let before = text[..position].chars().next_back();
    let after = text[position + len..].chars().next();
    let boundary = |c: Option<char>| c.map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
    boundary(before) && boundary(after)
}

/// Drop paragraphs of explanation that follow a statement without a
/// separating semicolon.
fn trim_trailing_prose(statement: &str) -> &str {
    let mut end = 0;
    let mut after_blank_line = false;
    let mut offset = 0;
    for line in statement.split_inclusive('\n') {
        if line.trim().is_empty() {
            after_blank_line = end > 0;
        } else {
            if after_blank_line && !continues_statement(line) {
                break;
            }
            after_blank_line = false;
            end = offset + line.len();
        }
        offset += line.len();
    }
    statement[..end].trim_end()
}
