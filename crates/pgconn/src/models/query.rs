//! Query request models and placeholder binding.

use crate::error::DbError;
use crate::models::SqlValue;

use serde::{Deserialize, Serialize};

/// Type of SQL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    /// SELECT query returning rows
    Select,
    /// INSERT operation
    Insert,
    /// UPDATE operation
    Update,
    /// DELETE operation
    Delete,
    /// DDL, COPY, or other operations
    Other,
}

impl QueryType {
    /// Detect the type of SQL query from its leading keyword.
    pub fn detect(sql: &str) -> Self {
        let trimmed = sql.trim_start().to_uppercase();

        if trimmed.starts_with("SELECT") || trimmed.starts_with("WITH") {
            Self::Select
        } else if trimmed.starts_with("INSERT") {
            Self::Insert
        } else if trimmed.starts_with("UPDATE") {
            Self::Update
        } else if trimmed.starts_with("DELETE") {
            Self::Delete
        } else {
            Self::Other
        }
    }
}

/// How many rows a read query retrieves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchCardinality {
    /// Only the next row
    One,
    /// Every remaining row
    All,
}

impl FetchCardinality {
    /// Map the `fetch_all` flag of the public API.
    pub fn from_fetch_all(fetch_all: bool) -> Self {
        if fetch_all {
            Self::All
        } else {
            Self::One
        }
    }
}

/// Whether a statement returns rows to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryMode {
    /// Run and report rows affected
    Execute,
    /// Run and retrieve rows
    Fetch(FetchCardinality),
}

/// Placeholder syntax used by a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// No placeholders at all
    None,
    /// `%s` positional placeholders
    Format,
    /// `$1`, `$2`, ... native placeholders
    Numbered,
}

/// A statement with its parameters, submitted as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Statement text with positional placeholders
    pub statement: String,
    /// Bind parameters, in placeholder order
    pub params: Vec<SqlValue>,
    /// Execution mode
    pub mode: QueryMode,
}

impl QueryRequest {
    /// Create a request that only executes.
    pub fn execute(statement: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self { statement: statement.into(), params, mode: QueryMode::Execute }
    }

    /// Create a request that executes and fetches rows.
    pub fn fetch(
        statement: impl Into<String>,
        params: Vec<SqlValue>,
        cardinality: FetchCardinality,
    ) -> Self {
        Self { statement: statement.into(), params, mode: QueryMode::Fetch(cardinality) }
    }

    /// Check placeholders against parameters and produce driver-ready SQL.
    ///
    /// Never touches the parameter values; they travel next to the SQL.
    pub fn bind(self) -> Result<BoundStatement, DbError> {
        let parsed = ParsedStatement::parse(&self.statement)?;
        if parsed.placeholders != self.params.len() {
            return Err(DbError::binding_count(parsed.placeholders, self.params.len()));
        }

        Ok(BoundStatement {
            sql: parsed.sql,
            params: self.params,
            mode: self.mode,
            query_type: QueryType::detect(&self.statement),
        })
    }
}

/// A request whose placeholders matched its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    /// SQL using `$N` placeholders
    pub sql: String,
    /// Bind parameters, `params[i]` fills `$(i+1)`
    pub params: Vec<SqlValue>,
    /// Execution mode
    pub mode: QueryMode,
    /// Detected statement type
    pub query_type: QueryType,
}

/// Statement text after placeholder analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    /// SQL with `%s` rewritten to `$N`
    pub sql: String,
    /// Number of parameters the statement needs
    pub placeholders: usize,
    /// Placeholder syntax found
    pub style: PlaceholderStyle,
}

impl ParsedStatement {
    /// Scan `sql` for placeholders outside literals, identifiers and comments.
    pub fn parse(sql: &str) -> Result<Self, DbError> {
        let chars: Vec<char> = sql.chars().collect();
        let mut out = String::with_capacity(sql.len() + 8);
        let mut format_count = 0usize;
        let mut numbered: Vec<usize> = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            match c {
                '\'' | '"' => {
                    let end = find_char(&chars, i + 1, c).map_or(chars.len(), |e| e + 1);
                    push_unescaped(&mut out, &chars[i..end]);
                    i = end;
                }
                '-' if next == Some('-') => {
                    let end = find_char(&chars, i, '\n').map_or(chars.len(), |e| e + 1);
                    push_unescaped(&mut out, &chars[i..end]);
                    i = end;
                }
                '/' if next == Some('*') => {
                    let end = block_comment_end(&chars, i);
                    push_unescaped(&mut out, &chars[i..end]);
                    i = end;
                }
                '$' if next.is_some_and(|n| n.is_ascii_digit()) && !follows_identifier(&chars, i) => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && chars[end].is_ascii_digit() {
                        end += 1;
                    }
                    let digits: String = chars[start..end].iter().collect();
                    let index = digits.parse::<usize>().map_err(|_| {
                        DbError::binding(format!("placeholder ${digits} is out of range"), 0, 0)
                    })?;
                    if index == 0 {
                        return Err(DbError::binding("placeholder $0 is not valid", 0, 0));
                    }
                    numbered.push(index);
                    out.extend(&chars[i..end]);
                    i = end;
                }
                '$' if !follows_identifier(&chars, i) => match dollar_quote_end(&chars, i) {
                    Some(end) => {
                        push_unescaped(&mut out, &chars[i..end]);
                        i = end;
                    }
                    None => {
                        out.push(c);
                        i += 1;
                    }
                },
                '%' if next == Some('s') => {
                    format_count += 1;
                    out.push('$');
                    out.push_str(&format_count.to_string());
                    i += 2;
                }
                '%' if next == Some('%') => {
                    out.push('%');
                    i += 2;
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            }
        }

        if format_count > 0 && !numbered.is_empty() {
            return Err(DbError::binding(
                "statement mixes %s and $N placeholders",
                format_count + numbered.len(),
                0,
            ));
        }

        if format_count > 0 {
            return Ok(Self { sql: out, placeholders: format_count, style: PlaceholderStyle::Format });
        }

        // Without %s placeholders the text is passed through untouched, so a
        // literal %% stays as written.
        if numbered.is_empty() {
            return Ok(Self { sql: sql.to_string(), placeholders: 0, style: PlaceholderStyle::None });
        }

        numbered.sort_unstable();
        numbered.dedup();
        let highest = numbered[numbered.len() - 1];
        if numbered.len() != highest {
            let gap = (1..=highest).find(|n| numbered.binary_search(n).is_err()).unwrap_or(highest);
            return Err(DbError::binding(
                format!("placeholder ${gap} is never used but ${highest} is"),
                highest,
                0,
            ));
        }

        Ok(Self { sql: sql.to_string(), placeholders: highest, style: PlaceholderStyle::Numbered })
    }
}

/// Copy a literal, identifier or comment, collapsing `%%` to `%`.
///
/// `out` is only used for `%s` statements, where `%%` is the escape for a
/// literal percent sign everywhere in the text.
fn push_unescaped(out: &mut String, segment: &[char]) {
    let mut i = 0;
    while i < segment.len() {
        out.push(segment[i]);
        if segment[i] == '%' && segment.get(i + 1) == Some(&'%') {
            i += 2;
        } else {
            i += 1;
        }
    }
}

fn find_char(chars: &[char], from: usize, target: char) -> Option<usize> {
    chars.iter().skip(from).position(|c| *c == target).map(|p| p + from)
}

fn follows_identifier(chars: &[char], idx: usize) -> bool {
    idx > 0 && {
        let prev = chars[idx - 1];
        prev.is_alphanumeric() || prev == '_' || prev == '$'
    }
}

/// End (exclusive) of a possibly nested block comment starting at `start`.
fn block_comment_end(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < chars.len() {
        match (chars[i], chars[i + 1]) {
            ('/', '*') => {
                depth += 1;
                i += 2;
            }
            ('*', '/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    chars.len()
}

/// End (exclusive) of a dollar-quoted body starting at `start`, or `None`
/// when the `$` does not open one.
fn dollar_quote_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    if chars.get(i) != Some(&'$') {
        return None;
    }
    if i > start + 1 && chars[start + 1].is_ascii_digit() {
        return None;
    }

    let tag = &chars[start..=i];
    let body_start = i + 1;
    let mut j = body_start;
    while j + tag.len() <= chars.len() {
        if &chars[j..j + tag.len()] == tag {
            return Some(j + tag.len());
        }
        j += 1;
    }
    Some(chars.len())
}
