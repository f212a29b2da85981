use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

#[cfg(test)]
#[path = "validate_tests.rs"]
mod validate_tests;

pub const MSG_OK: &str = "OK";
pub const MSG_EMPTY: &str = "Empty query";
pub const MSG_FORBIDDEN: &str = "Forbidden or potentially destructive statement detected";
pub const MSG_UNPARSABLE: &str = "Unable to parse SQL";

/// Whole-word, case-insensitive. Matches inside string literals and comments too.
static FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(DROP|DELETE|UPDATE|INSERT|ALTER|TRUNCATE|EXEC|MERGE)\b")
        .expect("forbidden-keyword pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub message: String,
    /// Canonical rendering; empty unless `is_valid`.
    pub formatted_sql: String,
}

impl ValidationOutcome {
    fn valid(formatted_sql: String) -> Self {
        Self {
            is_valid: true,
            message: MSG_OK.into(),
            formatted_sql,
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
            formatted_sql: String::new(),
        }
    }
}

/// Gate untrusted SQL text. Stages run in order and stop at the first rejection:
/// emptiness, forbidden keywords, then parsing into canonical form.
pub fn validate(candidate: &str) -> ValidationOutcome {
    if candidate.trim().is_empty() {
        return ValidationOutcome::invalid(MSG_EMPTY);
    }

    if FORBIDDEN.is_match(candidate) {
        return ValidationOutcome::invalid(MSG_FORBIDDEN);
    }

    match format_sql(candidate) {
        Ok(Some(formatted)) => ValidationOutcome::valid(formatted),
        Ok(None) => ValidationOutcome::invalid(MSG_UNPARSABLE),
        Err(e) => ValidationOutcome::invalid(format!("SQL parse/format error: {e}")),
    }
}

/// Parse and re-render every statement: keywords upper-cased, identifiers and
/// literals kept, whitespace collapsed, statements joined by `;\n`.
/// `Ok(None)` when the text holds no statement at all.
fn format_sql(sql: &str) -> Result<Option<String>, sqlparser::parser::ParserError> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql)?;
    if statements.is_empty() {
        return Ok(None);
    }
    let rendered: Vec<String> = statements.iter().map(ToString::to_string).collect();
    Ok(Some(rendered.join(";\n")))
}
