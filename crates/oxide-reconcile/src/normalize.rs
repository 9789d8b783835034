//! Syntactic normalization of defining statements.
//!
//! Two statements are considered the same object definition when their
//! normalized forms are identical. This is a purely textual comparison:
//! statements that are equivalent but worded differently (say `INT` vs
//! `INTEGER`) still count as modified.

use std::sync::LazyLock;

use regex::Regex;

static LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"--[^\n]*").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" *([(),]) *").unwrap());
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]\n]*)\]").unwrap());
static BACKTICKED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]*)`").unwrap());
static QUOTED_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""(\w+)""#).unwrap());

/// Normalizes a SQL statement for comparison and display.
///
/// Strips `--` comments, collapses whitespace, removes spacing around
/// parentheses and commas, rewrites `[name]` and `` `name` `` identifiers
/// with double quotes, and unquotes bare-word identifiers.
///
/// SQLite writes a renamed table's name in double quotes, so a rebuilt table
/// declared with brackets or backticks only compares equal to its
/// declaration once the quoting styles are unified.
#[must_use]
pub fn normalize(sql: &str) -> String {
    let sql = LINE_COMMENT.replace_all(sql, "");
    let sql = WHITESPACE.replace_all(&sql, " ");
    let sql = PUNCTUATION.replace_all(&sql, "$1");
    let sql = BRACKETED.replace_all(&sql, "\"$1\"");
    let sql = BACKTICKED.replace_all(&sql, "\"$1\"");
    let sql = QUOTED_WORD.replace_all(&sql, "$1");
    sql.trim().to_string()
}

/// Returns true if both statements normalize to the same text.
#[must_use]
pub fn same_sql(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}
