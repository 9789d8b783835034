//! Table rebuild statements.
//!
//! SQLite cannot add, drop or retype most columns in place, so a modified
//! table is rebuilt: create a new table under a temporary name, copy the
//! surviving columns, drop the original, and rename the new table into place.

use crate::error::{ReconcileError, Result};

/// Infix placed between a table name and the random token of its temporary name.
pub const TEMP_INFIX: &str = "_reconcile_";

/// Quotes an identifier, doubling embedded quotes.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Joins identifiers into a quoted, comma separated list.
#[must_use]
pub fn quote_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_identifier(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `DROP <kind> "<name>"`.
#[must_use]
pub fn drop_sql(keyword: &str, name: &str) -> String {
    format!("DROP {} {}", keyword, quote_identifier(name))
}

/// The statements rebuilding one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRebuild {
    table: String,
    temp_name: String,
}

impl TableRebuild {
    /// Prepares a rebuild of `table` through a temporary name derived from `token`.
    #[must_use]
    pub fn new(table: impl Into<String>, token: u64) -> Self {
        let table = table.into();
        let temp_name = format!("{table}{TEMP_INFIX}{token:016x}");
        Self { table, temp_name }
    }

    /// The temporary table name.
    #[must_use]
    pub fn temp_name(&self) -> &str {
        &self.temp_name
    }

    /// The desired definition, declared under the temporary name.
    pub fn create_sql(&self, desired_sql: &str) -> Result<String> {
        rename_declared_table(desired_sql, &self.table, &self.temp_name).ok_or_else(|| {
            ReconcileError::TableDefinition {
                table: self.table.clone(),
            }
        })
    }

    /// Copies `columns` from the original table into the temporary one.
    #[must_use]
    pub fn copy_sql<S: AsRef<str>>(&self, columns: &[S]) -> String {
        let columns = quote_list(columns);
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_identifier(&self.temp_name),
            columns,
            columns,
            quote_identifier(&self.table)
        )
    }

    /// Drops the original table.
    #[must_use]
    pub fn drop_sql(&self) -> String {
        drop_sql("TABLE", &self.table)
    }

    /// Renames the temporary table to the original name.
    #[must_use]
    pub fn rename_sql(&self) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_identifier(&self.temp_name),
            quote_identifier(&self.table)
        )
    }
}

/// Rewrites the table name in the declaration of a `CREATE TABLE` statement.
///
/// Only the name token after `CREATE [TEMP] TABLE [IF NOT EXISTS] [schema.]`
/// is replaced; columns, constraints or literals that happen to contain the
/// table name are left alone. Returns `None` if the statement does not
/// declare `table`.
///
/// The new name is always double-quoted. Once SQLite renames the table back,
/// its stored statement carries the original name in double quotes too,
/// whatever quoting the declaration used; normalization treats `[name]`,
/// `` `name` `` and `"name"` alike so the rebuilt table still matches.
#[must_use]
pub fn rename_declared_table(sql: &str, table: &str, new_name: &str) -> Option<String> {
    let mut scanner = Scanner::new(sql);

    scanner.expect_keyword("CREATE")?;
    if !scanner.accept_keyword("TEMP") {
        scanner.accept_keyword("TEMPORARY");
    }
    scanner.expect_keyword("TABLE")?;
    if scanner.accept_keyword("IF") {
        scanner.expect_keyword("NOT")?;
        scanner.expect_keyword("EXISTS")?;
    }

    let mut name = scanner.identifier()?;
    if scanner.accept_char(b'.') {
        name = scanner.identifier()?;
    }

    if !name.value.eq_ignore_ascii_case(table) {
        return None;
    }

    let mut rewritten = String::with_capacity(sql.len() + new_name.len());
    rewritten.push_str(&sql[..name.start]);
    rewritten.push_str(&quote_identifier(new_name));
    rewritten.push_str(&sql[name.end..]);
    Some(rewritten)
}

/// An identifier located in the source text.
struct Identifier {
    start: usize,
    end: usize,
    value: String,
}

/// Minimal lexer for the head of a `CREATE TABLE` statement.
struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    fn skip_trivia(&mut self) {
        let bytes = self.bytes();
        loop {
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if bytes[self.pos..].starts_with(b"--") {
                while self.pos < bytes.len() && bytes[self.pos] != b'\n' {
                    self.pos += 1;
                }
            } else if bytes[self.pos..].starts_with(b"/*") {
                match self.src[self.pos + 2..].find("*/") {
                    Some(offset) => self.pos += offset + 4,
                    None => self.pos = bytes.len(),
                }
            } else {
                return;
            }
        }
    }

    fn word(&mut self) -> Option<(usize, usize)> {
        self.skip_trivia();
        let bytes = self.bytes();
        let start = self.pos;
        let mut end = start;
        while end < bytes.len() && is_word_byte(bytes[end]) {
            end += 1;
        }
        (end > start).then_some((start, end))
    }

    fn accept_keyword(&mut self, keyword: &str) -> bool {
        let saved = self.pos;
        match self.word() {
            Some((start, end)) if self.src[start..end].eq_ignore_ascii_case(keyword) => {
                self.pos = end;
                true
            }
            _ => {
                self.pos = saved;
                false
            }
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Option<()> {
        self.accept_keyword(keyword).then_some(())
    }

    fn accept_char(&mut self, c: u8) -> bool {
        self.skip_trivia();
        if self.bytes().get(self.pos) == Some(&c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn identifier(&mut self) -> Option<Identifier> {
        self.skip_trivia();
        let bytes = self.bytes();
        let start = self.pos;
        let close = match *bytes.get(start)? {
            b'"' => b'"',
            b'`' => b'`',
            b'\'' => b'\'',
            b'[' => b']',
            _ => {
                let (start, end) = self.word()?;
                self.pos = end;
                return Some(Identifier {
                    start,
                    end,
                    value: self.src[start..end].to_string(),
                });
            }
        };

        let mut value = String::new();
        let mut i = start + 1;
        loop {
            let offset = self.src[i..].find(close as char)?;
            value.push_str(&self.src[i..i + offset]);
            i += offset + 1;
            // A doubled quote is an escaped quote; brackets have no escape.
            if close != b']' && bytes.get(i) == Some(&close) {
                value.push(close as char);
                i += 1;
            } else {
                break;
            }
        }

        self.pos = i;
        Some(Identifier {
            start,
            end: i,
            value,
        })
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}
