//! Provider-specific SQL for a [`Command`].
//!
//! A command is turned into a [`Statement`]: the SQL text the driver runs,
//! the values to bind in placeholder order, and the output parameters whose
//! values are collected afterwards.
//!
//! Named parameters use the `@name` convention. Markers inside string
//! literals, quoted identifiers and comments are never touched, and a marker
//! with no matching parameter is left as written (MySQL session variables
//! such as `@total` keep working).

use crate::error::{DbError, DbResult};
use crate::models::{Command, CommandType, DatabaseType, ParamValue, Parameter};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::ops::Range;

// Regex compiled once as a lazy static for performance
static PARAMETER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(\w+)").expect("parameter pattern is valid"));

/// Prefix of the session variables that carry MySQL procedure outputs.
const SESSION_OUTPUT_PREFIX: &str = "@__udata_out";

/// Placeholder syntax of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `$1`, `$2`, ... (PostgreSQL)
    Dollar,
    /// `?` (MySQL, SQLite)
    Question,
}

impl Placeholder {
    pub fn for_database(db_type: DatabaseType) -> Self {
        match db_type {
            DatabaseType::PostgreSQL => Self::Dollar,
            DatabaseType::MySQL | DatabaseType::SQLite => Self::Question,
        }
    }

    /// Placeholder text for the 1-based bind position.
    fn render(&self, position: usize) -> String {
        match self {
            Self::Dollar => format!("${}", position),
            Self::Question => "?".to_string(),
        }
    }
}

/// A MySQL session variable standing in for a procedure output argument.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutput<'a> {
    pub variable: String,
    /// Seed value for INPUT/OUTPUT parameters
    pub initial: Option<&'a ParamValue>,
}

/// SQL ready for the driver.
#[derive(Debug, Clone)]
pub struct Statement<'a> {
    pub sql: Cow<'a, str>,
    pub binds: Vec<&'a ParamValue>,
    /// OUTPUT and INPUT/OUTPUT parameters, in declaration order
    pub outputs: Vec<&'a Parameter>,
    /// Non-empty only for MySQL stored procedures with output parameters
    pub session_outputs: Vec<SessionOutput<'a>>,
}

impl<'a> Statement<'a> {
    /// Build the statement for `command` on `db_type`.
    pub fn build(command: &'a Command, db_type: DatabaseType) -> DbResult<Self> {
        let placeholder = Placeholder::for_database(db_type);
        let outputs: Vec<&Parameter> = command.output_parameters().collect();

        match command.command_type {
            CommandType::Text => {
                if command.text.trim().is_empty() {
                    return Err(DbError::invalid_input("Command text cannot be empty"));
                }
                let (sql, binds) = bind_text(&command.text, &command.parameters, db_type);
                Ok(Self {
                    sql,
                    binds,
                    outputs,
                    session_outputs: Vec::new(),
                })
            }
            CommandType::TableDirect => {
                let table = validate_object_name(&command.text)?;
                Ok(Self {
                    sql: Cow::Owned(format!("SELECT * FROM {}", table)),
                    binds: Vec::new(),
                    outputs,
                    session_outputs: Vec::new(),
                })
            }
            CommandType::StoredProcedure => {
                if !db_type.supports_procedures() {
                    return Err(DbError::unsupported_command(command.command_type, db_type));
                }
                let name = validate_object_name(&command.text)?;
                let mut statement = Self {
                    sql: Cow::Borrowed(""),
                    binds: Vec::new(),
                    outputs,
                    session_outputs: Vec::new(),
                };
                let mut args = Vec::with_capacity(command.parameters.len());
                for parameter in &command.parameters {
                    args.push(statement.procedure_argument(parameter, db_type, placeholder));
                }
                statement.sql = Cow::Owned(format!("CALL {}({})", name, args.join(", ")));
                Ok(statement)
            }
        }
    }

    /// True when there is nothing to bind.
    pub fn is_unprepared(&self) -> bool {
        self.binds.is_empty()
    }

    /// `SET @var = ?` statements seeding INPUT/OUTPUT session variables.
    pub fn session_seeds(&self) -> Vec<(String, &'a ParamValue)> {
        self.session_outputs
            .iter()
            .filter_map(|o| o.initial.map(|v| (format!("SET {} = ?", o.variable), v)))
            .collect()
    }

    /// `SELECT @a, @b` reading the session variables back.
    pub fn session_select(&self) -> Option<String> {
        if self.session_outputs.is_empty() {
            return None;
        }
        let vars: Vec<&str> = self
            .session_outputs
            .iter()
            .map(|o| o.variable.as_str())
            .collect();
        Some(format!("SELECT {}", vars.join(", ")))
    }

    fn procedure_argument(
        &mut self,
        parameter: &'a Parameter,
        db_type: DatabaseType,
        placeholder: Placeholder,
    ) -> String {
        let direction = parameter.direction;
        if db_type == DatabaseType::MySQL && direction.is_output() {
            let variable = format!("{}{}", SESSION_OUTPUT_PREFIX, self.session_outputs.len());
            self.session_outputs.push(SessionOutput {
                variable: variable.clone(),
                initial: direction.is_input().then_some(&parameter.value),
            });
            return variable;
        }
        if !direction.is_input() {
            // OUT argument slot of a PostgreSQL procedure
            return "NULL".to_string();
        }
        self.binds.push(&parameter.value);
        placeholder.render(self.binds.len())
    }
}

/// Rewrite `@name` markers to positional placeholders. Falls back to binding
/// every input parameter in declaration order when no marker matches.
fn bind_text<'a>(
    sql: &'a str,
    parameters: &'a [Parameter],
    db_type: DatabaseType,
) -> (Cow<'a, str>, Vec<&'a ParamValue>) {
    let placeholder = Placeholder::for_database(db_type);
    let excluded = excluded_ranges(sql, db_type);
    let mut binds: Vec<&ParamValue> = Vec::new();
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;

    if parameters.iter().any(|p| p.name.is_some()) {
        for cap in PARAMETER_REGEX.captures_iter(sql) {
            let Some(marker) = cap.get(0) else { continue };
            let Some(name) = cap.get(1) else { continue };
            if excluded.iter().any(|r| r.contains(&marker.start()))
                || preceded_by_word_or_at(sql, marker.start())
            {
                continue;
            }
            let Some(parameter) = parameters
                .iter()
                .find(|p| p.direction.is_input() && p.matches_name(name.as_str()))
            else {
                continue;
            };
            binds.push(&parameter.value);
            out.push_str(&sql[last..marker.start()]);
            out.push_str(&placeholder.render(binds.len()));
            last = marker.end();
        }
    }

    if binds.is_empty() {
        let positional = parameters
            .iter()
            .filter(|p| p.direction.is_input())
            .map(|p| &p.value)
            .collect();
        return (Cow::Borrowed(sql), positional);
    }

    out.push_str(&sql[last..]);
    (Cow::Owned(out), binds)
}

/// `@@version` and `user@host` are not parameter markers.
fn preceded_by_word_or_at(sql: &str, pos: usize) -> bool {
    sql[..pos]
        .chars()
        .next_back()
        .is_some_and(|c| c == '@' || c.is_alphanumeric() || c == '_')
}

/// Byte ranges of string literals, quoted identifiers and comments.
///
/// Backslash escapes only apply to MySQL literals and PostgreSQL `E'...'`
/// literals. Doubled quotes need no special case: they close one range and
/// open the next.
fn excluded_ranges(sql: &str, db_type: DatabaseType) -> Vec<Range<usize>> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut ranges = Vec::new();
    let mut i = 0;

    while i < len {
        match bytes[i] {
            b'`' if db_type == DatabaseType::PostgreSQL => i += 1,
            quote @ (b'\'' | b'"' | b'`') => {
                let start = i;
                let backslash_escapes = quote == b'\''
                    && match db_type {
                        DatabaseType::MySQL => true,
                        DatabaseType::PostgreSQL => is_escape_string_prefix(bytes, start),
                        DatabaseType::SQLite => false,
                    };
                i += 1;
                while i < len && bytes[i] != quote {
                    if backslash_escapes && bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i = (i + 1).min(len);
                ranges.push(start..i);
            }
            b'$' if db_type == DatabaseType::PostgreSQL => {
                let start = i;
                match dollar_quote_tag(sql, start) {
                    Some(tag) => {
                        let body = start + tag.len();
                        i = sql[body..]
                            .find(tag)
                            .map(|end| body + end + tag.len())
                            .unwrap_or(len);
                        ranges.push(start..i);
                    }
                    None => i += 1,
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let start = i;
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
                ranges.push(start..i);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let start = i;
                i += 2;
                while i < len && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i = (i + 2).min(len);
                ranges.push(start..i);
            }
            _ => i += 1,
        }
    }
    ranges
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// `E'...'` (PostgreSQL escape string) rather than an identifier ending in `e`.
fn is_escape_string_prefix(bytes: &[u8], quote: usize) -> bool {
    quote >= 1
        && matches!(bytes[quote - 1], b'E' | b'e')
        && (quote < 2 || !is_identifier_byte(bytes[quote - 2]))
}

/// Opening `$tag$` of a PostgreSQL dollar-quoted string starting at `pos`.
/// `$1` placeholders and `$` inside identifiers are not tags.
fn dollar_quote_tag(sql: &str, pos: usize) -> Option<&str> {
    let bytes = sql.as_bytes();
    if pos > 0 && is_identifier_byte(bytes[pos - 1]) {
        return None;
    }
    let rest = &bytes[pos + 1..];
    let tag_len = rest
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_' || **b >= 0x80)
        .count();
    if rest.get(tag_len) != Some(&b'$') || rest.first().is_some_and(|b| b.is_ascii_digit()) {
        return None;
    }
    sql.get(pos..pos + tag_len + 2)
}

/// Accept `name` or `schema.name` built from identifier characters only.
fn validate_object_name(name: &str) -> DbResult<&str> {
    let name = name.trim();
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        chars
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
    };
    if !name.is_empty() && name.split('.').all(valid_part) {
        Ok(name)
    } else {
        Err(DbError::invalid_input(format!(
            "'{}' is not a valid procedure or table name",
            name
        )))
    }
}
