//! T-SQL dialect helpers for MS SQL Server
//!
//! Statements arrive with `?` positional placeholders; SQL Server's
//! `sp_executesql` wants named parameters `@P1`, `@P2`, ... This module does
//! that rewrite and the identifier quoting the driver needs.

/// T-SQL dialect implementation for MS SQL Server
///
/// # Example
///
/// ```
/// use tdsql_driver_mssql::MssqlDialect;
///
/// let dialect = MssqlDialect::new();
/// assert_eq!(dialect.quote_identifier("authors"), "[authors]");
///
/// let rewritten = dialect.rewrite_placeholders("SELECT au_fname FROM authors WHERE au_id = ?");
/// assert_eq!(rewritten.sql, "SELECT au_fname FROM authors WHERE au_id = @P1");
/// assert_eq!(rewritten.parameter_count, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

/// SQL text with `?` placeholders replaced by `@P<n>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenSql {
    /// Statement text ready for `sp_executesql`
    pub sql: String,
    /// Number of placeholders found
    pub parameter_count: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    Code,
    StringLiteral,
    QuotedIdentifier,
    BracketIdentifier,
    LineComment,
    BlockComment,
}

/// Characters that would extend a `@Pn` parameter name
fn continues_name(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '@' | '#' | '$')
}

impl MssqlDialect {
    /// Create a new MS SQL Server dialect instance
    pub fn new() -> Self {
        Self
    }

    /// Quote an identifier using SQL Server's square bracket syntax
    ///
    /// A closing bracket inside the identifier is doubled.
    pub fn quote_identifier(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    /// Quote a string literal as an N'' unicode literal
    pub fn quote_string(&self, s: &str) -> String {
        format!("N'{}'", s.replace('\'', "''"))
    }

    /// Replace positional `?` placeholders with `@P1`, `@P2`, ...
    ///
    /// Question marks inside string literals, quoted or bracketed
    /// identifiers and comments are left alone. Block comments nest, as they
    /// do in T-SQL.
    pub fn rewrite_placeholders(&self, sql: &str) -> RewrittenSql {
        let mut out = String::with_capacity(sql.len() + 8);
        let mut count = 0usize;
        let mut state = Lexeme::Code;
        let mut comment_depth = 0usize;
        let mut chars = sql.chars().peekable();

        while let Some(c) = chars.next() {
            match state {
                Lexeme::Code => match c {
                    '?' => {
                        count += 1;
                        out.push_str("@P");
                        out.push_str(&count.to_string());
                        // keep the parameter name from running into the next token
                        if chars.peek().is_some_and(|&n| continues_name(n)) {
                            out.push(' ');
                        }
                        continue;
                    }
                    '\'' => state = Lexeme::StringLiteral,
                    '"' => state = Lexeme::QuotedIdentifier,
                    '[' => state = Lexeme::BracketIdentifier,
                    '-' if chars.peek() == Some(&'-') => {
                        out.push(c);
                        out.extend(chars.next());
                        state = Lexeme::LineComment;
                        continue;
                    }
                    '/' if chars.peek() == Some(&'*') => {
                        out.push(c);
                        out.extend(chars.next());
                        state = Lexeme::BlockComment;
                        comment_depth = 1;
                        continue;
                    }
                    _ => {}
                },
                // '' inside a literal reads as close + reopen, so no escape handling is needed
                Lexeme::StringLiteral => {
                    if c == '\'' {
                        state = Lexeme::Code;
                    }
                }
                Lexeme::QuotedIdentifier => {
                    if c == '"' {
                        state = Lexeme::Code;
                    }
                }
                Lexeme::BracketIdentifier => {
                    if c == ']' {
                        if chars.peek() == Some(&']') {
                            out.push(c);
                            out.extend(chars.next());
                            continue;
                        }
                        state = Lexeme::Code;
                    }
                }
                Lexeme::LineComment => {
                    if c == '\n' {
                        state = Lexeme::Code;
                    }
                }
                Lexeme::BlockComment => {
                    if c == '*' && chars.peek() == Some(&'/') {
                        out.push(c);
                        out.extend(chars.next());
                        comment_depth -= 1;
                        if comment_depth == 0 {
                            state = Lexeme::Code;
                        }
                        continue;
                    }
                    if c == '/' && chars.peek() == Some(&'*') {
                        out.push(c);
                        out.extend(chars.next());
                        comment_depth += 1;
                        continue;
                    }
                }
            }
            out.push(c);
        }

        RewrittenSql {
            sql: out,
            parameter_count: count,
        }
    }

    /// Append the metadata select that reports rows affected and the
    /// identity generated by the batch
    ///
    /// Trailing whitespace and terminators are stripped first so the batch
    /// stays valid when the statement already ends with `;`.
    pub fn with_exec_metadata(&self, sql: &str) -> String {
        let body = sql.trim_end().trim_end_matches(';').trim_end();
        format!(
            "{};\nSELECT CAST(@@ROWCOUNT AS BIGINT) AS rows_affected, \
             CAST(SCOPE_IDENTITY() AS BIGINT) AS last_insert_id",
            body
        )
    }
}
