// filter.rs — Equality filters over form columns.
//
// A filter is evaluated in memory by `matches`, or rendered into a
// parameterized statement for a relational backend. Values are never
// spliced into SQL text; dates are bound as strings wrapped in the
// dialect's own date conversion.

use std::collections::BTreeMap;

use apr_changeset::FieldValue;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqlDialect {
    #[default]
    Oracle,
    Ansi,
}

impl SqlDialect {
    fn date_placeholder(self) -> &'static str {
        match self {
            SqlDialect::Oracle => "TO_DATE(?, 'YYYY-MM-DD HH24:MI:SS')",
            SqlDialect::Ansi => "CAST(? AS TIMESTAMP)",
        }
    }
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    /// A timestamp rendered as `YYYY-MM-DD HH:MM:SS`.
    Timestamp(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterizedQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Conjunction of `column = value` clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EqualityFilter {
    clauses: Vec<(String, FieldValue)>,
}

impl EqualityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: FieldValue) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: FieldValue) {
        self.clauses.push((column.into(), value));
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[(String, FieldValue)] {
        &self.clauses
    }

    /// Whether a stored row satisfies every clause. Missing columns never match.
    pub fn matches(&self, fields: &BTreeMap<String, FieldValue>) -> bool {
        self.clauses.iter().all(|(column, expected)| {
            fields
                .get(column)
                .is_some_and(|actual| actual.matches(expected))
        })
    }

    /// Render `SELECT * FROM <table> WHERE <scope_column> = ? AND ...`.
    pub fn to_query(
        &self,
        dialect: SqlDialect,
        table: &str,
        scope_column: &str,
        scope_value: &str,
    ) -> Result<ParameterizedQuery> {
        validate_identifier(table)?;
        validate_identifier(scope_column)?;

        let mut sql = format!("SELECT * FROM {} WHERE {} = ?", table, scope_column);
        let mut params = vec![SqlParam::Text(scope_value.to_string())];

        for (column, value) in &self.clauses {
            validate_identifier(column)?;
            match value {
                FieldValue::Text(text) => {
                    sql.push_str(&format!(" AND {} = ?", column));
                    params.push(SqlParam::Text(text.clone()));
                }
                FieldValue::Date(date) => {
                    sql.push_str(&format!(" AND {} = {}", column, dialect.date_placeholder()));
                    params.push(SqlParam::Timestamp(date.format(DATE_FORMAT).to_string()));
                }
            }
        }

        Ok(ParameterizedQuery { sql, params })
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}
