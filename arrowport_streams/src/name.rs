//! Destination table identifiers.
//!
//! Table names end up inside SQL statements, so they are validated once when
//! a policy is built and quoted whenever they are rendered into a statement.

use std::fmt;

use crate::error::PolicyError;

/// Validate a single identifier segment.
///
/// Valid segments must:
/// - Be at least 1 character long
/// - Start with an ASCII letter or an underscore
/// - Contain only ASCII letters, digits and underscores
pub fn validate_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();

    let Some(first_char) = chars.next() else {
        return false;
    };

    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return false;
    }

    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Name of a table in the analytical store, optionally schema-qualified
/// (`schema.table`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    schema: Option<String>,
    table: String,
}

impl TableName {
    /// Parse and validate a table name.
    pub fn new(name: impl AsRef<str>) -> Result<Self, PolicyError> {
        let name = name.as_ref();
        let invalid = || PolicyError::InvalidTargetTable {
            name: name.to_string(),
        };

        let (schema, table) = match name.split_once('.') {
            None => (None, name),
            Some((schema, table)) => (Some(schema), table),
        };

        if !validate_identifier(table) {
            return Err(invalid());
        }

        if let Some(schema) = schema {
            if !validate_identifier(schema) {
                return Err(invalid());
            }
        }

        Ok(Self {
            schema: schema.map(str::to_string),
            table: table.to_string(),
        })
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The name rendered as a quoted SQL identifier.
    pub fn quoted(&self) -> String {
        match &self.schema {
            None => format!("\"{}\"", self.table),
            Some(schema) => format!("\"{}\".\"{}\"", schema, self.table),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            None => write!(f, "{}", self.table),
            Some(schema) => write!(f, "{}.{}", schema, self.table),
        }
    }
}
