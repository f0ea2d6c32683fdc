//! Execution backends and their quoting rules.

use crate::error::{ScdError, ScdResult};

/// Component id of the Snowflake transformation.
pub const SNOWFLAKE_COMPONENT: &str = "keboola.snowflake-transformation";

/// Component id of the Synapse transformation.
pub const SYNAPSE_COMPONENT: &str = "keboola.synapse-transformation";

/// A SQL backend the generated code runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Snowflake,
    Synapse,
}

impl Backend {
    /// Resolve the backend from the transformation component id.
    pub fn from_component_id(component_id: &str) -> ScdResult<Self> {
        match component_id {
            SNOWFLAKE_COMPONENT => Ok(Backend::Snowflake),
            SYNAPSE_COMPONENT => Ok(Backend::Synapse),
            other => Err(ScdError::config(format!(
                "The SCD code pattern is not compatible with component \"{}\".",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Snowflake => "snowflake",
            Backend::Synapse => "synapse",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier and value quoting for one backend.
///
/// Selected from a resolved [`Backend`], so selection itself cannot fail.
#[derive(Debug, Clone, Copy)]
pub struct Quoting {
    pub quote_identifier: fn(&str) -> String,
    pub quote_value: fn(&str) -> String,
}

impl Quoting {
    pub fn for_backend(backend: Backend) -> Self {
        match backend {
            Backend::Snowflake => Self {
                quote_identifier: ansi_identifier,
                quote_value: snowflake_value,
            },
            // QUOTED_IDENTIFIER ON: plain ANSI quoting.
            Backend::Synapse => Self {
                quote_identifier: ansi_identifier,
                quote_value: ansi_value,
            },
        }
    }
}

fn ansi_identifier(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn ansi_value(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Snowflake treats `\` as an escape inside string literals.
fn snowflake_value(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_mapping() {
        assert_eq!(
            Backend::from_component_id(SNOWFLAKE_COMPONENT).unwrap(),
            Backend::Snowflake
        );
        assert_eq!(
            Backend::from_component_id(SYNAPSE_COMPONENT).unwrap(),
            Backend::Synapse
        );
    }

    #[test]
    fn test_unsupported_component() {
        let err = Backend::from_component_id("unsupported-component").unwrap_err();
        assert_eq!(
            err.to_string(),
            "The SCD code pattern is not compatible with component \"unsupported-component\"."
        );
        assert!(Backend::from_component_id("").is_err());
    }

    #[test]
    fn test_quoting() {
        let q = Quoting::for_backend(Backend::Snowflake);
        assert_eq!((q.quote_identifier)("id"), "\"id\"");
        assert_eq!((q.quote_value)("Europe/Prague"), "'Europe/Prague'");
        assert_eq!((q.quote_identifier)("a\"b"), "\"a\"\"b\"");
        assert_eq!((q.quote_value)("it's"), "'it''s'");
    }

    #[test]
    fn test_snowflake_escapes_backslash() {
        let q = Quoting::for_backend(Backend::Snowflake);
        assert_eq!((q.quote_value)("9999-12-31\\"), "'9999-12-31\\\\'");
        assert_eq!((q.quote_value)("a\\'b"), "'a\\\\''b'");

        let synapse = Quoting::for_backend(Backend::Synapse);
        assert_eq!((synapse.quote_value)("a\\b"), "'a\\b'");
    }
}
