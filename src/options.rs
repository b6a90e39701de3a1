use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Configuration for compiling and rendering templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Opening delimiter of code tags (default: "<%")
    pub open: String,
    /// Closing delimiter of code tags (default: "%>")
    pub close: String,
    /// Opening delimiter of expression tags (default: "{%")
    pub expression_open: String,
    /// Closing delimiter of expression tags (default: "%}")
    pub expression_close: String,
    /// Prefix of the ids given to generated `he-block` elements (default: "hserverside")
    pub id_prefix: String,
    /// Maximum number of nested template executions in one render
    pub max_depth: usize,
    /// File extensions tried by directory sources, in order
    pub extensions: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            open: "<%".to_string(),
            close: "%>".to_string(),
            expression_open: "{%".to_string(),
            expression_close: "%}".to_string(),
            id_prefix: "hserverside".to_string(),
            max_depth: 64,
            extensions: vec!["hwk".to_string(), "ejs".to_string()],
        }
    }
}

impl Options {
    /// Load settings from a JSON document, missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let options: Options =
            serde_json::from_str(json).map_err(|err| Error::Settings(err.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<(), Error> {
        for (key, value) in [
            ("open", &self.open),
            ("close", &self.close),
            ("expressionOpen", &self.expression_open),
            ("expressionClose", &self.expression_close),
        ] {
            if value.is_empty() {
                return Err(Error::Settings(format!("`{key}` must not be empty")));
            }
        }
        if self.max_depth == 0 {
            return Err(Error::Settings("`maxDepth` must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_keep_defaults() {
        let options = Options::from_json(r#"{"idPrefix": "srv", "maxDepth": 8}"#).unwrap();
        assert_eq!(options.id_prefix, "srv");
        assert_eq!(options.max_depth, 8);
        assert_eq!(options.open, "<%");
        assert_eq!(options.expression_close, "%}");
    }

    #[test]
    fn test_empty_delimiter_rejected() {
        let err = Options::from_json(r#"{"open": ""}"#).unwrap_err();
        assert!(matches!(err, Error::Settings(_)));
    }
}
