//! Versioned parameter documents attached to a build task.
//!
//! Version 1 maps each source file ID straight to its placeholder values.
//! Version 2 wraps each entry in a tagged [`ParameterValue`] so a file can
//! also be replaced wholesale. Everything downstream only sees the version 2
//! shape: [`resolve`] upgrades version 1 documents on the way in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::BuildError;

/// Placeholder name to replacement text.
pub type ParameterMap = BTreeMap<String, String>;

/// What to do with one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParameterValue {
    /// Substitute `<remap .../>` tags using these values.
    Parameters {
        #[serde(default, deserialize_with = "null_as_default")]
        parameters: ParameterMap,
    },
    /// Replace the whole file content with this code.
    Code {
        #[serde(default, deserialize_with = "null_as_default")]
        code: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParametersDocument {
    /// The version the document was written in; `1` for upgraded documents.
    pub source_version: u8,
    pub keyboard: BTreeMap<String, ParameterValue>,
    pub keymap: BTreeMap<String, ParameterValue>,
}

#[derive(Deserialize)]
struct VersionOneDocument {
    #[serde(default)]
    keyboard: Option<BTreeMap<String, Option<ParameterMap>>>,
    #[serde(default)]
    keymap: Option<BTreeMap<String, Option<ParameterMap>>>,
}

#[derive(Deserialize)]
struct VersionTwoDocument {
    #[serde(default)]
    keyboard: Option<BTreeMap<String, ParameterValue>>,
    #[serde(default)]
    keymap: Option<BTreeMap<String, ParameterValue>>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse a raw parameters JSON string into the version 2 shape.
///
/// A missing `version` field, or any value other than the number `2`, selects
/// version 1.
pub fn resolve(raw: &str) -> Result<ParametersDocument, BuildError> {
    if raw.trim().is_empty() {
        return Err(BuildError::Parse("the parameters JSON is empty".to_string()));
    }

    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| BuildError::Parse(e.to_string()))?;
    if !value.is_object() {
        return Err(BuildError::Parse(
            "the parameters JSON must be an object".to_string(),
        ));
    }

    let is_version_two = value
        .get("version")
        .and_then(serde_json::Value::as_f64)
        .is_some_and(|v| v == 2.0);

    if is_version_two {
        debug!("The parameters JSON is version 2.");
        let doc: VersionTwoDocument =
            serde_json::from_value(value).map_err(|e| BuildError::Parse(e.to_string()))?;
        return Ok(ParametersDocument {
            source_version: 2,
            keyboard: doc.keyboard.unwrap_or_default(),
            keymap: doc.keymap.unwrap_or_default(),
        });
    }

    debug!("The parameters JSON is version 1.");
    let doc: VersionOneDocument =
        serde_json::from_value(value).map_err(|e| BuildError::Parse(e.to_string()))?;
    Ok(upgrade(doc))
}

fn upgrade(doc: VersionOneDocument) -> ParametersDocument {
    let wrap = |entries: Option<BTreeMap<String, Option<ParameterMap>>>| {
        entries
            .unwrap_or_default()
            .into_iter()
            .map(|(file_id, parameters)| {
                (
                    file_id,
                    ParameterValue::Parameters {
                        parameters: parameters.unwrap_or_default(),
                    },
                )
            })
            .collect()
    };
    ParametersDocument {
        source_version: 1,
        keyboard: wrap(doc.keyboard),
        keymap: wrap(doc.keymap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ParameterValue {
        ParameterValue::Parameters {
            parameters: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn empty_input_is_a_parse_error() {
        assert!(matches!(resolve(""), Err(BuildError::Parse(_))));
        assert!(matches!(resolve("   "), Err(BuildError::Parse(_))));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(resolve("{keyboard:"), Err(BuildError::Parse(_))));
        assert!(matches!(resolve("[1, 2]"), Err(BuildError::Parse(_))));
    }

    #[test]
    fn version_one_is_upgraded_losslessly() {
        let doc = resolve(r#"{"keyboard":{"f1":{"p":"5","q":"x"}},"keymap":{"k1":{}}}"#)
            .expect("version 1 should parse");
        assert_eq!(doc.source_version, 1);
        assert_eq!(doc.keyboard.get("f1"), Some(&params(&[("p", "5"), ("q", "x")])));
        assert_eq!(doc.keymap.get("k1"), Some(&params(&[])));
    }

    #[test]
    fn missing_sections_resolve_to_empty_maps() {
        let doc = resolve("{}").expect("empty object should parse");
        assert!(doc.keyboard.is_empty());
        assert!(doc.keymap.is_empty());

        let doc = resolve(r#"{"keyboard":null}"#).expect("null section should parse");
        assert!(doc.keyboard.is_empty());
    }

    #[test]
    fn version_other_than_two_is_treated_as_one() {
        let doc = resolve(r#"{"version":3,"keyboard":{"f1":{"p":"1"}}}"#).expect("should parse");
        assert_eq!(doc.source_version, 1);
        assert_eq!(doc.keyboard.get("f1"), Some(&params(&[("p", "1")])));

        let doc = resolve(r#"{"version":"2","keyboard":{}}"#).expect("should parse");
        assert_eq!(doc.source_version, 1);
    }

    #[test]
    fn version_two_reads_tagged_entries() {
        let doc = resolve(
            r#"{
                "version": 2,
                "keyboard": {
                    "f1": {"type": "parameters", "parameters": {"p": "5"}, "code": ""},
                    "f2": {"type": "code", "code": "int main(void) {}", "parameters": {"ignored": "x"}}
                },
                "keymap": {}
            }"#,
        )
        .expect("version 2 should parse");
        assert_eq!(doc.source_version, 2);
        assert_eq!(doc.keyboard.get("f1"), Some(&params(&[("p", "5")])));
        assert_eq!(
            doc.keyboard.get("f2"),
            Some(&ParameterValue::Code {
                code: "int main(void) {}".to_string()
            })
        );
    }

    #[test]
    fn version_two_with_unknown_type_is_rejected() {
        let result = resolve(r#"{"version":2,"keyboard":{"f1":{"type":"binary"}}}"#);
        assert!(matches!(result, Err(BuildError::Parse(_))));
    }

    #[test]
    fn version_one_with_non_string_values_is_rejected() {
        let result = resolve(r#"{"keyboard":{"f1":{"p":5}}}"#);
        assert!(matches!(result, Err(BuildError::Parse(_))));
    }
}
