use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::parameter::ParameterValue;
use crate::core::task::SourceFile;

static REMAP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<remap\s+([^/>]+)/>").expect("remap tag pattern is valid"));
static TAG_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="([^"]+)""#).expect("attribute pattern is valid"));

/// Replace every `<remap name="..." type="..." [options="..."] />` tag in
/// `input` with the value registered under its `name`. Tags whose name has no
/// value are removed. Text outside the tags is left untouched.
pub fn replace_parameters(input: &str, values: &BTreeMap<String, String>) -> String {
    REMAP_TAG
        .replace_all(input, |caps: &Captures| {
            let name = TAG_ATTRIBUTE
                .captures_iter(&caps[1])
                .find(|attr| &attr[1] == "name")
                .map(|attr| attr[2].to_string())
                .unwrap_or_default();
            values.get(&name).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Apply the per-file parameter values to `files`.
///
/// Files without an entry pass through unchanged. A `code` entry replaces the
/// file content outright; a `parameters` entry substitutes placeholder tags.
pub fn substitute(
    files: Vec<SourceFile>,
    values_by_file_id: &BTreeMap<String, ParameterValue>,
) -> Vec<SourceFile> {
    files
        .into_iter()
        .map(|mut file| {
            match values_by_file_id.get(&file.id) {
                None => {}
                Some(ParameterValue::Code { code }) => file.content = code.clone(),
                Some(ParameterValue::Parameters { parameters }) => {
                    file.content = replace_parameters(&file.content, parameters);
                }
            }
            file
        })
        .collect()
}
