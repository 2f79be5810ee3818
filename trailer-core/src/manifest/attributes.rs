//! `#EXT-X-…` attribute lists: `KEY=value,KEY="quoted, value"`.

use std::collections::HashMap;

use super::ManifestError;

#[derive(Debug, Default, Clone)]
pub(crate) struct AttributeList {
    values: HashMap<String, String>,
}

impl AttributeList {
    pub(crate) fn parse(input: &str) -> Result<Self, ManifestError> {
        let mut values = HashMap::new();
        let mut rest = input.trim();
        while !rest.is_empty() {
            let (key, after_key) = rest.split_once('=').ok_or_else(|| {
                ManifestError::Syntax(format!("attribute without value in `{input}`"))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ManifestError::Syntax(format!(
                    "empty attribute name in `{input}`"
                )));
            }
            let (value, remainder) = if let Some(quoted) = after_key.strip_prefix('"') {
                let end = quoted.find('"').ok_or_else(|| {
                    ManifestError::Syntax(format!("unterminated quoted string in `{input}`"))
                })?;
                let remainder = &quoted[end + 1..];
                (quoted[..end].to_string(), remainder)
            } else {
                match after_key.find(',') {
                    Some(end) => (after_key[..end].trim().to_string(), &after_key[end..]),
                    None => (after_key.trim().to_string(), ""),
                }
            };
            values.insert(key.to_ascii_uppercase(), value);
            rest = remainder.trim_start();
            if let Some(next) = rest.strip_prefix(',') {
                rest = next.trim_start();
            } else if !rest.is_empty() {
                return Err(ManifestError::Syntax(format!(
                    "expected `,` between attributes in `{input}`"
                )));
            }
        }
        Ok(Self { values })
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub(crate) fn require(&self, key: &str, tag: &str) -> Result<&str, ManifestError> {
        self.get(key).ok_or_else(|| ManifestError::MissingAttribute {
            tag: tag.to_string(),
            attribute: key.to_string(),
        })
    }
}
