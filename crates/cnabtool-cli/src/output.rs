//! Rendering of results to stdout.

use anyhow::{Context, Result};
use cnabtool_registry::RegistryResponse;
use serde::Serialize;

/// Prints `value` as indented JSON.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to render JSON")?;
    println!("{text}");
    Ok(())
}

/// Response envelope with the body embedded as JSON when it parses.
///
/// # Errors
///
/// Returns an error if the envelope cannot be serialized.
pub fn response_json(response: &RegistryResponse) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(response).context("Failed to render response")?;
    if let (Some(content), Some(object)) = (response.json(), value.as_object_mut()) {
        object.insert("Content".to_string(), content);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_json_embeds_content() {
        let response = RegistryResponse {
            reference: "registry.example.com/app:v1".into(),
            status: 200,
            digest: "sha256:abc".into(),
            content: r#"{"schemaVersion":2}"#.into(),
            ..Default::default()
        };

        let value = response_json(&response).unwrap();
        assert_eq!(value["Status"], 200);
        assert_eq!(value["Digest"], "sha256:abc");
        assert_eq!(value["Content"]["schemaVersion"], 2);
        assert_eq!(value["Length"], 0);
    }

    #[test]
    fn test_response_json_keeps_unparsable_content_as_text() {
        let response = RegistryResponse {
            content: "truncated {".into(),
            ..Default::default()
        };
        let value = response_json(&response).unwrap();
        assert_eq!(value["Content"], "truncated {");
    }
}
