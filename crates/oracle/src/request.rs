use serde::Serialize;
use serde_json::Value;

use pagesmith_core::types::FileSet;

/// Built-in system prompt used when none is configured.
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You edit a small static website. \
Reply with a single JSON object and nothing else. Either return the complete \
file set as {\"index.html\": \"...\", \"styles.css\": \"...\"}, or return a \
patch as {\"ops\": [...], \"rootSelector\": \"...\"} where each op is one of \
replace_text, append_html, replace_html, set_attr, add_class, remove_class, \
upsert_style. Never touch navigation, scripts or the document head.";

/// What a backend is asked.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleRequest {
    pub system_instructions: String,
    pub prompt: String,
    pub current_files: FileSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
}

/// The user turn: everything but the system instructions.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserTurn<'a> {
    prompt: &'a str,
    current_files: &'a FileSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    brand: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preset: Option<&'a str>,
}

impl OracleRequest {
    /// JSON text of the user turn sent to chat-style backends.
    pub fn user_message(&self) -> String {
        let turn = UserTurn {
            prompt: &self.prompt,
            current_files: &self.current_files,
            brand: self.brand.as_ref(),
            preset: self.preset.as_deref(),
        };
        // Serializing borrowed strings and JSON values cannot fail.
        serde_json::to_string(&turn).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_contract_shape() {
        let mut files = FileSet::new();
        files.insert("index.html".into(), "<p>x</p>".into());
        let request = OracleRequest {
            system_instructions: "sys".into(),
            prompt: "make it pop".into(),
            current_files: files,
            brand: Some(json!({"color": "#f00"})),
            preset: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "systemInstructions": "sys",
                "prompt": "make it pop",
                "currentFiles": {"index.html": "<p>x</p>"},
                "brand": {"color": "#f00"}
            })
        );

        let user: serde_json::Value = serde_json::from_str(&request.user_message()).unwrap();
        assert_eq!(user["prompt"], "make it pop");
        assert!(user.get("systemInstructions").is_none());
    }
}
