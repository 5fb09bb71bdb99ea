use serde::{Deserialize, Serialize};

// =============================================================================
// Content
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }

    pub fn instruction(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }
}

// =============================================================================
// Request
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ThinkingConfig {
    pub thinking_budget: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl GenerateRequest {
    /// JSON-mode request with thinking disabled.
    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system_instruction: Some(Content::instruction(system)),
            contents: vec![Content::user(user)],
            generation_config: GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                temperature: Some(0.0),
                thinking_config: Some(ThinkingConfig { thinking_budget: 0 }),
            },
        }
    }
}

// =============================================================================
// Response
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Candidate {
    pub content: Option<Content>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_request_uses_camel_case_wire_names() {
        let request = GenerateRequest::json("be terse", "hello");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(json["generationConfig"]["thinkingConfig"]["thinkingBudget"], 0);
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be terse");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
    }

    #[test]
    fn response_text_joins_parts() {
        let raw = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#;
        let response: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.text().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn blocked_response_has_no_text() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(response.text().is_none());
    }
}
