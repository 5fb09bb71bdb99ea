use serde::de::DeserializeOwned;

use ai_client::strip_code_blocks;

/// Outcome of reading a model reply as a typed JSON document.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput<T> {
    Parsed(T),
    Unparseable { reason: String },
}

impl<T> ParsedOutput<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            ParsedOutput::Parsed(value) => Some(value),
            ParsedOutput::Unparseable { .. } => None,
        }
    }
}

/// Best-effort extraction of a JSON document from free-form model output.
///
/// Code fences are dropped, then the span from the first `{` to the last `}`
/// is parsed. When no object span exists the outermost `[`..`]` span is used
/// instead. Anything else is `Unparseable`.
pub fn parse_model_output<T: DeserializeOwned>(raw: &str) -> ParsedOutput<T> {
    let text = strip_code_blocks(raw);

    let Some(candidate) = outer_span(text, '{', '}').or_else(|| outer_span(text, '[', ']')) else {
        return ParsedOutput::Unparseable {
            reason: "no JSON object or array found".to_string(),
        };
    };

    match serde_json::from_str::<T>(candidate) {
        Ok(value) => ParsedOutput::Parsed(value),
        Err(e) => ParsedOutput::Unparseable {
            reason: format!("invalid JSON: {e}"),
        },
    }
}

fn outer_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (start < end).then(|| &text[start..=end])
}
