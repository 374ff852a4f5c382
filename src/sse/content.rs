//! Payload decoding for the content-generation stream.

use serde::{Deserialize, Serialize};

use crate::sse::message::SseMessage;

/// Structured payload of a generation event. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Completion ratio reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
}

/// Decode `data` as a JSON chunk; anything else is treated as plain text.
pub fn parse_content_chunk(data: &str) -> ContentChunk {
    serde_json::from_str(data).unwrap_or_else(|_| ContentChunk {
        content: Some(data.to_string()),
        ..ContentChunk::default()
    })
}

/// Generation-endpoint event, classified by event name.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    Progress(ContentChunk),
    /// `stream`, `token` or unnamed `message` events.
    Token(ContentChunk),
    Complete(ContentChunk),
    Error(ContentChunk),
    Other { event: String, chunk: ContentChunk },
}

impl GenerationEvent {
    pub fn from_message(message: &SseMessage) -> Self {
        let chunk = parse_content_chunk(&message.data);

        match message.event_type() {
            "progress" => GenerationEvent::Progress(chunk),
            "stream" | "token" | "message" => GenerationEvent::Token(chunk),
            "complete" => GenerationEvent::Complete(chunk),
            "error" => GenerationEvent::Error(chunk),
            other => GenerationEvent::Other {
                event: other.to_string(),
                chunk,
            },
        }
    }

    pub fn chunk(&self) -> &ContentChunk {
        match self {
            GenerationEvent::Progress(chunk)
            | GenerationEvent::Token(chunk)
            | GenerationEvent::Complete(chunk)
            | GenerationEvent::Error(chunk)
            | GenerationEvent::Other { chunk, .. } => chunk,
        }
    }

    /// Whether the generation has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationEvent::Complete(_) | GenerationEvent::Error(_))
            || self.chunk().complete == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(event: &str, data: &str) -> SseMessage {
        SseMessage {
            id: None,
            event: Some(event.to_string()),
            data: data.to_string(),
            retry: None,
            timestamp: 0,
        }
    }

    #[test]
    fn test_parse_json_chunk() {
        let chunk = parse_content_chunk(r#"{"content":"Hello","progress":0.25,"extra":1}"#);
        assert_eq!(chunk.content.as_deref(), Some("Hello"));
        assert_eq!(chunk.progress, Some(0.25));
        assert_eq!(chunk.complete, None);
    }

    #[test]
    fn test_plain_text_falls_back_to_content() {
        for data in ["just text", "42", "\"quoted\"", r#"{"progress":"half"}"#, ""] {
            let chunk = parse_content_chunk(data);
            assert_eq!(chunk.content.as_deref(), Some(data));
            assert_eq!(chunk.progress, None);
        }
    }

    #[test]
    fn test_classification() {
        assert!(matches!(
            GenerationEvent::from_message(&message("progress", r#"{"progress":0.5}"#)),
            GenerationEvent::Progress(ContentChunk { progress: Some(p), .. }) if p == 0.5
        ));
        assert!(matches!(
            GenerationEvent::from_message(&message("stream", "tok")),
            GenerationEvent::Token(_)
        ));
        assert!(matches!(
            GenerationEvent::from_message(&message("message", "tok")),
            GenerationEvent::Token(_)
        ));

        let done = GenerationEvent::from_message(&message("complete", r#"{"complete":true}"#));
        assert!(done.is_terminal());

        let failed = GenerationEvent::from_message(&message("error", r#"{"error":"quota"}"#));
        assert_eq!(failed.chunk().error.as_deref(), Some("quota"));
        assert!(failed.is_terminal());

        let other = GenerationEvent::from_message(&message("usage", "{}"));
        assert!(matches!(&other, GenerationEvent::Other { event, .. } if event == "usage"));
        assert!(!other.is_terminal());
    }
}
