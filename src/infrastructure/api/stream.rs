//! # Stream Transport
//!
//! Reads a chat-completion response as a stream of server-sent events,
//! reassembling `data:` frames across chunk boundaries and surfacing
//! text deltas through a caller-supplied callback. Some agent endpoints
//! answer with a plain JSON document instead of an event stream; that
//! shape is detected by content type and handled as a single delta.

use crate::domain::error::ApiError;
use crate::domain::traits::TurnReply;
use futures::StreamExt;
use tracing::{debug, warn};

const DONE_SENTINEL: &str = "[DONE]";

/// Consume an HTTP response as an agent turn, invoking `on_chunk` for
/// each text delta and returning the accumulated reply.
pub async fn consume_response(
    response: reqwest::Response,
    on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
) -> Result<TurnReply, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 401 {
            return Err(ApiError::Auth(format!("Unauthorized: {}", body)));
        }
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("application/json") {
        return consume_document(response, on_chunk).await;
    }

    consume_event_stream(response, on_chunk).await
}

/// Whole-document branch: the endpoint answered in one piece.
async fn consume_document(
    response: reqwest::Response,
    on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
) -> Result<TurnReply, ApiError> {
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::Body(format!("Failed to read response body: {}", e)))?;

    let document: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| ApiError::Body(format!("Malformed JSON response: {}", e)))?;

    let text = extract_delta(&document).unwrap_or_else(|| body.clone());
    let conversation_id = extract_conversation_id(&document);

    on_chunk(&text);
    Ok(TurnReply {
        text,
        document: Some(document),
        conversation_id,
    })
}

/// Event-stream branch: `data:` lines may arrive split across network
/// chunks, so unterminated tails are buffered until the next chunk.
async fn consume_event_stream(
    response: reqwest::Response,
    on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
) -> Result<TurnReply, ApiError> {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut text = String::new();
    let mut conversation_id: Option<String> = None;
    let mut done = false;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ApiError::Body(format!("Stream read failed: {}", e)))?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        // Only complete lines are processed; the tail stays buffered.
        while let Some(newline) = buffer.find('\n') {
            let line: String = buffer.drain(..=newline).collect();
            if handle_line(line.trim_end(), on_chunk, &mut text, &mut conversation_id) {
                done = true;
            }
        }
        if done {
            break;
        }
    }

    if !done && !buffer.trim().is_empty() {
        handle_line(buffer.trim_end(), on_chunk, &mut text, &mut conversation_id);
    }

    Ok(TurnReply {
        text,
        document: None,
        conversation_id,
    })
}

/// Process one event-stream line. Returns true on the end sentinel.
fn handle_line(
    line: &str,
    on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    text: &mut String,
    conversation_id: &mut Option<String>,
) -> bool {
    let Some(payload) = line.strip_prefix("data:") else {
        return false;
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return false;
    }
    if payload == DONE_SENTINEL {
        debug!("Stream finished");
        return true;
    }

    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(frame) => {
            if conversation_id.is_none() {
                *conversation_id = extract_conversation_id(&frame);
            }
            if let Some(delta) = extract_delta(&frame) {
                text.push_str(&delta);
                on_chunk(&delta);
            }
        }
        // Some endpoints emit raw text payloads between JSON frames.
        Err(_) => {
            warn!("Non-JSON stream payload, treating as raw text");
            text.push_str(payload);
            on_chunk(payload);
        }
    }
    false
}

/// Pull the text delta out of a stream frame, tolerating the several
/// field layouts the service has shipped.
fn extract_delta(frame: &serde_json::Value) -> Option<String> {
    for key in ["message", "answer", "content", "text"] {
        if let Some(s) = frame.get(key).and_then(|v| v.as_str()) {
            return Some(s.to_string());
        }
    }
    frame
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn extract_conversation_id(frame: &serde_json::Value) -> Option<String> {
    for key in ["conversation_id", "conversationId"] {
        if let Some(s) = frame.get(key).and_then(|v| v.as_str()) {
            return Some(s.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_lines(lines: &[&str]) -> (String, Option<String>, bool) {
        let mut text = String::new();
        let mut conversation_id = None;
        let mut chunks = Vec::new();
        let mut done = false;
        let mut on_chunk = |s: &str| chunks.push(s.to_string());
        for line in lines {
            if handle_line(line, &mut on_chunk, &mut text, &mut conversation_id) {
                done = true;
            }
        }
        assert_eq!(chunks.concat(), text);
        (text, conversation_id, done)
    }

    #[test]
    fn test_json_frames_accumulate() {
        let (text, _, done) = run_lines(&[
            r#"data: {"message": "Hello "}"#,
            r#"data: {"message": "world"}"#,
            "data: [DONE]",
        ]);
        assert_eq!(text, "Hello world");
        assert!(done);
    }

    #[test]
    fn test_conversation_id_from_first_frame() {
        let (_, id, _) = run_lines(&[
            r#"data: {"conversation_id": "abc", "message": "hi"}"#,
            r#"data: {"conversation_id": "ignored", "message": "!"}"#,
        ]);
        assert_eq!(id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_raw_text_payload_kept() {
        let (text, _, _) = run_lines(&["data: not json at all"]);
        assert_eq!(text, "not json at all");
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let (text, _, done) = run_lines(&["event: ping", "", ": comment"]);
        assert!(text.is_empty());
        assert!(!done);
    }

    #[test]
    fn test_openai_delta_shape() {
        let frame: serde_json::Value = serde_json::from_str(
            r#"{"choices":[{"delta":{"content":"chunk"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_delta(&frame).as_deref(), Some("chunk"));
    }
}
