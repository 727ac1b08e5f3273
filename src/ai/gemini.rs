use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// System instruction for the general assistant tab.
pub const ASSISTANT_PERSONA: &str = "You are Nexus, a friendly and knowledgeable AI learning \
    assistant. Answer questions clearly and concisely, and encourage curiosity.";

/// System instruction for the tutor tab.
pub const TUTOR_PERSONA: &str = "You are an AI Tutor who teaches using the Socratic method. \
    Rather than giving answers outright, guide the learner with probing questions that help \
    them reason their way to understanding.";

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct GenerateRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    contents: Vec<Content>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, "https://generativelanguage.googleapis.com")
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Open a streaming generation request. Returns once the handshake has
    /// succeeded; chunks are then pulled with [`ChunkStream::next_chunk`].
    pub async fn open_stream(
        &self,
        model: &str,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<ChunkStream> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        );

        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error {}: {}", status, text));
        }

        Ok(ChunkStream {
            response,
            buffer: LineBuffer::new(),
        })
    }
}

/// Incremental reader over the SSE response body. Events are framed as
/// `data: {json}` lines; a network read may end mid-line, so incomplete
/// tails are carried over until the next read.
pub struct ChunkStream {
    response: reqwest::Response,
    buffer: LineBuffer,
}

impl ChunkStream {
    /// Next piece of generated text, or `None` when the stream has ended.
    pub async fn next_chunk(&mut self) -> Result<Option<String>> {
        loop {
            // Drain any complete line already buffered.
            while let Some(line) = self.buffer.next_line() {
                if let Some(text) = parse_sse_line(&line) {
                    if !text.is_empty() {
                        return Ok(Some(text));
                    }
                }
            }

            match self.response.chunk().await? {
                Some(bytes) => self.buffer.extend(&bytes),
                None => {
                    // Stream closed; a final unterminated line may remain.
                    if let Some(line) = self.buffer.take_remainder() {
                        if let Some(text) = parse_sse_line(&line) {
                            if !text.is_empty() {
                                return Ok(Some(text));
                            }
                        }
                    }
                    return Ok(None);
                }
            }
        }
    }
}

/// Byte-level line accumulator. Network reads can split a multi-byte UTF-8
/// codepoint, so carry-over stays as raw bytes and decoding happens only on
/// complete lines.
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<String> {
        let newline = self.bytes.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=newline).collect();
        Some(String::from_utf8_lossy(&line).trim_end().to_string())
    }

    fn take_remainder(&mut self) -> Option<String> {
        if self.bytes.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.bytes);
        Some(String::from_utf8_lossy(&rest).trim_end().to_string())
    }
}

/// Extract the generated text from one SSE line, if it carries any.
fn parse_sse_line(line: &str) -> Option<String> {
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    let response: GenerateResponse = serde_json::from_str(payload).ok()?;
    let text: String = response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect();
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_from_data_line() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Gravity "}]}}]}"#;
        assert_eq!(parse_sse_line(line).as_deref(), Some("Gravity "));
    }

    #[test]
    fn concatenates_multiple_parts() {
        let line =
            r#"data: {"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}}]}"#;
        assert_eq!(parse_sse_line(line).as_deref(), Some("ab"));
    }

    #[test]
    fn ignores_non_data_lines() {
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("event: ping").is_none());
        assert!(parse_sse_line("data:").is_none());
        assert!(parse_sse_line("data: [DONE]").is_none());
    }

    #[test]
    fn tolerates_candidates_without_content() {
        let line = r#"data: {"candidates":[{"finishReason":"STOP"}]}"#;
        assert!(parse_sse_line(line).is_none());
    }

    #[test]
    fn reassembles_codepoint_split_across_reads() {
        let payload = r#"data: {"candidates":[{"content":{"parts":[{"text":"café"}]}}]}"#;
        let bytes = format!("{payload}\n").into_bytes();
        // Split between the two bytes encoding 'é'.
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buffer = LineBuffer::new();
        buffer.extend(&bytes[..split]);
        assert!(buffer.next_line().is_none());
        buffer.extend(&bytes[split..]);

        let line = buffer.next_line().unwrap();
        assert_eq!(parse_sse_line(&line).as_deref(), Some("café"));
        assert!(buffer.take_remainder().is_none());
    }

    #[test]
    fn unterminated_tail_line_surfaces_on_close() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"end\"}]}}]}");
        assert!(buffer.next_line().is_none());
        let line = buffer.take_remainder().unwrap();
        assert_eq!(parse_sse_line(&line).as_deref(), Some("end"));
    }
}
