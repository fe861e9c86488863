//! Gemini `generateContent` client implementing both collaborator traits.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::config::LlmConfig;
use crate::error::CollaboratorError;
use crate::legal::chat::ChatRole;
use crate::llm::{ExtractionResponse, HistoryTurn, LegalAssistant, RiskExtractor};

const LEGAL_SYSTEM_INSTRUCTION: &str = "You are LexAI, a senior Legal Operations analyst \
specialised in auditing complex contracts. Focus on abusive penalties, foreign venue clauses, \
termination loopholes and LGPD (Brazilian data protection) compliance. Always answer with \
legal precision and a professional tone.";

const EXTRACTION_PROMPT: &str = "Analyse this contract excerpt and extract 3 real legal risks. \
For each risk give a short clause title, an explanation, a severity (high, medium or low) and \
highlightText: a passage copied verbatim from the contract. Also give a one-paragraph summary.";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

fn extraction_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "risks": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "clause": { "type": "STRING" },
                        "description": { "type": "STRING" },
                        "severity": { "type": "STRING", "enum": ["low", "medium", "high"] },
                        "highlightText": { "type": "STRING" }
                    },
                    "required": ["clause", "description", "severity", "highlightText"]
                }
            },
            "summary": { "type": "STRING" }
        }
    })
}

fn build_extraction_request(content: &str) -> serde_json::Value {
    json!({
        "systemInstruction": { "parts": [{ "text": LEGAL_SYSTEM_INSTRUCTION }] },
        "contents": [{
            "role": "user",
            "parts": [{ "text": format!("{EXTRACTION_PROMPT}\nContract: {content}") }]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": extraction_schema()
        }
    })
}

fn build_chat_request(history: &[HistoryTurn], message: &str, context: &str) -> serde_json::Value {
    let mut contents: Vec<serde_json::Value> = history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            };
            json!({ "role": role, "parts": [{ "text": turn.content }] })
        })
        .collect();
    contents.push(json!({ "role": "user", "parts": [{ "text": message }] }));

    json!({
        "systemInstruction": {
            "parts": [{ "text": format!("{LEGAL_SYSTEM_INSTRUCTION}\nContext: {context}") }]
        },
        "contents": contents
    })
}

/// Concatenate the text parts of the first candidate.
fn response_text(raw: &[u8]) -> Result<String, CollaboratorError> {
    let response: GenerateResponse = serde_json::from_slice(raw)
        .map_err(|e| CollaboratorError::Malformed(format!("unexpected response shape: {e}")))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(CollaboratorError::EmptyResponse);
    }
    Ok(text)
}

fn parse_extraction(text: &str) -> Result<ExtractionResponse, CollaboratorError> {
    serde_json::from_str(text)
        .map_err(|e| CollaboratorError::Malformed(format!("extraction is not valid JSON: {e}")))
}

fn generate_endpoint(base: &Url, model: &str) -> Result<Url, CollaboratorError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(&format!("v1beta/models/{model}:generateContent"))
        .map_err(|e| CollaboratorError::NotConfigured(format!("invalid model endpoint: {e}")))
}

/// HTTP client for the Gemini API.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: Option<SecretString>,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, CollaboratorError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                CollaboratorError::Transport(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            endpoint: generate_endpoint(&config.base_url, &config.model)?,
            api_key: config.api_key.clone(),
        })
    }

    async fn generate(&self, body: &serde_json::Value) -> Result<String, CollaboratorError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            CollaboratorError::NotConfigured("GEMINI_API_KEY is not set".to_string())
        })?;

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollaboratorError::Timeout
                } else {
                    CollaboratorError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let raw = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                CollaboratorError::Timeout
            } else {
                CollaboratorError::Transport(format!("failed to read response body: {e}"))
            }
        })?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&raw);
            let body: String = body.chars().take(512).collect();
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response_text(&raw)
    }
}

#[async_trait]
impl RiskExtractor for GeminiClient {
    async fn extract(&self, content: &str) -> Result<ExtractionResponse, CollaboratorError> {
        let text = self.generate(&build_extraction_request(content)).await?;
        parse_extraction(&text)
    }
}

#[async_trait]
impl LegalAssistant for GeminiClient {
    async fn reply(
        &self,
        history: &[HistoryTurn],
        message: &str,
        context: &str,
    ) -> Result<String, CollaboratorError> {
        self.generate(&build_chat_request(history, message, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_model_path() {
        let base = Url::parse("https://generativelanguage.googleapis.com").expect("url");
        let url = generate_endpoint(&base, "gemini-3-flash-preview").expect("endpoint");
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-flash-preview:generateContent"
        );

        let proxied = Url::parse("http://localhost:8080/proxy").expect("url");
        let url = generate_endpoint(&proxied, "m").expect("endpoint");
        assert_eq!(url.as_str(), "http://localhost:8080/proxy/v1beta/models/m:generateContent");
    }

    #[test]
    fn chat_request_maps_roles_and_appends_message() {
        let history = vec![
            HistoryTurn {
                role: ChatRole::User,
                content: "Is clause 4.2 valid?".to_string(),
            },
            HistoryTurn {
                role: ChatRole::Assistant,
                content: "It is likely abusive.".to_string(),
            },
        ];
        let body = build_chat_request(&history, "And clause 12?", "CONTRATO");
        let contents = body["contents"].as_array().expect("contents");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "And clause 12?");
        let system = body["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .expect("system text");
        assert!(system.ends_with("Context: CONTRATO"));
    }

    #[test]
    fn extraction_request_constrains_severity() {
        let body = build_extraction_request("texto");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        let severity = &body["generationConfig"]["responseSchema"]["properties"]["risks"]["items"]
            ["properties"]["severity"];
        assert_eq!(severity["enum"], json!(["low", "medium", "high"]));
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let raw = br#"{"candidates":[{"content":{"parts":[{"text":"{\"risks\":"},{"text":"[]}"}]}}]}"#;
        assert_eq!(response_text(raw).expect("text"), "{\"risks\":[]}");
    }

    #[test]
    fn response_without_text_is_empty() {
        assert_eq!(
            response_text(br#"{"candidates":[]}"#),
            Err(CollaboratorError::EmptyResponse)
        );
        assert!(matches!(
            response_text(b"<html>"),
            Err(CollaboratorError::Malformed(_))
        ));
    }

    #[test]
    fn extraction_parses_partial_payloads() {
        let parsed = parse_extraction(
            r#"{"risks":[{"clause":"4.2","severity":"high","highlightText":"multa"}],"summary":"s"}"#,
        )
        .expect("parsed");
        let risks = parsed.risks.expect("risks");
        assert_eq!(risks[0].description, None);
        assert_eq!(risks[0].severity.as_deref(), Some("high"));
        assert!(parse_extraction("not json").is_err());
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_network() {
        let config = LlmConfig {
            model: "m".to_string(),
            base_url: Url::parse("http://127.0.0.1:9").expect("url"),
            request_timeout: std::time::Duration::from_secs(1),
            api_key: None,
        };
        let client = GeminiClient::new(&config).expect("client");
        let err = client.extract("texto").await.expect_err("must fail");
        assert!(matches!(err, CollaboratorError::NotConfigured(_)));
    }
}
