use crate::config::AppConfig;
use crate::error::AppError;
use crate::metadata::AnnotationResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

pub const PROMPT: &str = "What is in this image?";
pub const MIN_TAGS: usize = 1;
pub const MAX_TAGS: usize = 10;

/// Client for the model service's `/api/generate` call with a structured output schema.
pub struct OllamaClient {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    temperature: f64,
    timeout: Duration,
}

#[derive(Serialize, Debug)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    temperature: f64,
    images: Vec<String>, // base64 encoded
    format: Value,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    response: String,
}

/// JSON schema the model's answer is constrained to.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "required": ["image_information"],
        "properties": {
            "image_information": {
                "type": "object",
                "description": "Information about the image.",
                "required": ["detailed_description", "tags", "title"],
                "properties": {
                    "detailed_description": {
                        "type": "string",
                        "description": "A detailed description what is in the image."
                    },
                    "tags": {
                        "type": "array",
                        "minItems": MIN_TAGS,
                        "maxItems": MAX_TAGS,
                        "items": {
                            "type": "string",
                            "description": "Word or small text that categorizes the image."
                        }
                    },
                    "title": {
                        "type": "string",
                        "description": "A short and descriptive title for the image."
                    }
                }
            }
        }
    })
}

impl OllamaClient {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let endpoint = config.generate_endpoint().map_err(|e| {
            AppError::Config(config::ConfigError::Message(format!(
                "invalid model endpoint: {}",
                e
            )))
        })?;
        log::debug!("Creating model client for endpoint: {}", endpoint);
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            model: config.image_model.clone(),
            temperature: config.temperature,
            timeout: config.request_timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one image and returns the validated structured answer.
    ///
    /// No retries: the first transport, status or schema failure is returned.
    pub async fn generate(&self, image_b64: String) -> Result<AnnotationResult, AppError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: PROMPT,
            stream: false,
            temperature: self.temperature,
            images: vec![image_b64],
            format: response_schema(),
        };

        log::debug!(
            "POST to '{}' with model '{}' (temperature {})",
            self.endpoint,
            self.model,
            self.temperature
        );
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "error reading response body".to_string());
            return Err(AppError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let raw = response.bytes().await?;
        log::trace!("Model service returned {} bytes", raw.len());
        parse_answer(&raw)
    }
}

/// Decodes the envelope and then the answer text inside it.
fn parse_answer(raw: &[u8]) -> Result<AnnotationResult, AppError> {
    let envelope: GenerateResponse = serde_json::from_slice(raw)
        .map_err(|e| AppError::SchemaViolation(format!("invalid response envelope: {}", e)))?;
    let answer: AnnotationResult = serde_json::from_str(&envelope.response)
        .map_err(|e| AppError::SchemaViolation(format!("invalid answer: {}", e)))?;

    // blank entries would vanish during normalization, so they do not count
    let tags = &answer.image_information.tags;
    let usable = tags.iter().filter(|tag| !tag.trim().is_empty()).count();
    if usable < MIN_TAGS || tags.len() > MAX_TAGS {
        return Err(AppError::SchemaViolation(format!(
            "expected {} to {} tags, got {}",
            MIN_TAGS,
            MAX_TAGS,
            tags.len()
        )));
    }
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn envelope(answer: &str) -> Value {
        json!({ "model": "llama3.2-vision", "response": answer, "done": true })
    }

    #[test]
    fn schema_requires_image_information_fields() {
        let schema = response_schema();
        assert_eq!(schema["required"], json!(["image_information"]));
        let info = &schema["properties"]["image_information"];
        assert_eq!(info["required"], json!(["detailed_description", "tags", "title"]));
        assert_eq!(info["properties"]["tags"]["minItems"], 1);
        assert_eq!(info["properties"]["tags"]["maxItems"], 10);
    }

    #[test]
    fn request_serialization() {
        let request = GenerateRequest {
            model: "llava",
            prompt: PROMPT,
            stream: false,
            temperature: 0.3,
            images: vec!["base64data".to_string()],
            format: response_schema(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "llava");
        assert_eq!(value["prompt"], "What is in this image?");
        assert_eq!(value["stream"], false);
        assert_eq!(value["images"][0], "base64data");
        assert_eq!(value["format"]["type"], "object");
    }

    #[test]
    fn parses_nested_answer() {
        let raw = envelope(
            r#"{"image_information":{"title":"Cat","detailed_description":"A cat.","tags":["Cat"]}}"#,
        )
        .to_string();
        let result = parse_answer(raw.as_bytes()).unwrap();
        assert_eq!(result.image_information.title, "Cat");
        assert_eq!(result.image_information.tags, vec!["Cat"]);
        assert_eq!(result.filename, "");
    }

    #[test]
    fn rejects_non_json_answer() {
        let raw = envelope("It is a cat.").to_string();
        assert!(matches!(
            parse_answer(raw.as_bytes()),
            Err(AppError::SchemaViolation(_))
        ));
    }

    #[test]
    fn rejects_answer_missing_required_fields() {
        for answer in [
            r#"{"image_information":{"detailed_description":"A cat.","tags":["cat"]}}"#,
            r#"{"image_information":{"title":"Cat","tags":["cat"]}}"#,
            r#"{"image_information":{"title":"Cat","detailed_description":"A cat."}}"#,
            r#"{"title":"Cat"}"#,
        ] {
            let raw = envelope(answer).to_string();
            assert!(
                matches!(parse_answer(raw.as_bytes()), Err(AppError::SchemaViolation(_))),
                "accepted {}",
                answer
            );
        }
    }

    #[test]
    fn rejects_answer_with_tag_count_out_of_bounds() {
        let too_many: Vec<String> = (0..=MAX_TAGS).map(|i| format!("tag{}", i)).collect();
        for tags in [json!([]), json!(["", "  "]), json!(too_many)] {
            let answer = json!({
                "image_information": {
                    "title": "x",
                    "detailed_description": "y",
                    "tags": tags.clone()
                }
            });
            let raw = envelope(&answer.to_string()).to_string();
            assert!(
                matches!(parse_answer(raw.as_bytes()), Err(AppError::SchemaViolation(_))),
                "accepted tags {}",
                tags
            );
        }
    }

    #[test]
    fn ignores_file_facts_echoed_by_the_model() {
        let raw = envelope(
            r#"{"filename":7,"filesize":"12 KB","file_modification_time":null,
                "image_information":{"title":"Cat","detailed_description":"A cat.","tags":["cat"]}}"#,
        )
        .to_string();
        let result = parse_answer(raw.as_bytes()).unwrap();
        assert_eq!(result.filesize, 0);
        assert_eq!(result.filename, "");
        assert_eq!(result.file_modification_time, "");
    }

    #[test]
    fn rejects_envelope_without_response() {
        assert!(matches!(
            parse_answer(br#"{"error":"model is loading"}"#),
            Err(AppError::SchemaViolation(_))
        ));
    }

    #[tokio::test]
    async fn posts_structured_request_to_generate_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "llama3.2-vision",
                "prompt": "What is in this image?",
                "stream": false,
                "temperature": 0.3,
                "images": ["aW1hZ2U="],
                "format": response_schema(),
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
                r#"{"image_information":{"title":"Dog","detailed_description":"A dog.","tags":["dog"]}}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let config = AppConfig::for_catalog(Path::new("/tmp"), &server.uri());
        let client = OllamaClient::new(&config).unwrap();
        let result = client.generate("aW1hZ2U=".to_string()).await.unwrap();
        assert_eq!(result.image_information.title, "Dog");
    }

    #[tokio::test]
    async fn non_success_status_carries_code_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let config = AppConfig::for_catalog(Path::new("/tmp"), &server.uri());
        let client = OllamaClient::new(&config).unwrap();
        match client.generate(String::new()).await {
            Err(AppError::UpstreamStatus { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "model not found");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        // nothing listens on port 9 locally
        let config = AppConfig::for_catalog(Path::new("/tmp"), "http://127.0.0.1:9");
        let client = OllamaClient::new(&config).unwrap();
        assert!(matches!(
            client.generate(String::new()).await,
            Err(AppError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn slow_service_is_cut_off_by_the_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(
                        r#"{"image_information":{"title":"Dog","detailed_description":"A dog.","tags":["dog"]}}"#,
                    ))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut config = AppConfig::for_catalog(Path::new("/tmp"), &server.uri());
        config.request_timeout = Duration::from_millis(200);
        let client = OllamaClient::new(&config).unwrap();

        match client.generate(String::new()).await {
            Err(AppError::Transport(e)) => assert!(e.is_timeout(), "not a timeout: {}", e),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
