//! HTTP client for a model server exposing the scoring capabilities as JSON endpoints.
//!
//! | capability | endpoint | request | response |
//! |---|---|---|---|
//! | classify | `POST /classify` | `{text, max_tokens}` | `{star, confidence}` |
//! | explain | `POST /explain` | `{text, max_tokens}` | `{tokens: [{token, weight}]}` |
//! | embed | `POST /embed` | `{texts}` | `{embeddings}` |
//! | zero-shot | `POST /zero-shot` | `{text, labels, multi_label}` | `{scores: {label: p}}` |
//! | translate | `POST /translate` | `{text, source, target}` | `{text}` |

use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::engines::{AttentionExplainer, Embedder, StarClassifier, Translator, ZeroShotScorer};
use crate::error::{ModelError, TranslationFailure};
use crate::taxonomy::Category;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct TextRequest<'a> {
    text: &'a str,
    max_tokens: usize,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    star: u8,
    confidence: f64,
}

#[derive(Deserialize)]
struct TokenWeight {
    token: String,
    weight: f64,
}

#[derive(Deserialize)]
struct ExplainResponse {
    tokens: Vec<TokenWeight>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ZeroShotRequest<'a> {
    text: &'a str,
    labels: Vec<&'a str>,
    multi_label: bool,
}

#[derive(Deserialize)]
struct ZeroShotResponse {
    scores: HashMap<String, f64>,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source: &'a str,
    target: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    text: String,
}

/// Model server client. One instance serves every capability.
pub struct RemoteModel {
    client: Client,
    base_url: String,
}

impl RemoteModel {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::unavailable("http client", e.to_string()))?;
        Ok(RemoteModel {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        service: &'static str,
        path: &str,
        body: &Req,
    ) -> Result<Resp, ModelError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| ModelError::unavailable(service, e.to_string()))?;
        if !response.status().is_success() {
            return Err(ModelError::unavailable(
                service,
                format!("{url} answered {}", response.status()),
            ));
        }
        response
            .json()
            .map_err(|e| ModelError::invalid_output(service, e.to_string()))
    }
}

impl StarClassifier for RemoteModel {
    fn classify(&self, text: &str, max_tokens: usize) -> Result<(u8, f64), ModelError> {
        let r: ClassifyResponse =
            self.post("classifier", "classify", &TextRequest { text, max_tokens })?;
        Ok((r.star, r.confidence))
    }
}

impl AttentionExplainer for RemoteModel {
    fn attention(&self, text: &str, max_tokens: usize) -> Result<Vec<(String, f64)>, ModelError> {
        let r: ExplainResponse =
            self.post("explainer", "explain", &TextRequest { text, max_tokens })?;
        Ok(r.tokens.into_iter().map(|t| (t.token, t.weight)).collect())
    }
}

impl Embedder for RemoteModel {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        let r: EmbedResponse = self.post("embedder", "embed", &EmbedRequest { texts })?;
        Ok(r.embeddings)
    }
}

impl ZeroShotScorer for RemoteModel {
    fn score_categories(
        &self,
        text: &str,
        categories: &[Category],
    ) -> Result<HashMap<String, f64>, ModelError> {
        let request = ZeroShotRequest {
            text,
            labels: categories.iter().map(|c| c.name.as_str()).collect(),
            multi_label: true,
        };
        let r: ZeroShotResponse = self.post("zero-shot", "zero-shot", &request)?;
        Ok(r.scores)
    }
}

impl Translator for RemoteModel {
    fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslationFailure> {
        let r: TranslateResponse = self
            .post("translator", "translate", &TranslateRequest { text, source, target })
            .map_err(|e| TranslationFailure(e.to_string()))?;
        Ok(r.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serves one canned JSON answer and returns the request body it received.
    fn serve_once(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();
            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            String::from_utf8(request_body).unwrap()
        });
        (url, handle)
    }

    #[test]
    fn classify_round_trips_over_http() {
        let (url, server) = serve_once("200 OK", r#"{"star": 4, "confidence": 0.83}"#);
        let model = RemoteModel::new(&url, DEFAULT_TIMEOUT).unwrap();
        assert_eq!(model.classify("tasty", 128).unwrap(), (4, 0.83));
        let sent: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
        assert_eq!(sent["text"], "tasty");
        assert_eq!(sent["max_tokens"], 128);
    }

    #[test]
    fn server_error_is_unavailable() {
        let (url, server) = serve_once("503 Service Unavailable", "{}");
        let model = RemoteModel::new(&url, DEFAULT_TIMEOUT).unwrap();
        let err = model.classify("tasty", 128).unwrap_err();
        assert!(matches!(err, ModelError::Unavailable { .. }));
        server.join().unwrap();
    }

    #[test]
    fn garbage_answer_is_invalid_output() {
        let (url, server) = serve_once("200 OK", r#"{"embeddings": "nope"}"#);
        let model = RemoteModel::new(&url, DEFAULT_TIMEOUT).unwrap();
        let err = model.embed(&["x".to_string()]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidOutput { .. }));
        server.join().unwrap();
    }

    #[test]
    fn refused_connection_is_unavailable_and_translation_degrades() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let model = RemoteModel::new(&format!("http://127.0.0.1:{port}/"), DEFAULT_TIMEOUT).unwrap();
        assert_eq!(model.base_url(), format!("http://127.0.0.1:{port}"));
        assert!(matches!(
            model.classify("x", 8),
            Err(ModelError::Unavailable { .. })
        ));
        assert!(model.translate("مرحبا", "auto", "en").is_err());
    }
}
