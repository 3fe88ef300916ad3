//! Blocking HTTP client for happypicsd, plus the cached session id.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use happypics_core::charts::{ConfidencePoint, ProportionSlice, TrendSeries};
use happypics_core::EmotionLabel;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const SESSION_HEADER: &str = "x-happypics-session";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toggles {
    #[serde(default)]
    pub confidence: bool,
    #[serde(default)]
    pub proportions: bool,
    #[serde(default)]
    pub trends: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    pub position: usize,
    pub emotion: EmotionLabel,
    pub score: f32,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Charts {
    pub confidence: Option<Vec<ConfidencePoint>>,
    pub proportions: Option<Vec<ProportionSlice>>,
    pub trends: Option<Vec<TrendSeries>>,
}

#[derive(Debug, Deserialize)]
pub struct Page {
    pub mode: String,
    pub identity: Option<String>,
    pub toggles: Toggles,
    pub history: Vec<HistoryEntry>,
    pub charts: Charts,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Detected {
        emotion: EmotionLabel,
        score: f32,
        stored: bool,
    },
    NoFace,
    Failed {
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeReply {
    pub outcome: Outcome,
    pub message: String,
    pub warning: Option<String>,
    pub page: Page,
}

#[derive(Debug, Deserialize)]
pub struct Cleared {
    pub removed: usize,
    pub page: Page,
}

#[derive(Debug, Deserialize)]
pub struct Health {
    pub version: String,
    pub mode: String,
    pub models_loaded: bool,
    pub sessions: usize,
}

#[derive(Deserialize)]
struct Message {
    message: String,
}

#[derive(Deserialize)]
struct SessionCreated {
    session_id: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Where the session id survives between invocations.
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_DATA_HOME/happypics/session` or the platform equivalent.
    pub fn default_location() -> Self {
        let dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join("happypics");
        Self::new(dir.join("session"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<String> {
        let id = std::fs::read_to_string(&self.path).ok()?;
        let id = id.trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    pub fn store(&self, id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        std::fs::write(&self.path, id)
            .with_context(|| format!("cannot write {}", self.path.display()))
    }

    pub fn forget(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub struct Client {
    base: String,
    agent: ureq::Agent,
}

impl Client {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub fn health(&self) -> Result<Health> {
        read(self.agent.get(&self.url("/healthz")).call())
    }

    /// Reuse the cached session when the service still knows it, otherwise
    /// start a new one and cache its id.
    pub fn session(&self, cache: &SessionCache) -> Result<Session<'_>> {
        if let Some(id) = cache.load() {
            let known = self
                .agent
                .get(&self.url("/v1/page"))
                .set(SESSION_HEADER, &id)
                .call();
            match known {
                Err(ureq::Error::Status(404, _)) | Err(ureq::Error::Status(400, _)) => {
                    tracing::debug!(session = %id, "cached session expired");
                    cache.forget();
                }
                Ok(_) | Err(ureq::Error::Status(_, _)) => {
                    return Ok(Session { client: self, id });
                }
                Err(e) => return Err(transport(e)),
            }
        }

        let created: SessionCreated = read(self.agent.post(&self.url("/v1/session")).call())?;
        cache.store(&created.session_id)?;
        tracing::debug!(session = %created.session_id, "session started");
        Ok(Session {
            client: self,
            id: created.session_id,
        })
    }
}

/// One server-side session. Every call carries its id.
pub struct Session<'a> {
    client: &'a Client,
    id: String,
}

impl Session<'_> {
    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.client
            .agent
            .request(method, &self.client.url(path))
            .set(SESSION_HEADER, &self.id)
    }

    pub fn analyze(&self, upload: &[u8]) -> Result<AnalyzeReply> {
        read(
            self.request("POST", "/v1/analyze")
                .set("Content-Type", "application/octet-stream")
                .send_bytes(upload),
        )
    }

    pub fn page(&self) -> Result<Page> {
        read(self.request("GET", "/v1/page").call())
    }

    pub fn set_charts(&self, toggles: Toggles) -> Result<Page> {
        read(self.request("PUT", "/v1/charts").send_json(toggles))
    }

    pub fn clear(&self) -> Result<Cleared> {
        read(self.request("DELETE", "/v1/history").call())
    }

    pub fn signup(&self, email: &str, password: &str) -> Result<String> {
        let reply: Message = read(
            self.request("POST", "/v1/signup")
                .send_json(Credentials { email, password }),
        )?;
        Ok(reply.message)
    }

    pub fn login(&self, email: &str, password: &str) -> Result<Page> {
        read(
            self.request("POST", "/v1/login")
                .send_json(Credentials { email, password }),
        )
    }

    pub fn logout(&self) -> Result<Page> {
        read(self.request("POST", "/v1/logout").call())
    }
}

fn read<T: DeserializeOwned>(response: Result<ureq::Response, ureq::Error>) -> Result<T> {
    match response {
        Ok(resp) => resp.into_json::<T>().context("unexpected response from happypicsd"),
        Err(ureq::Error::Status(code, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            Err(anyhow!(error_message(&body, code)))
        }
        Err(e) => Err(transport(e)),
    }
}

fn transport(e: ureq::Error) -> anyhow::Error {
    anyhow!(e).context("cannot reach happypicsd (is it running? see --server)")
}

/// The service's `{"error": ...}` text, or a generic line for anything else.
fn error_message(body: &str, status: u16) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| format!("happypicsd returned status {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(dir.path().join("nested/session"));
        assert_eq!(cache.load(), None);
        cache.store("0b7c9a40-2f6e-4c55-9a55-3b2d3c1f8e11").unwrap();
        assert_eq!(cache.load().as_deref(), Some("0b7c9a40-2f6e-4c55-9a55-3b2d3c1f8e11"));
        cache.forget();
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn test_session_cache_ignores_blank_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(dir.path().join("session"));
        std::fs::write(cache.path(), "  \n").unwrap();
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"error":"please log in first"}"#, 401), "please log in first");
        assert_eq!(error_message("", 502), "happypicsd returned status 502");
    }

    #[test]
    fn test_parse_analyze_reply() {
        let body = r#"{
            "outcome": {"kind": "detected", "emotion": "happy", "score": 0.9, "stored": true},
            "message": "Detected emotion: happy with confidence 0.90",
            "page": {
                "mode": "volatile",
                "toggles": {"confidence": false, "proportions": true, "trends": false},
                "history": [{"position": 1, "emotion": "happy", "score": 0.9,
                             "recorded_at": "2026-10-19T12:00:00Z"}],
                "charts": {"proportions": [{"emotion": "happy", "count": 1, "percent": 100.0}]}
            }
        }"#;
        let reply: AnalyzeReply = serde_json::from_str(body).unwrap();
        assert!(matches!(reply.outcome, Outcome::Detected { stored: true, .. }));
        assert!(reply.warning.is_none());
        assert!(reply.page.identity.is_none());
        assert_eq!(reply.page.history.len(), 1);
        assert!(reply.page.charts.confidence.is_none());
        assert_eq!(reply.page.charts.proportions.unwrap()[0].count, 1);
    }

    #[test]
    fn test_parse_no_face() {
        let outcome: Outcome = serde_json::from_str(r#"{"kind":"no_face"}"#).unwrap();
        assert!(matches!(outcome, Outcome::NoFace));
    }

    #[test]
    fn test_unreachable_server_is_an_error() {
        let client = Client::new("http://127.0.0.1:9/");
        assert!(client.health().is_err());
    }
}
