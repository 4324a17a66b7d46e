//! HTTP artifact store client
//!
//! Thin client over the REST store API. The server is trusted for atomicity;
//! status codes map onto store errors (404 -> not found, 500 -> internal).

use once_cell::sync::Lazy;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::kind::ArtifactKind;
use crate::store::{ArtifactStore, Scope, validate_identifier, validate_scope};

const API_PREFIX: &str = "/api";
const CONFLICT: u16 = 409;

// ureq::Agent is thread-safe and pools connections; share one per process.
static HTTP_AGENT: Lazy<Arc<ureq::Agent>> = Lazy::new(|| {
    Arc::new(
        ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .build(),
    )
});

/// Artifact store backed by a remote REST service
#[derive(Debug, Clone)]
pub struct HttpStore {
    base: String,
    agent: Arc<ureq::Agent>,
}

impl HttpStore {
    /// Create a client for a server at `base` (e.g. `http://localhost:8080`)
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            agent: Arc::clone(&HTTP_AGENT),
        }
    }

    /// Base URL of the server
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Check server liveness via `GET /api/healthz`
    ///
    /// # Errors
    ///
    /// Returns a transport or status error if the server is not healthy.
    pub fn health(&self) -> Result<()> {
        let url = self.url(&["healthz"]);
        self.agent.get(&url).call().map_err(map_error)?;
        Ok(())
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = format!("{}{API_PREFIX}", self.base);
        for segment in segments {
            url.push('/');
            url.push_str(segment);
        }
        url
    }

    fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.agent.get(url).call().map_err(map_error)?;
        Ok(response.into_json()?)
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self.agent.post(url).send_json(body).map_err(map_error)?;
        let text = response.into_string()?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn post_idempotent(&self, url: &str, body: &Value) -> Result<()> {
        match self.post_json(url, body) {
            Ok(_) => Ok(()),
            Err(Error::Http { status, .. }) if status == CONFLICT => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn not_found_as(err: Error, kind: &str, identifier: &str) -> Error {
        if err.is_not_found() {
            Error::not_found(kind, identifier)
        } else {
            err
        }
    }
}

fn map_error(err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response
                .into_string()
                .unwrap_or_else(|_| String::from("<unreadable body>"));
            match status {
                404 => Error::NotFound {
                    kind: "resource".to_string(),
                    identifier: message,
                },
                500 => Error::Internal(message),
                _ => Error::Http { status, message },
            }
        }
        ureq::Error::Transport(transport) => Error::Transport(transport.to_string()),
    }
}

fn string_list(value: Value) -> Result<Vec<String>> {
    let mut items: Vec<String> = serde_json::from_value(value)?;
    items.sort();
    Ok(items)
}

impl ArtifactStore for HttpStore {
    fn create_model(&self, model: &str) -> Result<()> {
        validate_identifier(model)?;
        self.post_idempotent(&self.url(&["model"]), &json!({ "identifier": model }))
    }

    fn create_version(&self, model: &str, version: &str) -> Result<()> {
        validate_identifier(model)?;
        validate_identifier(version)?;
        self.post_idempotent(
            &self.url(&["model", model, "version"]),
            &json!({ "identifier": version }),
        )
    }

    fn list_models(&self) -> Result<Vec<String>> {
        string_list(self.get_json(&self.url(&["model"]))?)
    }

    fn list_versions(&self, model: &str) -> Result<Vec<String>> {
        validate_identifier(model)?;
        self.get_json(&self.url(&["model", model, "version"]))
            .map_err(|e| Self::not_found_as(e, "model", model))
            .and_then(string_list)
    }

    fn write(
        &self,
        scope: &Scope,
        kind: ArtifactKind,
        identifier: &str,
        model: &Value,
    ) -> Result<Value> {
        validate_scope(scope)?;
        validate_identifier(identifier)?;
        let url = self.url(&[kind.as_str(), &scope.model, &scope.version]);
        let body = json!({
            "identifier": identifier,
            "parents": true,
            "artifact": model,
        });
        let response = self.post_json(&url, &body)?;
        tracing::debug!(%url, %identifier, "posted artifact");
        Ok(match response {
            Value::Object(mut map) if map.contains_key("artifact") => {
                map.remove("artifact").unwrap_or(Value::Null)
            }
            Value::Null => model.clone(),
            other => other,
        })
    }

    fn read(&self, scope: &Scope, kind: ArtifactKind, identifier: &str) -> Result<Value> {
        validate_scope(scope)?;
        validate_identifier(identifier)?;
        let url = self.url(&[kind.as_str(), &scope.model, &scope.version, identifier]);
        self.get_json(&url)
            .map_err(|e| Self::not_found_as(e, kind.as_str(), identifier))
    }

    fn list(&self, scope: &Scope, kind: ArtifactKind) -> Result<Vec<String>> {
        validate_scope(scope)?;
        let url = self.url(&[kind.as_str(), &scope.model, &scope.version]);
        match self.get_json(&url) {
            Ok(value) => string_list(value),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn delete(&self, scope: &Scope, kind: ArtifactKind, identifier: &str) -> Result<()> {
        validate_scope(scope)?;
        validate_identifier(identifier)?;
        let url = self.url(&[kind.as_str(), &scope.model, &scope.version, identifier]);
        self.agent
            .delete(&url)
            .call()
            .map_err(map_error)
            .map_err(|e| Self::not_found_as(e, kind.as_str(), identifier))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one canned response per incoming connection, returning the
    /// request lines that were received.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream.try_clone().expect("clone"));
                let mut request_line = String::new();
                reader.read_line(&mut request_line).expect("read");
                let mut content_length = 0usize;
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).expect("header");
                    if header.trim().is_empty() {
                        break;
                    }
                    let lower = header.to_ascii_lowercase();
                    if let Some(v) = lower.strip_prefix("content-length:") {
                        content_length = v.trim().parse().expect("length");
                    }
                }
                let mut body_buf = vec![0u8; content_length];
                reader.read_exact(&mut body_buf).expect("body");
                seen.push(request_line.trim().to_string());
                let mut stream = stream;
                let reply = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).expect("reply");
            }
            seen
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn test_url_building() {
        let store = HttpStore::new("http://localhost:8080/");
        assert_eq!(store.base(), "http://localhost:8080");
        assert_eq!(
            store.url(&["evidence", "m", "v", "t.evidence"]),
            "http://localhost:8080/api/evidence/m/v/t.evidence"
        );
    }

    #[test]
    fn test_read_maps_status_codes() {
        let (base, server) = serve(vec![
            (200, r#"{"type":"integer"}"#),
            (404, "missing"),
            (500, "boom"),
        ]);
        let store = HttpStore::new(base);
        let scope = Scope::new("m", "v");

        let value = store
            .read(&scope, ArtifactKind::Evidence, "t.evidence")
            .expect("read");
        assert_eq!(value["type"], "integer");

        let err = store
            .read(&scope, ArtifactKind::Evidence, "t.evidence")
            .unwrap_err();
        assert!(err.is_not_found());

        let err = store
            .read(&scope, ArtifactKind::Evidence, "t.evidence")
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));

        let seen = server.join().expect("join");
        assert!(seen[0].starts_with("GET /api/evidence/m/v/t.evidence"));
    }

    #[test]
    fn test_write_list_delete_paths() {
        let (base, server) = serve(vec![
            (200, r#"{"artifact":{"x":1}}"#),
            (200, r#"["b","a"]"#),
            (200, "{}"),
            (200, "ok"),
        ]);
        let store = HttpStore::new(base);
        let scope = Scope::new("m", "v");

        let written = store
            .write(&scope, ArtifactKind::TestSuite, "suite", &json!({"x": 1}))
            .expect("write");
        assert_eq!(written, json!({"x": 1}));
        assert_eq!(
            store.list(&scope, ArtifactKind::TestSuite).expect("list"),
            vec!["a", "b"]
        );
        store
            .delete(&scope, ArtifactKind::TestSuite, "suite")
            .expect("delete");
        store.health().expect("health");

        let seen = server.join().expect("join");
        assert!(seen[0].starts_with("POST /api/test_suite/m/v "));
        assert!(seen[1].starts_with("GET /api/test_suite/m/v "));
        assert!(seen[2].starts_with("DELETE /api/test_suite/m/v/suite "));
        assert!(seen[3].starts_with("GET /api/healthz "));
    }

    #[test]
    fn test_create_model_conflict_is_ok() {
        let (base, server) = serve(vec![(409, "exists")]);
        let store = HttpStore::new(base);
        store.create_model("m").expect("conflict tolerated");
        server.join().expect("join");
    }

    #[test]
    fn test_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let store = HttpStore::new(format!("http://{addr}"));
        let err = store.health().unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
