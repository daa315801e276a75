//! Analyzer Client: a JSON-over-HTTP stub to the long-lived Analyzer
//! service — readiness probe, analyze request, parse response.

use std::net::ToSocketAddrs;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::AnalyzerError;
use crate::model::Finding;

const DEFAULT_READINESS_DEADLINE: Duration = Duration::from_secs(30);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const RETRY_BACKOFFS: [Duration; 2] = [Duration::from_millis(500), Duration::from_secs(2)];

pub struct AnalyzerClient {
    base_url: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    path: &'a str,
    ruleset: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "auxClasspath")]
    aux_classpath: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    files: &'a [String],
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponseBody {
    #[serde(default)]
    files: Vec<AnalyzeResponseFile>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponseFile {
    file: String,
    #[serde(default)]
    violations: Vec<WireFinding>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFinding {
    rule: String,
    severity: String,
    begin_line: u32,
    begin_column: u32,
    end_line: u32,
    end_column: u32,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl AnalyzerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build();
        Self {
            base_url: base_url.into(),
            agent,
        }
    }

    /// Polls the endpoint with exponential back-off up to `deadline`
    /// (default 30s). Starting work before readiness is a programming
    /// error — callers must not dispatch jobs until this returns `Ok`.
    pub fn wait_until_ready(&self, deadline: Option<Duration>) -> Result<(), AnalyzerError> {
        let deadline = deadline.unwrap_or(DEFAULT_READINESS_DEADLINE);
        let start = Instant::now();
        let mut backoff = Duration::from_millis(100);
        loop {
            if self.probe_once() {
                return Ok(());
            }
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return Err(AnalyzerError::Unreachable {
                    url: self.base_url.clone(),
                    deadline_secs: deadline.as_secs(),
                });
            }
            let remaining = deadline - elapsed;
            std::thread::sleep(backoff.min(remaining));
            backoff = (backoff * 2).min(Duration::from_secs(2));
        }
    }

    fn probe_once(&self) -> bool {
        let Some(addr) = host_port(&self.base_url) else {
            return false;
        };
        std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(500)).is_ok()
    }

    /// `analyze(repo_root_path, ruleset_path, aux_classpath, files[]) ->
    /// Findings[]`. Retries transport errors (connection refused, etc.) up
    /// to twice with 500ms/2s back-off; HTTP 500 from the Analyzer is
    /// surfaced immediately without retry.
    pub fn analyze(
        &self,
        repo_root: &Path,
        ruleset_path: &Path,
        aux_classpath: Option<&str>,
        files: &[String],
    ) -> Result<Vec<Finding>, AnalyzerError> {
        let request = AnalyzeRequest {
            path: &repo_root.to_string_lossy(),
            ruleset: &ruleset_path.to_string_lossy(),
            aux_classpath,
            files,
        };
        let url = format!("{}/analyze", self.base_url.trim_end_matches('/'));

        let mut attempt = 0usize;
        loop {
            match self.agent.post(&url).send_json(&request) {
                Ok(response) => return parse_success(response),
                Err(ureq::Error::Status(500, response)) => return Err(parse_internal_error(response)),
                Err(ureq::Error::Status(status, response)) => {
                    let body = response.into_string().unwrap_or_default();
                    return Err(AnalyzerError::Protocol { status, body });
                }
                Err(ureq::Error::Transport(transport)) => {
                    if attempt >= RETRY_BACKOFFS.len() {
                        return Err(AnalyzerError::Transport(transport.to_string()));
                    }
                    std::thread::sleep(RETRY_BACKOFFS[attempt]);
                    attempt += 1;
                }
            }
        }
    }
}

fn parse_success(response: ureq::Response) -> Result<Vec<Finding>, AnalyzerError> {
    let body: AnalyzeResponseBody = response
        .into_json()
        .map_err(|err| AnalyzerError::Protocol {
            status: 200,
            body: format!("invalid JSON response: {err}"),
        })?;
    let mut findings = Vec::new();
    for file in body.files {
        for violation in file.violations {
            findings.push(Finding {
                rule: violation.rule,
                severity: violation.severity,
                file: file.file.clone(),
                begin_line: violation.begin_line,
                begin_column: violation.begin_column,
                end_line: violation.end_line,
                end_column: violation.end_column,
                description: violation.description,
            });
        }
    }
    Ok(findings)
}

fn parse_internal_error(response: ureq::Response) -> AnalyzerError {
    let body_text = response.into_string().unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body_text)
        .map(|body| body.error)
        .unwrap_or(body_text);
    AnalyzerError::Internal { message }
}

fn host_port(base_url: &str) -> Option<std::net::SocketAddr> {
    let without_scheme = base_url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let authority = without_scheme.split('/').next()?;
    authority.to_socket_addrs().ok()?.next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn wait_until_ready_succeeds_once_port_accepts_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((_stream, _)) = listener.accept() {}
        });
        let client = AnalyzerClient::new(format!("http://{addr}"));
        client
            .wait_until_ready(Some(Duration::from_secs(2)))
            .unwrap();
    }

    #[test]
    fn wait_until_ready_times_out_when_nothing_listens() {
        let client = AnalyzerClient::new("http://127.0.0.1:1");
        let result = client.wait_until_ready(Some(Duration::from_millis(200)));
        assert!(matches!(result, Err(AnalyzerError::Unreachable { .. })));
    }

    #[test]
    fn analyze_parses_findings_from_a_fake_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let body = serde_json::json!({
                "files": [
                    {
                        "file": "A.java",
                        "violations": [
                            {
                                "rule": "UnusedPrivateField",
                                "severity": "warning",
                                "beginLine": 3,
                                "beginColumn": 5,
                                "endLine": 3,
                                "endColumn": 20,
                                "description": "Avoid unused private fields"
                            }
                        ]
                    }
                ]
            })
            .to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            use std::io::Write;
            let _ = stream.write_all(response.as_bytes());
        });

        let client = AnalyzerClient::new(format!("http://{addr}"));
        let findings = client
            .analyze(
                Path::new("/repo"),
                Path::new("/ruleset.xml"),
                None,
                &["A.java".to_string()],
            )
            .unwrap();
        handle.join().unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "UnusedPrivateField");
        assert_eq!(findings[0].file, "A.java");
        assert_eq!(findings[0].begin_line, 3);
    }
}
