use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use url::Url;

use super::types::CheckOutcome;
use crate::store::models::{AuthHeader, Monitor, RequestType};

/// A single execution strategy for performing one probe.
///
/// Every strategy produces the same `(code, message, response time)` contract
/// so the state machine never cares how the probe was carried out. Transport
/// and execution errors surface as `Err` and are accounted as failed checks
/// by the caller.
#[async_trait]
pub trait CheckExecutor: Send + Sync {
    async fn execute(&self, monitor: &Monitor, auth: Option<&AuthHeader>) -> Result<CheckOutcome>;
}

/// Direct HTTP strategy using the in-process client.
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(default_timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(default_timeout_seconds))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl CheckExecutor for HttpExecutor {
    async fn execute(&self, monitor: &Monitor, auth: Option<&AuthHeader>) -> Result<CheckOutcome> {
        let url = Url::parse(&monitor.url).map_err(|e| anyhow!("invalid URL {}: {e}", monitor.url))?;
        let method = reqwest::Method::from_bytes(monitor.method.as_bytes())
            .map_err(|_| anyhow!("invalid method {}", monitor.method))?;

        let mut request = self
            .client
            .request(method, url)
            .timeout(Duration::from_secs(monitor.timeout.max(1)));

        if let Some(headers) = monitor.headers_map() {
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }
        if let Some(auth) = auth {
            request = request.header(&auth.name, &auth.value);
        }
        if let Some(body) = &monitor.body {
            if !body.is_empty() {
                request = request.body(body.clone());
            }
        }

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("connection failed to {}: {e}", monitor.url))?;
        let response_time_ms = started.elapsed().as_millis() as u64;

        let code = response.status().as_u16();
        Ok(CheckOutcome { code, message: describe_code(&monitor.url, code), response_time_ms })
    }
}

/// External-process strategy shelling out to `curl`.
///
/// The response headers are included in the output (`-i`) so the status code
/// can be recovered from the first status line; output without a parseable
/// status line is a failed check, never a silent zero.
pub struct CurlExecutor;

#[async_trait]
impl CheckExecutor for CurlExecutor {
    async fn execute(&self, monitor: &Monitor, auth: Option<&AuthHeader>) -> Result<CheckOutcome> {
        let timeout_arg = monitor.timeout.max(1).to_string();
        let mut args: Vec<String> = vec![
            "--location".into(),
            "--silent".into(),
            "--show-error".into(),
            "-i".into(),
            "--connect-timeout".into(),
            timeout_arg,
        ];

        if monitor.method != "GET" {
            args.push("-X".into());
            args.push(monitor.method.clone());
        }
        args.push(monitor.url.clone());

        if let Some(headers) = monitor.headers_map() {
            for (name, value) in headers {
                args.push("-H".into());
                args.push(format!("{name}: {value}"));
            }
        }
        if let Some(auth) = auth {
            args.push("-H".into());
            args.push(format!("{}: {}", auth.name, auth.value));
        }

        if let Some(body) = &monitor.body {
            if body.contains("--form") {
                for (key, value) in parse_form_fields(body) {
                    args.push("--form".into());
                    args.push(format!("{key}={value}"));
                }
            } else if !body.is_empty() {
                args.push("-d".into());
                args.push(body.clone());
            }
        }

        let started = Instant::now();
        let output = Command::new("curl")
            .args(&args)
            .output()
            .await
            .map_err(|e| anyhow!("failed to launch curl: {e}"))?;
        let response_time_ms = started.elapsed().as_millis() as u64;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail =
                if stderr.trim().is_empty() { output.status.to_string() } else { stderr.trim().to_string() };
            return Err(anyhow!("curl failed for {}: {detail}", monitor.url));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let code = parse_status_line(&stdout)
            .ok_or_else(|| anyhow!("no status line in curl output for {}", monitor.url))?;

        Ok(CheckOutcome { code, message: describe_code(&monitor.url, code), response_time_ms })
    }
}

/// TCP connect strategy for database-type monitors.
///
/// Success is synthesized as code 200 so the classifier treats a reachable
/// database exactly like a healthy HTTP endpoint.
pub struct TcpExecutor;

#[async_trait]
impl CheckExecutor for TcpExecutor {
    async fn execute(&self, monitor: &Monitor, _auth: Option<&AuthHeader>) -> Result<CheckOutcome> {
        let host = monitor
            .db_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow!("database monitor {} has no host configured", monitor.name))?;
        let port = monitor
            .db_port
            .ok_or_else(|| anyhow!("database monitor {} has no port configured", monitor.name))?;
        let addr = format!("{host}:{port}");

        let started = Instant::now();
        timeout(Duration::from_secs(monitor.timeout.max(1)), tokio::net::TcpStream::connect(&addr))
            .await
            .map_err(|_| anyhow!("connection to {addr} timed out"))?
            .map_err(|e| anyhow!("connection to {addr} failed: {e}"))?;
        let response_time_ms = started.elapsed().as_millis() as u64;

        Ok(CheckOutcome {
            code: 200,
            message: format!("{} at {addr} is reachable", monitor.kind),
            response_time_ms,
        })
    }
}

/// Maps a monitor to the strategy that probes it.
pub trait ExecutorSet: Send + Sync {
    fn for_monitor(&self, monitor: &Monitor) -> &dyn CheckExecutor;
}

/// Strategy selection: database monitors probe over TCP, curl monitors shell
/// out, everything else goes through the in-process HTTP client.
pub struct Executors {
    http: HttpExecutor,
    curl: CurlExecutor,
    tcp: TcpExecutor,
}

impl Executors {
    pub fn new(default_timeout_seconds: u64) -> Result<Self> {
        Ok(Self {
            http: HttpExecutor::new(default_timeout_seconds)?,
            curl: CurlExecutor,
            tcp: TcpExecutor,
        })
    }
}

impl ExecutorSet for Executors {
    fn for_monitor(&self, monitor: &Monitor) -> &dyn CheckExecutor {
        if monitor.kind.is_database() {
            &self.tcp
        } else if monitor.request_type == RequestType::Curl {
            &self.curl
        } else {
            &self.http
        }
    }
}

/// Human-readable message for a response code, shared by all strategies.
pub(crate) fn describe_code(url: &str, code: u16) -> String {
    let label = match code {
        200..=299 => " (Success)",
        401 => " (Unauthorized)",
        403 => " (Forbidden)",
        404 => " (Not Found)",
        500 => " (Internal Server Error)",
        502 => " (Bad Gateway)",
        503 => " (Service Unavailable)",
        504 => " (Gateway Timeout)",
        _ => "",
    };
    format!("{url} returned status code {code}{label}")
}

/// Recover the status code from `curl -i` output: the first line that starts
/// with `HTTP/` carries it.
fn parse_status_line(output: &str) -> Option<u16> {
    output
        .lines()
        .find(|line| line.starts_with("HTTP/"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
}

/// Re-encode a pasted `--form 'key=value' --form 'key2=value2'` body as
/// individual form fields.
fn parse_form_fields(body: &str) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    for part in body.split("--form") {
        let part = part.trim().trim_matches(|c| c == '\'' || c == '"').trim();
        if part.is_empty() {
            continue;
        }
        if let Some(idx) = part.find('=') {
            let key = part[..idx].trim().trim_matches(|c| c == '\'' || c == '"');
            let value = part[idx + 1..].trim().trim_matches(|c| c == '\'' || c == '"');
            if !key.is_empty() {
                fields.push((key.to_string(), value.to_string()));
            }
        }
    }
    fields
}
