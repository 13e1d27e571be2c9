//! Frame analysis HTTP API.
//!
//! - `POST /analyze-frame`: raw image body or `multipart/form-data` with a
//!   `file` part; responds with the `FrameResult` JSON.
//! - `GET /health`
//! - `OPTIONS *`: CORS preflight.
//!
//! Requests are served one at a time on a single server thread that owns the
//! pipeline, so collaborators never see concurrent calls.

use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame::decode_frame;
use crate::pipeline::FusionPipeline;

const MAX_HEADER_BYTES: usize = 8192;
pub const DEFAULT_API_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_API_ADDR.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    pipeline: FusionPipeline,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, pipeline: FusionPipeline) -> Self {
        Self { cfg, pipeline }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let mut pipeline = self.pipeline;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, &cfg, &mut pipeline, shutdown_thread) {
                log::error!("frame api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: &ApiConfig,
    pipeline: &mut FusionPipeline,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, cfg, pipeline) {
                    log::warn!("frame api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(20));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    pipeline: &mut FusionPipeline,
) -> Result<()> {
    // Accepted sockets inherit the listener's non-blocking flag on some platforms.
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;

    let request = match read_request(&mut stream, cfg.max_body_bytes) {
        Ok(ReadOutcome::Request(request)) => request,
        Ok(ReadOutcome::TooLarge) => {
            write_json_response(&mut stream, 413, &json!({"error": "payload_too_large"}))?;
            return Ok(());
        }
        Err(err) => {
            write_json_response(&mut stream, 400, &json!({"error": "bad_request"}))?;
            return Err(err);
        }
    };

    if request.method == "OPTIONS" {
        write_response(&mut stream, 204, "text/plain", &[])?;
        return Ok(());
    }

    match request.path.as_str() {
        "/health" => {
            if request.method != "GET" {
                write_json_response(&mut stream, 405, &json!({"error": "method_not_allowed"}))?;
                return Ok(());
            }
            write_json_response(&mut stream, 200, &json!({"status": "ok"}))
        }
        "/analyze-frame" => {
            if request.method != "POST" {
                write_json_response(&mut stream, 405, &json!({"error": "method_not_allowed"}))?;
                return Ok(());
            }
            analyze_frame(&mut stream, &request, pipeline)
        }
        _ => write_json_response(&mut stream, 404, &json!({"error": "not_found"})),
    }
}

fn analyze_frame(
    stream: &mut TcpStream,
    request: &HttpRequest,
    pipeline: &mut FusionPipeline,
) -> Result<()> {
    let payload = match request.image_payload() {
        Ok(payload) => payload,
        Err(err) => {
            write_json_response(stream, 400, &json!({"error": err.to_string()}))?;
            return Err(err);
        }
    };
    let frame = match decode_frame(payload) {
        Ok(frame) => frame,
        Err(err) => {
            write_json_response(stream, 400, &json!({"error": format!("{:#}", err)}))?;
            return Err(err);
        }
    };
    match pipeline.process(&frame) {
        Ok(result) => {
            let body = serde_json::to_vec(&result)?;
            write_response(stream, 200, "application/json", &body)
        }
        Err(err) => {
            log::error!("frame processing failed: {:#}", err);
            write_json_response(stream, 500, &json!({"error": format!("{:#}", err)}))
        }
    }
}

enum ReadOutcome {
    Request(HttpRequest),
    TooLarge,
}

fn read_request<R: Read>(stream: &mut R, max_body_bytes: usize) -> Result<ReadOutcome> {
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = find(&data, b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of headers"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if content_length > max_body_bytes {
        return Ok(ReadOutcome::TooLarge);
    }

    let mut body = data.split_off(header_end + 4);
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!(
                "connection closed after {} of {} body bytes",
                body.len(),
                content_length
            ));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(ReadOutcome::Request(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    }))
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &serde_json::Value) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {len}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: *\r\n\
         Cache-Control: no-store\r\n\
         Connection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    fn multipart_boundary(&self) -> Option<String> {
        static BOUNDARY_RE: OnceLock<Regex> = OnceLock::new();
        let re = BOUNDARY_RE.get_or_init(|| {
            Regex::new(r#"(?i)^multipart/form-data\s*;.*boundary="?([^";]+)"?"#)
                .expect("static regex")
        });
        let content_type = self.headers.get("content-type")?;
        re.captures(content_type)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
    }

    /// The encoded image: the `file` part of a multipart body, or the body itself.
    fn image_payload(&self) -> Result<&[u8]> {
        match self.multipart_boundary() {
            Some(boundary) => multipart_file(&self.body, &boundary),
            None => Ok(&self.body),
        }
    }
}

/// Pick the `file` field from a multipart body, else the first part with a
/// filename, else the first part.
fn multipart_file<'a>(body: &'a [u8], boundary: &str) -> Result<&'a [u8]> {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let name_re = NAME_RE.get_or_init(|| {
        Regex::new(r#"(?i)content-disposition:[^\r\n]*;\s*name="([^"]*)""#).expect("static regex")
    });

    let delimiter = format!("--{boundary}");
    let mut parts: Vec<(Option<String>, bool, &[u8])> = Vec::new();
    let mut rest = body;
    let Some(first) = find(rest, delimiter.as_bytes()) else {
        return Err(anyhow!("multipart body has no boundary"));
    };
    rest = &rest[first + delimiter.len()..];
    loop {
        if rest.starts_with(b"--") {
            break;
        }
        let rest_after_crlf = rest.strip_prefix(b"\r\n").unwrap_or(rest);
        let Some(head_end) = find(rest_after_crlf, b"\r\n\r\n") else {
            break;
        };
        let head = String::from_utf8_lossy(&rest_after_crlf[..head_end]).to_string();
        let content = &rest_after_crlf[head_end + 4..];
        let closing = format!("\r\n{delimiter}");
        let Some(end) = find(content, closing.as_bytes()) else {
            return Err(anyhow!("multipart part is not terminated"));
        };
        let name = name_re
            .captures(&head)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
        let has_filename = head.to_lowercase().contains("filename=");
        parts.push((name, has_filename, &content[..end]));
        rest = &content[end + closing.len()..];
    }

    parts
        .iter()
        .find(|(name, _, _)| name.as_deref() == Some("file"))
        .or_else(|| parts.iter().find(|(_, has_filename, _)| *has_filename))
        .or_else(|| parts.first())
        .map(|(_, _, content)| *content)
        .ok_or_else(|| anyhow!("multipart body has no parts"))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(raw: &[u8], max_body: usize) -> Result<ReadOutcome> {
        read_request(&mut Cursor::new(raw.to_vec()), max_body)
    }

    fn expect_request(outcome: ReadOutcome) -> HttpRequest {
        match outcome {
            ReadOutcome::Request(request) => request,
            ReadOutcome::TooLarge => panic!("unexpected payload_too_large"),
        }
    }

    #[test]
    fn reads_body_by_content_length() -> Result<()> {
        let raw = b"POST /analyze-frame?x=1 HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloEXTRA";
        let request = expect_request(parse(raw, 1024)?);
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/analyze-frame");
        assert_eq!(request.body, b"hello");
        Ok(())
    }

    #[test]
    fn oversized_body_is_flagged_before_reading() -> Result<()> {
        let raw = b"POST /analyze-frame HTTP/1.1\r\nContent-Length: 2048\r\n\r\n";
        assert!(matches!(parse(raw, 1024)?, ReadOutcome::TooLarge));
        Ok(())
    }

    #[test]
    fn truncated_body_is_an_error() {
        let raw = b"POST /analyze-frame HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        assert!(parse(raw, 1024).is_err());
    }

    #[test]
    fn multipart_prefers_file_field() -> Result<()> {
        let body = b"--XyZ\r\n\
Content-Disposition: form-data; name=\"note\"\r\n\r\n\
ignored\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"frame.png\"\r\n\
Content-Type: image/png\r\n\r\n\
\x89PNG\r\n\x1a\nDATA\r\n\
--XyZ--\r\n";
        let part = multipart_file(body, "XyZ")?;
        assert_eq!(part, b"\x89PNG\r\n\x1a\nDATA");
        Ok(())
    }

    #[test]
    fn boundary_is_parsed_from_content_type() {
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            "multipart/form-data; boundary=\"----abc123\"".to_string(),
        );
        let request = HttpRequest {
            method: "POST".to_string(),
            path: "/analyze-frame".to_string(),
            headers,
            body: Vec::new(),
        };
        assert_eq!(request.multipart_boundary().as_deref(), Some("----abc123"));
    }

    #[test]
    fn raw_body_is_the_payload() -> Result<()> {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "image/jpeg".to_string());
        let request = HttpRequest {
            method: "POST".to_string(),
            path: "/analyze-frame".to_string(),
            headers,
            body: b"jpegbytes".to_vec(),
        };
        assert_eq!(request.image_payload()?, b"jpegbytes");
        Ok(())
    }
}
