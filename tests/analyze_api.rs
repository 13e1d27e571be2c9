use anyhow::{anyhow, Result};
use image::{ImageFormat, RgbImage};
use serde_json::Value;
use std::io::{Cursor, Read, Write};
use std::net::TcpStream;

use scene_fusion::api::{ApiConfig, ApiHandle, ApiServer};
use scene_fusion::{
    DistanceEstimator, FaceRect, FusionPipeline, ObjectDetector, RawDetection, StubFaceDetector,
    StubObjectDetector, StubTextRecognizer,
};

struct BrokenDetector;

impl ObjectDetector for BrokenDetector {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn detect(&mut self, _image: &RgbImage, _inference_size: u32) -> Result<Vec<RawDetection>> {
        Err(anyhow!("inference session lost"))
    }
}

fn stub_pipeline() -> FusionPipeline {
    FusionPipeline::new(
        Box::new(StubObjectDetector::new(vec![
            RawDetection::new("ruler", [10.0, 10.0, 310.0, 40.0], 0.87),
            RawDetection::new("ruler", [12.0, 10.0, 310.0, 40.0], 0.60),
        ])),
        Box::new(StubTextRecognizer::new(["EXIT"])),
        Box::new(StubFaceDetector::new(vec![FaceRect::new(5, 6, 20, 30)])),
        DistanceEstimator::default(),
    )
}

fn png_bytes() -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    RgbImage::new(64, 48).write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

fn send(addr: std::net::SocketAddr, head: &str, body: &[u8]) -> Result<(String, String)> {
    let mut stream = TcpStream::connect(addr)?;
    stream.write_all(head.as_bytes())?;
    stream.write_all(body)?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

fn post_frame(addr: std::net::SocketAddr, content_type: &str, body: &[u8]) -> Result<(String, String)> {
    let head = format!(
        "POST /analyze-frame HTTP/1.1\r\nHost: localhost\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        content_type,
        body.len()
    );
    send(addr, &head, body)
}

struct TestApi {
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new(pipeline: FusionPipeline) -> Result<Self> {
        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            ..ApiConfig::default()
        };
        let api_handle = ApiServer::new(api_config, pipeline).spawn()?;
        Ok(Self {
            api_handle: Some(api_handle),
        })
    }

    fn addr(&self) -> std::net::SocketAddr {
        self.api_handle
            .as_ref()
            .expect("test API handle should be initialized")
            .addr
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

#[test]
fn health_reports_ok() -> Result<()> {
    let api = TestApi::new(stub_pipeline())?;
    let (headers, body) = send(
        api.addr(),
        "GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n",
        &[],
    )?;
    assert!(headers.contains("200 OK"));
    let json: Value = serde_json::from_str(&body)?;
    assert_eq!(json["status"], "ok");
    Ok(())
}

#[test]
fn preflight_allows_any_origin() -> Result<()> {
    let api = TestApi::new(stub_pipeline())?;
    let (headers, body) = send(
        api.addr(),
        "OPTIONS /analyze-frame HTTP/1.1\r\nHost: localhost\r\nOrigin: http://example.test\r\n\r\n",
        &[],
    )?;
    assert!(headers.contains("204 No Content"));
    assert!(headers.contains("Access-Control-Allow-Origin: *"));
    assert!(headers.contains("Access-Control-Allow-Methods: GET, POST, OPTIONS"));
    assert!(body.is_empty());
    Ok(())
}

#[test]
fn raw_image_body_is_analyzed() -> Result<()> {
    let api = TestApi::new(stub_pipeline())?;
    let (headers, body) = post_frame(api.addr(), "image/png", &png_bytes()?)?;
    assert!(headers.contains("200 OK"), "{headers}");
    assert!(headers.contains("Access-Control-Allow-Origin: *"));

    let json: Value = serde_json::from_str(&body)?;
    let objects = json["objects"].as_array().expect("objects array");
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0]["label"], "ruler");
    assert_eq!(objects[0]["bbox"], serde_json::json!([10, 10, 310, 40]));
    // 30 cm * 850 px / 300 px
    assert_eq!(objects[0]["distance_cm"], 85.0);
    assert_eq!(json["texts"], serde_json::json!(["EXIT"]));
    assert_eq!(
        json["faces"],
        serde_json::json!([{"bbox": [5, 6, 25, 36], "status": "unknown"}])
    );
    assert_eq!(json["distances"]["ruler"], 0.85);
    Ok(())
}

#[test]
fn multipart_upload_is_analyzed() -> Result<()> {
    let api = TestApi::new(stub_pipeline())?;
    let boundary = "----scenefusionboundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"frame.png\"\r\n\
             Content-Type: image/png\r\n\r\n",
            b = boundary
        )
        .as_bytes(),
    );
    body.extend_from_slice(&png_bytes()?);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    let (headers, body) = post_frame(
        api.addr(),
        &format!("multipart/form-data; boundary={}", boundary),
        &body,
    )?;
    assert!(headers.contains("200 OK"), "{headers}");
    let json: Value = serde_json::from_str(&body)?;
    assert_eq!(json["objects"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[test]
fn undecodable_image_is_a_bad_request() -> Result<()> {
    let api = TestApi::new(stub_pipeline())?;
    let (headers, body) = post_frame(api.addr(), "image/jpeg", b"definitely not a jpeg")?;
    assert!(headers.contains("400 Bad Request"));
    let json: Value = serde_json::from_str(&body)?;
    assert!(json["error"].is_string());

    let (headers, _) = post_frame(api.addr(), "image/jpeg", &[])?;
    assert!(headers.contains("400 Bad Request"));
    Ok(())
}

#[test]
fn collaborator_failure_is_a_server_error() -> Result<()> {
    let pipeline = FusionPipeline::new(
        Box::new(BrokenDetector),
        Box::new(StubTextRecognizer::default()),
        Box::new(StubFaceDetector::default()),
        DistanceEstimator::default(),
    );
    let api = TestApi::new(pipeline)?;
    let (headers, body) = post_frame(api.addr(), "image/png", &png_bytes()?)?;
    assert!(headers.contains("500 Internal Server Error"));
    let json: Value = serde_json::from_str(&body)?;
    let message = json["error"].as_str().unwrap_or_default();
    assert!(message.contains("inference session lost"), "{message}");

    // The server keeps serving after a failed frame.
    let (headers, _) = send(
        api.addr(),
        "GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n",
        &[],
    )?;
    assert!(headers.contains("200 OK"));
    Ok(())
}

#[test]
fn unknown_routes_and_methods_are_rejected() -> Result<()> {
    let api = TestApi::new(stub_pipeline())?;
    let (headers, _) = send(
        api.addr(),
        "GET /events HTTP/1.1\r\nHost: localhost\r\n\r\n",
        &[],
    )?;
    assert!(headers.contains("404 Not Found"));

    let (headers, _) = send(
        api.addr(),
        "GET /analyze-frame HTTP/1.1\r\nHost: localhost\r\n\r\n",
        &[],
    )?;
    assert!(headers.contains("405 Method Not Allowed"));
    Ok(())
}
