//! HTTP boundary tests: the reqwest-backed fetcher and provider against a
//! local server.
//!
//! A minimal HTTP/1.1 server thread stands in for both the image host and
//! the EmailJS API, so these tests run offline.

use metrosite::audit::{AttemptStatus, AuditLog, FileStore};
use metrosite::config::DeliveryConfig;
use metrosite::dispatch::{Dispatcher, Message, SendError};
use metrosite::fetch::HttpFetcher;
use metrosite::preload::{PreloadOptions, Preloader};
use metrosite::provider::{DeliveryError, EmailJsProvider};
use std::io::{Read as _, Write as _};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

// ===========================================================================
// Minimal HTTP server
// ===========================================================================

struct TestServer {
    port: u16,
    posted: Arc<Mutex<Vec<String>>>,
    _stop: std::sync::mpsc::Sender<()>,
}

impl TestServer {
    fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let posted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&posted);

        thread::spawn(move || {
            listener.set_nonblocking(true).unwrap();
            loop {
                if rx.try_recv().is_ok() {
                    break;
                }
                match listener.accept() {
                    Ok((stream, _)) => {
                        let sink = Arc::clone(&sink);
                        thread::spawn(move || serve_request(stream, &sink));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            port,
            posted,
            _stop: tx,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    fn posted_bodies(&self) -> Vec<String> {
        self.posted.lock().unwrap().clone()
    }
}

/// Read one request: headers, then `Content-Length` bytes of body.
fn read_request(stream: &mut TcpStream) -> Option<(String, String, String)> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while data.len() < header_end + content_length {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }

    let mut request_line = head.lines().next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let body = String::from_utf8_lossy(&data[header_end..]).to_string();
    Some((method, path, body))
}

fn serve_request(mut stream: TcpStream, posted: &Mutex<Vec<String>>) {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let Some((method, path, body)) = read_request(&mut stream) else {
        return;
    };

    let (status, body_out): (&str, &[u8]) = match (method.as_str(), path.as_str()) {
        ("GET", p) if p.starts_with("/images/") => {
            ("200 OK", &b"\xff\xd8\xff\xe0fakejpeg"[..])
        }
        ("POST", "/email/send") => {
            posted.lock().unwrap().push(body);
            ("200 OK", &b"OK"[..])
        }
        ("POST", "/email/reject") => {
            posted.lock().unwrap().push(body);
            ("400 Bad Request", &b"The Public Key is invalid."[..])
        }
        _ => ("404 Not Found", &b"Not Found"[..]),
    };

    let header = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        body_out.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(body_out);
}

// ===========================================================================
// Fixtures
// ===========================================================================

fn delivery_config() -> DeliveryConfig {
    DeliveryConfig {
        service_id: "service_it".into(),
        template_id: "template_it".into(),
        account_id: "public_key_it".into(),
        ..DeliveryConfig::default()
    }
}

fn message() -> Message {
    Message {
        sender_name: "Omar Ruiz".into(),
        sender_email: "omar@example.com".into(),
        sender_phone: None,
        subject: "Surface roughness tester".into(),
        body: "Do you rent out profilometers?".into(),
    }
}

fn dispatcher(server: &TestServer, path: &str, tmp: &TempDir) -> Dispatcher<EmailJsProvider> {
    let provider = EmailJsProvider::new(
        reqwest::Client::new(),
        Url::parse(&server.url(path)).unwrap(),
    );
    let audit = Arc::new(AuditLog::new(FileStore::new(tmp.path())));
    Dispatcher::new(delivery_config(), provider, audit)
}

// ===========================================================================
// Preloading
// ===========================================================================

#[tokio::test]
async fn preload_over_http_separates_loaded_from_failed() {
    let server = TestServer::start();
    let fetcher = HttpFetcher::default().with_base_url(Url::parse(&server.url("/")).unwrap());
    let preloader = Preloader::new(fetcher);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let e = Arc::clone(&errors);

    let absolute = server.url("/images/probe.jpg");
    let state = preloader
        .preload(
            vec![
                "/images/hero.jpg".to_string(),
                "images/lab.jpg".to_string(),
                "/missing.jpg".to_string(),
                absolute.clone(),
            ],
            PreloadOptions::new().on_error(move |err| {
                e.lock().unwrap().push(err.locator.clone());
            }),
        )
        .finished()
        .await
        .unwrap();

    assert!(!state.is_loading());
    assert_eq!(state.loaded().len(), 3);
    assert!(state.loaded().contains(&absolute));
    assert_eq!(
        state.failed().iter().collect::<Vec<_>>(),
        vec!["/missing.jpg"]
    );
    assert_eq!(*errors.lock().unwrap(), vec!["/missing.jpg".to_string()]);
}

#[tokio::test]
async fn unreachable_host_counts_as_failure() {
    let preloader = Preloader::new(HttpFetcher::default());
    let state = preloader
        .preload(["http://127.0.0.1:1/nothing.jpg"], PreloadOptions::new())
        .finished()
        .await
        .unwrap();
    assert_eq!(state.failed().len(), 1);
    assert_eq!(state.progress(), 1.0);
}

// ===========================================================================
// Delivery
// ===========================================================================

#[tokio::test]
async fn accepted_message_is_posted_and_logged() {
    let server = TestServer::start();
    let tmp = TempDir::new().unwrap();
    let d = dispatcher(&server, "/email/send", &tmp);

    let response = d.send(&message()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.text, "OK");

    let bodies = server.posted_bodies();
    assert_eq!(bodies.len(), 1);
    let posted: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(posted["service_id"], "service_it");
    assert_eq!(posted["template_id"], "template_it");
    assert_eq!(posted["user_id"], "public_key_it");
    assert_eq!(posted["template_params"]["from_email"], "omar@example.com");
    assert_eq!(posted["template_params"]["phone"], "Not provided");

    let reopened = AuditLog::new(FileStore::new(tmp.path())).entries();
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened[0].status, AttemptStatus::Success);
    assert_eq!(reopened[0].detail, "200 OK");
}

#[tokio::test]
async fn rejected_message_is_logged_and_propagated() {
    let server = TestServer::start();
    let tmp = TempDir::new().unwrap();
    let d = dispatcher(&server, "/email/reject", &tmp);

    let err = d.send(&message()).await.unwrap_err();
    match err {
        SendError::Delivery(DeliveryError::Rejected { status, text }) => {
            assert_eq!(status, 400);
            assert_eq!(text, "The Public Key is invalid.");
        }
        other => panic!("expected a rejection, got {other:?}"),
    }

    let log = d.audit_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status, AttemptStatus::Error);
    assert_eq!(log[0].subject, "Surface roughness tester");
    assert!(log[0].detail.contains("The Public Key is invalid."));
}
