//! Shared test infrastructure for integration tests.
//!
//! `StubBackend` is a tiny_http server standing in for the REST API: it
//! records every request it sees and answers from a routing closure.
#![allow(dead_code)]

use fabric_rest_harness::run::{CancelToken, Cancelled, Clock};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tiny_http::{Header, Response, Server};

/// Request as observed by the stub backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path and query as sent on the wire.
    pub url: String,
    pub body: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
}

impl RecordedRequest {
    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

/// Canned reply from the stub backend.
pub struct StubReply {
    pub status: u16,
    pub body: String,
}

impl StubReply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

pub struct StubBackend {
    pub port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: Option<JoinHandle<()>>,
}

impl StubBackend {
    /// Serve until `max_requests` arrive or the server idles for a few seconds.
    pub fn start<F>(max_requests: usize, route: F) -> Self
    where
        F: Fn(&RecordedRequest) -> StubReply + Send + 'static,
    {
        let server = Server::http("127.0.0.1:0").expect("http server");
        let port = server
            .server_addr()
            .to_ip()
            .expect("ip listener")
            .port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        let handle = thread::spawn(move || {
            for _ in 0..max_requests {
                let Ok(Some(mut request)) = server.recv_timeout(Duration::from_secs(5)) else {
                    break;
                };
                let mut body = String::new();
                request
                    .as_reader()
                    .read_to_string(&mut body)
                    .expect("read request body");
                let header = |name: &'static str| {
                    request
                        .headers()
                        .iter()
                        .find(|h| h.field.equiv(name))
                        .map(|h| h.value.as_str().to_string())
                };
                let recorded = RecordedRequest {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                    body,
                    authorization: header("Authorization"),
                    content_type: header("Content-Type"),
                };
                let reply = route(&recorded);
                log.lock().unwrap().push(recorded);
                let response = Response::from_string(reply.body)
                    .with_status_code(reply.status)
                    .with_header(
                        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                            .unwrap(),
                    );
                request.respond(response).expect("respond");
            }
        });
        Self {
            port,
            requests,
            handle: Some(handle),
        }
    }

    /// Wait for the server thread and return what it saw.
    pub fn finish(mut self) -> Vec<RecordedRequest> {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("stub backend thread");
        }
        self.requests.lock().unwrap().clone()
    }
}

/// Settle waits that return immediately, recording what was asked for.
#[derive(Default)]
pub struct InstantClock {
    pub waits: Mutex<Vec<Duration>>,
}

impl Clock for InstantClock {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Cancelled> {
        self.waits.lock().unwrap().push(duration);
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(())
    }
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    std::fs::create_dir_all(path.parent().expect("parent dir")).expect("create dirs");
    std::fs::write(path, bytes).expect("write file");
}

/// Samples and input directories with every artifact the built-in plan uses.
pub fn artifact_dirs(root: &Path) -> (PathBuf, PathBuf) {
    let samples = root.join("fabric-samples");
    let inputs = root.join("input");
    write_file(&samples.join("basic-network/config/channel.tx"), b"CHANNEL-TX\x00\x01");
    write_file(
        &samples.join(
            "basic-network/crypto-config/peerOrganizations/org1.example.com/ca/ca.org1.example.com-cert.pem",
        ),
        b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n",
    );
    write_file(&inputs.join("installTest.tar.gz"), b"marbles-archive");
    write_file(&inputs.join("installFabcar.tar.gz"), b"fabcar-archive");
    (samples, inputs)
}

pub fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fabric-harness"))
}
