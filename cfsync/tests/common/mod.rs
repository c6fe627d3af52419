//! A tiny in-process stand-in for the Radarr/Sonarr custom format API.
//!
//! Serves `GET/POST /api/v3/customformat` and `PUT/DELETE /api/v3/customformat/{id}`
//! over plain HTTP/1.1, one request per connection, and rejects requests that do not
//! carry the expected `X-Api-Key`.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct FakeArr {
    pub formats: Mutex<BTreeMap<i64, Value>>,
    pub requests: Mutex<Vec<String>>,
    next_id: AtomicI64,
    api_key: String,
}

impl FakeArr {
    pub fn names(&self) -> Vec<String> {
        self.formats
            .lock()
            .unwrap()
            .values()
            .filter_map(|v| v.get("name").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn writes(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.starts_with("GET"))
            .cloned()
            .collect()
    }
}

/// Starts the fake server on an ephemeral port and returns its base URL.
pub async fn spawn_fake_arr(api_key: &str, initial: Vec<Value>) -> (String, Arc<FakeArr>) {
    let formats = initial
        .into_iter()
        .map(|v| (v["id"].as_i64().expect("seeded format needs an id"), v))
        .collect::<BTreeMap<_, _>>();
    let next_id = formats.keys().max().copied().unwrap_or(0) + 1;
    let state = Arc::new(FakeArr {
        formats: Mutex::new(formats),
        requests: Mutex::new(Vec::new()),
        next_id: AtomicI64::new(next_id),
        api_key: api_key.to_string(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake server");
    let addr = listener.local_addr().expect("local addr");
    let served = state.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handle(stream, served.clone()));
        }
    });

    (format!("http://{addr}"), state)
}

async fn handle(mut stream: TcpStream, state: Arc<FakeArr>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let header = |name: &str| {
        head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    };
    let content_length = header("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = buf.len().min(header_end + content_length);
    let body: Value = serde_json::from_slice(&buf[header_end..body_end]).unwrap_or(Value::Null);

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    state
        .requests
        .lock()
        .unwrap()
        .push(format!("{method} {path}"));

    let (status, response) = if header("x-api-key").as_deref() != Some(state.api_key.as_str()) {
        ("401 Unauthorized", json!({"message": "Unauthorized"}))
    } else {
        route(&state, &method, &path, body)
    };

    let payload = response.to_string();
    let reply = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let _ = stream.write_all(reply.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn route(state: &FakeArr, method: &str, path: &str, body: Value) -> (&'static str, Value) {
    let mut formats = state.formats.lock().unwrap();
    let id = path
        .strip_prefix("/api/v3/customformat/")
        .and_then(|id| id.parse::<i64>().ok());

    match (method, path, id) {
        ("GET", "/api/v3/customformat", _) => {
            ("200 OK", Value::Array(formats.values().cloned().collect()))
        }
        ("POST", "/api/v3/customformat", _) => {
            let id = state.next_id.fetch_add(1, Ordering::SeqCst);
            let mut created = body;
            created["id"] = json!(id);
            formats.insert(id, created.clone());
            ("201 Created", created)
        }
        ("PUT", _, Some(id)) if formats.contains_key(&id) => {
            let mut updated = body;
            updated["id"] = json!(id);
            formats.insert(id, updated.clone());
            ("202 Accepted", updated)
        }
        ("DELETE", _, Some(id)) if formats.remove(&id).is_some() => ("200 OK", json!({})),
        _ => ("404 Not Found", json!({"message": "NotFound"})),
    }
}
