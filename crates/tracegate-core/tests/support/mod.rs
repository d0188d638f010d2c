#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Semaphore};
use tracegate_core::{
    ApiError, ClientSettings, HttpReply, MemoryBackend, RequestDescriptor, Session, SessionClient,
    SessionEvent, Transport,
};

pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("tracegate_core=debug"))
            .with_test_writer()
            .try_init();
    });
}

pub fn ok(data: Value) -> HttpReply {
    HttpReply::envelope(200, data, Some("success"))
}

pub fn expired() -> HttpReply {
    HttpReply::envelope(401, Value::Null, Some("token expired"))
}

pub fn ok_body(data: Value) -> String {
    json!({ "success": true, "code": 200, "message": "success", "data": data }).to_string()
}

pub fn expired_body() -> String {
    json!({ "success": false, "code": 401, "message": "token expired", "data": null }).to_string()
}

pub fn tokens(access: &str, refresh: &str) -> Value {
    json!({ "token": access, "refreshToken": refresh })
}

type Handler = Box<dyn Fn(&RequestDescriptor) -> HttpReply + Send + Sync>;

/// In-process transport. Replies come from `handler`; paths marked as held
/// wait for `release` before answering.
pub struct ScriptedTransport {
    handler: Handler,
    held: Mutex<Vec<String>>,
    gate: Semaphore,
    seen: Mutex<Vec<(String, String, Option<String>)>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&RequestDescriptor) -> HttpReply + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            held: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn hold(&self, path: &str) {
        self.held.lock().expect("held").push(path.to_string());
    }

    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Dispatches seen for `path`, with the bearer token each carried.
    pub fn calls(&self, path: &str) -> Vec<Option<String>> {
        self.seen
            .lock()
            .expect("seen")
            .iter()
            .filter(|(_, seen_path, _)| seen_path == path)
            .map(|(_, _, auth)| auth.clone())
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls(path).len()
    }

    pub fn counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for (_, path, _) in self.seen.lock().expect("seen").iter() {
            *counts.entry(path.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Waits until `path` has been dispatched at least `count` times.
    pub async fn wait_for(&self, path: &str, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.count(path) < count {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("dispatches observed");
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn dispatch(&self, request: &RequestDescriptor) -> Result<HttpReply, ApiError> {
        let auth = request
            .authorization()
            .map(|value| value.trim_start_matches("Bearer ").to_string());
        self.seen.lock().expect("seen").push((
            request.method.to_string(),
            request.path.clone(),
            auth,
        ));
        let held = self
            .held
            .lock()
            .expect("held")
            .iter()
            .any(|path| *path == request.path);
        if held {
            let permit = self.gate.acquire().await.expect("gate open");
            permit.forget();
        }
        Ok((self.handler)(request))
    }
}

pub fn scripted_client(
    settings: ClientSettings,
    transport: Arc<ScriptedTransport>,
    session: Session,
) -> SessionClient {
    init_tracing();
    let client = SessionClient::with_transport(settings, Box::new(MemoryBackend::new()), transport)
        .expect("client");
    client.store().set(session).expect("seed session");
    client
}

pub fn http_client(base_url: &str, session: Session) -> SessionClient {
    init_tracing();
    let settings = ClientSettings::default().with_base_url(base_url);
    let client =
        SessionClient::with_backend(settings, Box::new(MemoryBackend::new())).expect("client");
    client.store().set(session).expect("seed session");
    client
}

pub fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn failures(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, SessionEvent::RequestFailed { .. }))
        .count()
}
