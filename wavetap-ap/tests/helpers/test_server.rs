//! Test server wrapper for integration tests
//!
//! Wires the real command router, registry and HTTP routes to fake engines,
//! so tests exercise everything above the engine boundary in-process.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::Router;
use http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use wavetap_ap::api::{create_router, AppContext, CommandArgs, CommandReply, CommandRouter};
use wavetap_ap::engine::{EngineFactory, SymphoniaMetadataReader};
use wavetap_ap::playback::{SessionRegistry, SessionSettings};
use wavetap_common::EventBus;

use super::event_collector::EventCollector;
use super::fake_engine::{FakeEngineFactory, FakeEngineHandle};

pub struct TestServer {
    router: Router,
    commands: Arc<CommandRouter>,
    registry: Arc<SessionRegistry>,
    factory: Arc<FakeEngineFactory>,
    bus: Arc<EventBus>,
}

impl TestServer {
    /// Server with default session settings (push delivery, no autoplay)
    pub fn start() -> Self {
        Self::with_settings(SessionSettings::default())
    }

    pub fn with_settings(settings: SessionSettings) -> Self {
        let factory = Arc::new(FakeEngineFactory::new());
        let bus = Arc::new(EventBus::new(256));
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&factory) as Arc<dyn EngineFactory>,
            Arc::clone(&bus),
            settings,
        ));
        let commands = Arc::new(CommandRouter::new(
            Arc::clone(&registry),
            Arc::new(SymphoniaMetadataReader::new()),
        ));
        let router = create_router(AppContext {
            commands: Arc::clone(&commands),
            bus: Arc::clone(&bus),
            port: 0,
        });

        Self {
            router,
            commands,
            registry,
            factory,
            bus,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Fake engine behind session `id`
    pub fn engine(&self, id: &str) -> FakeEngineHandle {
        self.factory.handle(id)
    }

    pub fn factory(&self) -> &FakeEngineFactory {
        &self.factory
    }

    pub fn events(&self) -> EventCollector {
        EventCollector::new(&self.bus)
    }

    /// Dispatch straight to the command router
    pub async fn dispatch(&self, method: &str, args: CommandArgs) -> wavetap_ap::Result<CommandReply> {
        self.commands.dispatch(method, args).await
    }

    /// Dispatch and return the reply value, panicking on error
    pub async fn query(&self, method: &str, id: &str) -> Value {
        match self.dispatch(method, CommandArgs::with_id(id)).await {
            Ok(CommandReply::Value(value)) => value,
            other => panic!("{} on {} returned {:?}", method, id, other),
        }
    }

    /// POST a JSON body to `/api/v1/command/{method}`
    pub async fn post_command(&self, method: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/command/{}", method))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// POST a raw body (malformed-input tests)
    pub async fn post_raw(&self, method: &str, body: &'static str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/command/{}", method))
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

/// Write a mono 16-bit WAV of `frames` frames at `sample_rate`
pub fn write_test_wav(path: &Path, sample_rate: u32, frames: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        writer.write_sample(((i % 200) as i16 - 100) * 50).unwrap();
    }
    writer.finalize().unwrap();
}
