//! Shared helpers for integration tests: in-process mock servers and
//! pre-wired generators pointed at them.
#![allow(dead_code)]

pub mod mocks;

use std::net::TcpListener;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use serde_json::Value;

use text2video_backend::comfyui::workflow::GraphSettings;
use text2video_backend::comfyui::{ComfyUIAdapter, ComfyUIClient, ComfyUISettings};
use text2video_backend::enhancer::EnhancerClient;
use text2video_backend::external::{ExternalApiAdapter, ExternalApiSettings, ExternalProvider, ProviderEndpoint};
use text2video_backend::generation::poll::PollPolicy;
use text2video_backend::generation::{GeneratorBackend, Orchestrator, OrchestratorSettings};
use text2video_backend::usage::UsageCounters;
use text2video_backend::web::{
    BrowserOptions, SessionManager, WebAutomationAdapter, WebAutomationSettings, WebDriverClient,
};

/// Bind an ephemeral port without serving yet, for mocks that need their own URL.
pub fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    (listener, base)
}

pub fn serve(listener: TcpListener, router: Router) {
    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(router.into_make_service())
            .await
            .unwrap();
    });
}

/// Serve `router` on an ephemeral port and return its base URL.
pub fn spawn(router: Router) -> String {
    let (listener, base) = bind();
    serve(listener, router);
    base
}

/// A URL nothing listens on.
pub fn dead_url() -> String {
    let (listener, base) = bind();
    drop(listener);
    base
}

pub fn comfy_settings() -> ComfyUISettings {
    ComfyUISettings {
        timeout: Duration::from_secs(5),
        preflight_timeout: Duration::from_secs(1),
        poll: PollPolicy::fixed(20, Duration::from_millis(10)),
        graph: GraphSettings {
            checkpoint: "test.safetensors".to_string(),
            filename_prefix: "t2v".to_string(),
            frame_rate: 8,
            default_duration: 5,
        },
        image_workflow: None,
        video_workflow: None,
    }
}

pub fn comfy_backend(base: &str) -> GeneratorBackend {
    GeneratorBackend::ComfyUI(ComfyUIAdapter::new(ComfyUIClient::new(base.to_string()), comfy_settings()))
}

pub fn external_settings(provider: ExternalProvider, base: &str, token: Option<&str>) -> ExternalApiSettings {
    let endpoint = ProviderEndpoint {
        base_url: base.to_string(),
        token: token.map(str::to_string),
        image_model: "acme/imagegen".to_string(),
        video_model: Some("acme/videogen".to_string()),
    };
    ExternalApiSettings {
        provider,
        timeout: Duration::from_secs(5),
        poll: PollPolicy::fixed(20, Duration::from_millis(10)),
        replicate: endpoint.clone(),
        huggingface: endpoint,
    }
}

pub fn external_backend(base: &str, token: Option<&str>) -> GeneratorBackend {
    GeneratorBackend::External(ExternalApiAdapter::new(external_settings(ExternalProvider::Replicate, base, token)))
}

pub fn session_manager(base: &str, max_waiters: usize) -> SessionManager {
    let driver = WebDriverClient::new(
        base.to_string(),
        BrowserOptions { headless: true, command_timeout: Duration::from_secs(2) },
    );
    SessionManager::new(driver, max_waiters)
}

pub fn web_adapter(sessions: SessionManager, job_timeout: Duration) -> WebAutomationAdapter {
    WebAutomationAdapter::new(
        sessions,
        WebAutomationSettings {
            site_url: "https://lmarena.ai".to_string(),
            job_timeout,
            acquire_timeout: Duration::from_secs(2),
            result_poll_interval: Duration::from_millis(10),
        },
    )
}

pub fn enhancer(base: &str) -> EnhancerClient {
    EnhancerClient::new(base.to_string(), "llama3.2".to_string(), 2000)
}

pub fn orchestrator(
    enhancer: Option<EnhancerClient>,
    backends: Vec<GeneratorBackend>,
    usage: UsageCounters,
) -> Orchestrator {
    let settings = OrchestratorSettings { enhance_timeout: Duration::from_secs(2), ..Default::default() };
    Orchestrator::new(enhancer, backends, usage, settings)
}

pub async fn body_json(response: Response) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().method(Method::GET).uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
