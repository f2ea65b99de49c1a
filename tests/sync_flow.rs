//! End-to-end synchronization flow against a mock config server: startup
//! fetch, precedence merge, placeholder resolution, cipher handling, masked
//! reporting, and live updates through the HTTP push strategy.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::{Json, Router};
use configcenter_client::crypto::symmetric;
use configcenter_client::fetcher::FETCH_PATH;
use configcenter_client::reporter::NOTIFY_PATH;
use configcenter_client::{
    ChangeListener, ConfigChangeHandler, ConfigContext, ConfigStatus, HttpChangeListener,
    StaticHandlerProvider,
};

fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn serve(router: Router) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, handle)
}

fn config_server(
    remote: serde_json::Value,
) -> (Router, Arc<Mutex<Option<serde_json::Value>>>) {
    let reported: Arc<Mutex<Option<serde_json::Value>>> = Arc::default();
    let sink = reported.clone();
    let router = Router::new()
        .route(FETCH_PATH, get(move || async move { Json(remote) }))
        .route(
            NOTIFY_PATH,
            post(move |Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some(body);
                    "ok"
                }
            }),
        )
        .route("/api/ping", get(|| async { "pong" }));
    (router, reported)
}

struct RecordingHandler {
    batches: Mutex<Vec<HashMap<String, String>>>,
}

impl ConfigChangeHandler for RecordingHandler {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_config_changed(&self, batch: &HashMap<String, String>) -> anyhow::Result<()> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }
}

#[tokio::test]
async fn startup_flow_merges_decrypts_and_reports() {
    let tagged_password = format!(
        "{{Cipher}}{}",
        symmetric::encrypt("s3cr3t", "hunter2").unwrap()
    );
    let (router, reported) = config_server(serde_json::json!({
        "jeesuite.configcenter.encrypt-secret": "s3cr3t",
        "db.password": tagged_password,
        "db.host": "10.0.0.99",
        "db.url": "jdbc:mysql://${db.host}:3306/app",
        "feature.flag": "[Override]",
    }));
    let (addr, server) = serve(router).await;

    let context = Arc::new(ConfigContext::new());
    context
        .init(props(&[
            ("jeesuite.configcenter.appName", "demo"),
            ("jeesuite.configcenter.profile", "dev"),
            ("jeesuite.configcenter.base.url", &format!("http://{addr}/")),
            ("db.host", "10.0.0.5"),
            ("local.timeout", "30"),
        ]))
        .await
        .unwrap();

    assert_eq!(context.status().await, Some(ConfigStatus::Uploaded));

    // Local precedence: the overlapping key keeps its local value and the
    // placeholder resolves against it.
    assert_eq!(context.get_property("db.host").as_deref(), Some("10.0.0.5"));
    assert_eq!(
        context.get_property("db.url").as_deref(),
        Some("jdbc:mysql://10.0.0.5:3306/app")
    );

    // Protected value arrives decrypted; the control properties never land
    // in the visible set.
    assert_eq!(
        context.get_property("db.password").as_deref(),
        Some("hunter2")
    );
    assert_eq!(
        context.get_property("jeesuite.configcenter.encrypt-secret"),
        None
    );
    assert_eq!(context.get_property("feature.flag"), None);

    // The report carries identity plus the masked final set.
    let report = reported.lock().unwrap().take().unwrap();
    assert_eq!(report["appName"], "demo");
    assert_eq!(report["env"], "dev");
    assert!(!report["nodeId"].as_str().unwrap().is_empty());
    assert_eq!(report["db.password"], "hun****");
    assert_eq!(report["local.timeout"], "30");

    assert!(context.ping_cc_server(0).await);

    context.close().await;
    server.abort();
}

#[tokio::test]
async fn http_push_applies_live_updates() {
    let (router, _) = config_server(serde_json::json!({
        "jeesuite.configcenter.encrypt-secret": "s3cr3t",
        "live.key": "v1",
    }));
    let (addr, server) = serve(router).await;

    let handler = Arc::new(RecordingHandler {
        batches: Mutex::new(Vec::new()),
    });
    let context = Arc::new(ConfigContext::new().with_handler_provider(Box::new(
        StaticHandlerProvider::new(vec![handler.clone()]),
    )));
    context
        .init(props(&[
            ("jeesuite.configcenter.appName", "demo"),
            ("jeesuite.configcenter.base.url", &format!("http://{addr}")),
        ]))
        .await
        .unwrap();

    let listener = HttpChangeListener::new();
    listener.register(context.clone()).await.unwrap();

    let tagged = format!(
        "{{Cipher}}{}",
        symmetric::encrypt("s3cr3t", "fresh").unwrap()
    );
    listener
        .handle_push(props(&[("live.key", tagged.as_str())]))
        .await
        .unwrap();

    assert_eq!(context.get_property("live.key").as_deref(), Some("fresh"));
    let batches = handler.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0], props(&[("live.key", "fresh")]));

    context.close().await;
    server.abort();
}
