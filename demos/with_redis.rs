//! Redis backend example
//!
//! Sessions are stored as Redis hashes under `app:sessions:session_<id>`.
//! The hash and block keys come from the environment so sessions survive
//! restarts and can be shared by several instances:
//!
//! ```text
//! REDIS_URL=redis://127.0.0.1/ \
//! SESSION_HASH_KEY=0123456789abcdef0123456789abcdef \
//! SESSION_BLOCK_KEY=fedcba9876543210fedcba9876543210 \
//! cargo run --example with_redis
//! ```
//!
//! `SESSION_OLD_HASH_KEY` may hold a previous hash key; cookies signed with it
//! are still accepted while new cookies use the current key.

use salvo::prelude::*;
use salvo_kv_session::{
    RedisBackend, SessionDepotExt, SessionHandler, SessionStore, StoreConfig,
};
use serde::Serialize;
use std::sync::Arc;

const SESSION_NAME: &str = "sid";

#[derive(Serialize)]
struct SessionInfo {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
    #[serde(rename = "isNew")]
    is_new: bool,
    expired: bool,
    data: serde_json::Value,
}

#[handler]
async fn health() -> &'static str {
    "ok"
}

#[handler]
async fn index(depot: &mut Depot) -> String {
    let session = depot.session(SESSION_NAME).expect("Session not found");

    let views: i32 = session.get("views").unwrap_or(0);
    session.set("views", views + 1).expect("views serialize");

    format!("Hello from Rust + Redis!\nViews: {}", views + 1)
}

#[handler]
async fn get_session_info(depot: &mut Depot) -> Json<SessionInfo> {
    let session = depot.session(SESSION_NAME).expect("Session not found");

    Json(SessionInfo {
        session_id: session.id(),
        is_new: session.is_new(),
        expired: session.is_expired(),
        data: serde_json::to_value(session.values()).unwrap_or_default(),
    })
}

#[handler]
async fn set_data(req: &mut Request, depot: &mut Depot) -> String {
    let session = depot.session(SESSION_NAME).expect("Session not found");

    let key = req
        .query::<String>("key")
        .unwrap_or_else(|| "testKey".to_string());
    let value = req
        .query::<String>("value")
        .unwrap_or_else(|| "testValue".to_string());

    session.set(&key, &value).expect("value serializes");
    session
        .set("lastModifiedAt", chrono::Utc::now().to_rfc3339())
        .expect("timestamp serializes");

    format!("{} = {}", key, value)
}

#[handler]
async fn destroy_session(depot: &mut Depot) -> &'static str {
    let session = depot.session(SESSION_NAME).expect("Session not found");
    session.destroy();
    "Session destroyed"
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    let hash_key = std::env::var("SESSION_HASH_KEY")
        .unwrap_or_else(|_| "change-me-change-me-change-me-32".to_string());
    let block_key = std::env::var("SESSION_BLOCK_KEY").unwrap_or_default();
    let old_hash_key = std::env::var("SESSION_OLD_HASH_KEY").ok();

    let mut key_pairs: Vec<&[u8]> = vec![hash_key.as_bytes(), block_key.as_bytes()];
    if let Some(old) = &old_hash_key {
        key_pairs.push(old.as_bytes());
    }

    let backend = RedisBackend::from_url(&redis_url)
        .await
        .expect("Failed to connect to Redis");
    let store = SessionStore::new(StoreConfig::new("app", "sessions"), backend, &key_pairs)
        .expect("session store");
    let store = Arc::new(store);

    let router = Router::new()
        .push(Router::with_path("health").get(health))
        .push(
            Router::new()
                .hoop(SessionHandler::from_shared(Arc::clone(&store), SESSION_NAME))
                .get(index)
                .push(Router::with_path("session").get(get_session_info))
                .push(Router::with_path("set").get(set_data))
                .push(Router::with_path("destroy").get(destroy_session)),
        );

    let acceptor = TcpListener::new("127.0.0.1:5801").bind().await;
    println!("Server running at http://127.0.0.1:5801 (Redis: {})", redis_url);

    let server = Server::new(acceptor);
    let handle = server.handle();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        handle.stop_graceful(None);
    });
    server.serve(router).await;

    // Release the Redis connection on shutdown
    store.close().await;
}
