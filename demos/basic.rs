//! Basic example using the in-memory backend

use salvo::prelude::*;
use salvo_kv_session::securecookie::generate_random_key;
use salvo_kv_session::{
    MemoryBackend, Options, SessionDepotExt, SessionHandler, SessionStore, StoreConfig,
};

const SESSION_NAME: &str = "sid";

#[handler]
async fn index(depot: &mut Depot) -> String {
    let session = depot.session(SESSION_NAME).expect("Session not found");

    // Get current view count
    let views: i32 = session.get("views").unwrap_or(0);

    // Increment view count
    session.set("views", views + 1).expect("views serialize");

    format!(
        "Hello! You have viewed this page {} time(s).\nSession ID: {}",
        views + 1,
        session.id().unwrap_or_else(|| "(assigned on save)".to_string())
    )
}

#[handler]
async fn get_user(depot: &mut Depot) -> String {
    let session = depot.session(SESSION_NAME).expect("Session not found");

    match session.get::<String>("user") {
        Some(user) => format!("Logged in as: {}", user),
        None if session.is_expired() => "Your session expired, please log in again".to_string(),
        None => "Not logged in".to_string(),
    }
}

#[handler]
async fn set_user(req: &mut Request, depot: &mut Depot) -> String {
    let session = depot.session(SESSION_NAME).expect("Session not found");

    // Get username from query parameter
    let username = req.query::<String>("name").unwrap_or_else(|| "anonymous".to_string());

    session.set("user", &username).expect("user serializes");

    format!("User set to: {}", username)
}

#[handler]
async fn logout(depot: &mut Depot) -> &'static str {
    let session = depot.session(SESSION_NAME).expect("Session not found");

    // Clear all session data
    session.clear();

    "Logged out successfully"
}

#[handler]
async fn destroy_session(depot: &mut Depot) -> &'static str {
    let session = depot.session(SESSION_NAME).expect("Session not found");

    // Delete the record and expire the cookie
    session.destroy();

    "Session destroyed"
}

#[tokio::main]
async fn main() {
    // Set up logging
    tracing_subscriber::fmt::init();

    // Random keys: sessions don't survive a restart, which is fine for a memory backend
    let hash_key = generate_random_key(32);
    let block_key = generate_random_key(32);

    let config = StoreConfig::new("app", "sessions")
        .with_options(Options::default().with_max_age(3600)); // 1 hour

    let store = SessionStore::new(
        config,
        MemoryBackend::new(),
        &[hash_key.as_slice(), block_key.as_slice()],
    )
    .expect("session store");

    let session_handler = SessionHandler::new(store, SESSION_NAME);

    // Build router
    let router = Router::new()
        .hoop(session_handler)
        .get(index)
        .push(Router::with_path("user").get(get_user))
        .push(Router::with_path("login").get(set_user))
        .push(Router::with_path("logout").get(logout))
        .push(Router::with_path("destroy").get(destroy_session));

    // Start server
    let acceptor = TcpListener::new("127.0.0.1:5800").bind().await;
    println!("Server running at http://127.0.0.1:5800");
    println!("Try these endpoints:");
    println!("  GET /           - View counter");
    println!("  GET /user       - Get current user");
    println!("  GET /login?name=alice - Set user");
    println!("  GET /logout     - Clear session");
    println!("  GET /destroy    - Destroy session");

    Server::new(acceptor).serve(router).await;
}
