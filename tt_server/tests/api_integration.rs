//! End-to-end tests driving the full router against the in-memory store.

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use todo_tracker::auth::AuthManager;
use todo_tracker::db::Store;
use todo_tracker::db::memory::MemoryStore;
use todo_tracker::mailer::{MemoryMailer, extract_token};
use tower::ServiceExt; // For `oneshot` method
use tt_server::api::{AppState, create_router};
use tt_server::background::BackgroundTasks;
use tt_server::config::{Environment, LimiterConfig};

const PEPPER: &str = "integration-test-pepper";
const TRUSTED_ORIGIN: &str = "http://localhost:9000";
const PASSWORD: &str = "pa55word";

struct TestApp {
    router: Router,
    mailer: Arc<MemoryMailer>,
    tasks: BackgroundTasks,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestApp {
    fn with_limiter(limiter: LimiterConfig) -> Self {
        let store = Store::from_memory(Arc::new(MemoryStore::new()));
        let mailer = Arc::new(MemoryMailer::new());
        let auth = AuthManager::new(store.clone(), PEPPER.to_string(), false)
            .with_params(AuthManager::low_cost_params());

        let state = AppState::new(
            store,
            PEPPER.to_string(),
            mailer.clone(),
            limiter,
            Environment::Development,
            vec![TRUSTED_ORIGIN.to_string()],
        )
        .with_auth(auth);
        let tasks = state.tasks.clone();

        Self {
            router: create_router(state),
            mailer,
            tasks,
        }
    }

    fn new() -> Self {
        Self::with_limiter(LimiterConfig {
            enabled: false,
            ..LimiterConfig::default()
        })
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
        }
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    async fn raw(&self, method: Method, uri: &str, body: &'static str) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn register(&self, name: &str, email: &str) -> TestResponse {
        self.call(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({"name": name, "email": email, "password": PASSWORD})),
        )
        .await
    }

    /// Activation token from the most recent email to `email`.
    async fn mailed_token(&self, email: &str) -> String {
        self.tasks.wait().await;
        let message = self.mailer.last_for(email).expect("an email was sent");
        extract_token(&message.body)
            .expect("email contains a token")
            .to_string()
    }

    async fn login(&self, email: &str) -> String {
        let res = self
            .call(
                Method::POST,
                "/v1/tokens/authentication",
                None,
                Some(json!({"email": email, "password": PASSWORD})),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
        res.body["authentication_token"]["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// Register, activate and log in; returns a bearer token.
    async fn activated_user(&self, email: &str) -> String {
        assert_eq!(self.register("Test User", email).await.status, StatusCode::ACCEPTED);
        let token = self.mailed_token(email).await;
        let res = self
            .call(
                Method::PUT,
                "/v1/users/activation",
                None,
                Some(json!({"token": token})),
            )
            .await;
        assert_eq!(res.status, StatusCode::ACCEPTED);
        self.login(email).await
    }

    async fn create_todo(&self, token: &str, body: Value) -> TestResponse {
        self.call(Method::POST, "/v1/todos", Some(token), Some(body)).await
    }
}

// ============================================================================
// Health and routing
// ============================================================================

#[tokio::test]
async fn test_healthcheck() {
    let app = TestApp::new();
    let res = app.call(Method::GET, "/v1/healthcheck", None, None).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "available");
    assert_eq!(res.body["system_info"]["environment"], "development");
    assert_eq!(res.headers[header::CONTENT_TYPE], "application/json");
}

#[tokio::test]
async fn test_request_id_is_echoed_or_generated() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/v1/healthcheck")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let res = app.send(request).await;
    assert_eq!(res.headers["x-request-id"], "abc-123");

    let res = app.call(Method::GET, "/v1/healthcheck", None, None).await;
    assert!(!res.headers["x-request-id"].is_empty());
}

#[tokio::test]
async fn test_unknown_route_and_wrong_method() {
    let app = TestApp::new();

    let res = app.call(Method::GET, "/v1/nothing-here", None, None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["error"], "the requested resource could not be found");

    let res = app.call(Method::PUT, "/v1/healthcheck", None, None).await;
    assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        res.body["error"],
        "the PUT method is not supported for this resource"
    );
}

#[tokio::test]
async fn test_debug_vars_without_recorder_is_not_found() {
    let app = TestApp::new();
    let res = app.call(Method::GET, "/debug/vars", None, None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_panic_becomes_500_and_closes_connection() {
    async fn boom() -> &'static str {
        panic!("handler exploded")
    }

    let router: Router = Router::new()
        .route("/boom", get(boom))
        .layer(middleware::from_fn(tt_server::api::middleware::recover_panic));

    let response = router
        .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[header::CONNECTION], "close");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body["error"],
        "the server encountered a problem and could not process your request"
    );
}

// ============================================================================
// Request bodies
// ============================================================================

#[tokio::test]
async fn test_malformed_bodies_are_rejected() {
    let app = TestApp::new();

    let res = app.raw(Method::POST, "/v1/users", "").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "request body must not be empty");

    let res = app.raw(Method::POST, "/v1/users", r#"{"name": "x",}"#).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(
        res.body["error"]
            .as_str()
            .unwrap()
            .starts_with("body contains badly-formed JSON (at line 1")
    );

    let res = app
        .raw(Method::POST, "/v1/users", r#"{"name": "x", "admin": true}"#)
        .await;
    assert_eq!(res.body["error"], "body contains unknown field \"admin\"");

    let res = app.raw(Method::POST, "/v1/users", r#"{"name": 7}"#).await;
    assert!(
        res.body["error"]
            .as_str()
            .unwrap()
            .starts_with("body contains JSON of incorrect type")
    );

    let res = app.raw(Method::POST, "/v1/users", r#"{"name": "x"} {}"#).await;
    assert_eq!(
        res.body["error"],
        "body must contain only a single JSON value"
    );
}

// ============================================================================
// User lifecycle
// ============================================================================

#[tokio::test]
async fn test_register_validation_and_duplicates() {
    let app = TestApp::new();

    let res = app
        .call(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({"name": "", "email": "not-an-email", "password": "short"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["name"], "must be provided");
    assert_eq!(res.body["error"]["email"], "must be a valid email address");
    assert_eq!(res.body["error"]["password"], "must be at least 8 bytes long");

    let res = app.register("Alice", "alice@example.com").await;
    assert_eq!(res.status, StatusCode::ACCEPTED);
    assert_eq!(res.body["user"]["email"], "alice@example.com");
    assert_eq!(res.body["user"]["activated"], false);
    assert!(res.body["user"].get("password_hash").is_none());

    let res = app.register("Alice Again", "ALICE@example.com").await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        res.body["error"]["email"],
        "a user with this email address already exists"
    );
}

#[tokio::test]
async fn test_activation_token_works_once() {
    let app = TestApp::new();
    app.register("Bob", "bob@example.com").await;
    let token = app.mailed_token("bob@example.com").await;

    let res = app
        .call(Method::PUT, "/v1/users/activation", None, Some(json!({"token": token})))
        .await;
    assert_eq!(res.status, StatusCode::ACCEPTED);
    assert_eq!(res.body["message"], "user successfully activated");
    assert_eq!(res.body["user"]["activated"], true);

    let res = app
        .call(Method::PUT, "/v1/users/activation", None, Some(json!({"token": token})))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["token"], "invalid or expired token");

    let res = app
        .call(Method::PUT, "/v1/users/activation", None, Some(json!({"token": "short"})))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["token"], "must be 26 bytes long");

    let res = app
        .call(
            Method::PUT,
            "/v1/users/activation",
            None,
            Some(json!({"token": "!".repeat(26)})),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        res.body["error"]["token"],
        "must contain only the characters A-Z and 2-7"
    );
}

#[tokio::test]
async fn test_activation_reissue_does_not_reveal_accounts() {
    let app = TestApp::new();
    app.activated_user("active@example.com").await;
    app.register("Pending", "pending@example.com").await;
    app.tasks.wait().await;
    let mails_before = app.mailer.sent().len();

    let mut bodies = Vec::new();
    for email in [
        "nobody@example.com",
        "active@example.com",
        "pending@example.com",
    ] {
        let res = app
            .call(
                Method::POST,
                "/v1/tokens/activation",
                None,
                Some(json!({"email": email})),
            )
            .await;
        assert_eq!(res.status, StatusCode::ACCEPTED);
        bodies.push(res.body);
    }
    assert!(bodies.iter().all(|b| *b == bodies[0]));
    assert_eq!(
        bodies[0]["message"],
        "an email will be sent to you containing activation instructions"
    );

    app.tasks.wait().await;
    let sent = app.mailer.sent();
    assert_eq!(sent.len(), mails_before + 1);
    assert_eq!(sent.last().unwrap().recipient, "pending@example.com");

    let res = app
        .call(
            Method::POST,
            "/v1/tokens/activation",
            None,
            Some(json!({"email": "bad"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_invalid_credentials() {
    let app = TestApp::new();
    app.activated_user("carol@example.com").await;

    for (email, password) in [
        ("carol@example.com", "wrong-password"),
        ("nobody@example.com", PASSWORD),
    ] {
        let res = app
            .call(
                Method::POST,
                "/v1/tokens/authentication",
                None,
                Some(json!({"email": email, "password": password})),
            )
            .await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.body["error"], "invalid authentication credentials");
    }
}

// ============================================================================
// Authentication and permission gates
// ============================================================================

#[tokio::test]
async fn test_gates() {
    let app = TestApp::new();

    let res = app.call(Method::GET, "/v1/todos", None, None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        res.body["error"],
        "you must be authenticated to access this resource"
    );
    assert!(
        res.headers
            .get_all(header::VARY)
            .iter()
            .any(|v| v == "Authorization")
    );

    // Unactivated users can log in but not use the todo routes.
    app.register("Dave", "dave@example.com").await;
    let token = app.login("dave@example.com").await;
    let res = app.call(Method::GET, "/v1/todos", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(
        res.body["error"],
        "your user account must be activated to access this resource"
    );
}

#[tokio::test]
async fn test_bad_authorization_headers() {
    let app = TestApp::new();

    for value in [
        "Bearer",
        "Basic abc",
        "Bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ",
        "Bearer tooshort",
        "Bearer !!!!!!!!!!!!!!!!!!!!!!!!!!",
        "Bearer a b",
    ] {
        let request = Request::builder()
            .uri("/v1/healthcheck")
            .header(header::AUTHORIZATION, value)
            .body(Body::empty())
            .unwrap();
        let res = app.send(request).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED, "{value}");
        assert_eq!(res.body["error"], "invalid or missing authentication token");
        assert_eq!(res.headers[header::WWW_AUTHENTICATE], "Bearer");
    }
}

#[tokio::test]
async fn test_activation_token_is_not_a_bearer_token() {
    let app = TestApp::new();
    app.register("Erin", "erin@example.com").await;
    let activation = app.mailed_token("erin@example.com").await;

    let res = app.call(Method::GET, "/v1/todos", Some(&activation), None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "invalid or missing authentication token");
}

// ============================================================================
// Todos
// ============================================================================

#[tokio::test]
async fn test_todo_lifecycle() {
    let app = TestApp::new();
    let token = app.activated_user("frank@example.com").await;

    let res = app
        .create_todo(&token, json!({"text": "buy milk @home +shopping"}))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let id = res.body["todo"]["id"].as_i64().unwrap();
    assert_eq!(res.headers[header::LOCATION], format!("/v1/todos/{id}"));
    assert_eq!(res.body["todo"]["text"], "buy milk @home +shopping");
    assert_eq!(res.body["todo"]["version"], 1);
    assert_eq!(res.body["todo"]["priority"], "");

    let res = app
        .call(Method::GET, &format!("/v1/todos/{id}"), Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["todo"]["text"], "buy milk @home +shopping");

    let res = app
        .call(
            Method::PATCH,
            &format!("/v1/todos/{id}"),
            Some(&token),
            Some(json!({"completed": true, "priority": "A", "version": 1})),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["todo"]["completed"], true);
    assert_eq!(res.body["todo"]["priority"], "A");
    assert_eq!(res.body["todo"]["text"], "buy milk @home +shopping");
    assert_eq!(res.body["todo"]["version"], 2);

    let res = app
        .call(Method::DELETE, &format!("/v1/todos/{id}"), Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["message"], "todo successfully deleted");

    let res = app
        .call(Method::GET, &format!("/v1/todos/{id}"), Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_todo_validation() {
    let app = TestApp::new();
    let token = app.activated_user("gina@example.com").await;

    let res = app
        .create_todo(
            &token,
            json!({"text": "", "priority": "AA", "contexts": ["a", "a"]}),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["text"], "must be provided");
    assert!(res.body["error"]["priority"].is_string());
    assert!(res.body["error"]["contexts"].is_string());
}

#[tokio::test]
async fn test_stale_version_is_rejected() {
    let app = TestApp::new();
    let token = app.activated_user("hank@example.com").await;
    let res = app.create_todo(&token, json!({"text": "write report"})).await;
    let uri = format!("/v1/todos/{}", res.body["todo"]["id"]);

    let res = app
        .call(
            Method::PATCH,
            &uri,
            Some(&token),
            Some(json!({"text": "write the report", "version": 1})),
        )
        .await;
    assert_eq!(res.body["todo"]["version"], 2);

    let res = app
        .call(
            Method::PATCH,
            &uri,
            Some(&token),
            Some(json!({"text": "stale edit", "version": 1})),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(
        res.body["error"],
        "unable to update the record due to an edit conflict, please try again"
    );

    let res = app.call(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(res.body["todo"]["text"], "write the report");
    assert_eq!(res.body["todo"]["version"], 2);

    let res = app
        .call(Method::PATCH, &uri, Some(&token), Some(json!({"text": ""})))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_todos_are_owner_scoped() {
    let app = TestApp::new();
    let owner = app.activated_user("ivy@example.com").await;
    let other = app.activated_user("jack@example.com").await;

    let res = app.create_todo(&owner, json!({"text": "private"})).await;
    let uri = format!("/v1/todos/{}", res.body["todo"]["id"]);

    let res = app.call(Method::GET, &uri, Some(&other), None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app
        .call(Method::PATCH, &uri, Some(&other), Some(json!({"text": "mine now"})))
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.call(Method::DELETE, &uri, Some(&other), None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.call(Method::GET, "/v1/todos", Some(&other), None).await;
    assert_eq!(res.body["todos"], json!([]));
    assert_eq!(res.body["paginationData"], json!({}));

    let res = app.call(Method::GET, &uri, Some(&owner), None).await;
    assert_eq!(res.body["todo"]["text"], "private");
}

#[tokio::test]
async fn test_bad_ids_are_not_found() {
    let app = TestApp::new();
    let token = app.activated_user("kim@example.com").await;

    for uri in ["/v1/todos/0", "/v1/todos/-3", "/v1/todos/abc"] {
        let res = app.call(Method::GET, uri, Some(&token), None).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn test_list_filters_sorting_and_paging() {
    let app = TestApp::new();
    let token = app.activated_user("leo@example.com").await;

    app.create_todo(&token, json!({"text": "buy milk"})).await;
    app.create_todo(&token, json!({"text": "walk dog", "completed": true}))
        .await;
    app.create_todo(&token, json!({"text": "call mom"})).await;
    app.create_todo(&token, json!({"text": "old stuff", "archived": true}))
        .await;

    let res = app.call(Method::GET, "/v1/todos", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["todos"].as_array().unwrap().len(), 3);

    let res = app
        .call(Method::GET, "/v1/todos?text=MILK", Some(&token), None)
        .await;
    let todos = res.body["todos"].as_array().unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0]["text"], "buy milk");

    let res = app
        .call(Method::GET, "/v1/todos?page_size=2&sort=-id", Some(&token), None)
        .await;
    let todos = res.body["todos"].as_array().unwrap();
    assert_eq!(todos.len(), 2);
    assert!(todos[0]["id"].as_i64() > todos[1]["id"].as_i64());
    assert_eq!(
        res.body["paginationData"],
        json!({"current_page": 1, "page_size": 2, "first_page": 1, "last_page": 2, "total_records": 3})
    );

    let res = app
        .call(Method::GET, "/v1/todos?sort=text", Some(&token), None)
        .await;
    let texts: Vec<&str> = res.body["todos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, ["buy milk", "call mom", "walk dog"]);

    let res = app
        .call(Method::GET, "/v1/todos?done=true", Some(&token), None)
        .await;
    assert_eq!(res.body["todos"].as_array().unwrap().len(), 1);

    let res = app
        .call(Method::GET, "/v1/todos?only-archived=true", Some(&token), None)
        .await;
    assert_eq!(res.body["todos"][0]["text"], "old stuff");

    let res = app
        .call(Method::GET, "/v1/todos?include-archived=1", Some(&token), None)
        .await;
    assert_eq!(res.body["todos"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_list_query_errors() {
    let app = TestApp::new();
    let token = app.activated_user("mia@example.com").await;

    let res = app
        .call(
            Method::GET,
            "/v1/todos?page=abc&done=maybe&sort=priority",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["page"], "must be an integer value");
    assert_eq!(res.body["error"]["done"], "must be a boolean value");
    assert_eq!(res.body["error"]["sort"], "invalid sorting key");

    let res = app
        .call(Method::GET, "/v1/todos?done=true&undone=true", Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.body["error"]["filters"].is_string());
}

// ============================================================================
// Batch delete
// ============================================================================

#[tokio::test]
async fn test_batch_delete_partial_failure() {
    let app = TestApp::new();
    let token = app.activated_user("ned@example.com").await;
    let res = app.create_todo(&token, json!({"text": "first"})).await;
    let id = res.body["todo"]["id"].as_i64().unwrap().to_string();

    let res = app
        .call(
            Method::DELETE,
            "/v1/batch/todos",
            Some(&token),
            Some(json!({"ids": [id, "bad", "999"]})),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        res.body,
        json!({
            "success": false,
            "results": [
                {"id": id, "success": true},
                {"id": "bad", "success": false, "error": "invalid ID"},
                {"id": "999", "success": false, "error": "not found"},
            ],
        })
    );

    let res = app
        .call(Method::GET, &format!("/v1/todos/{id}"), Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_batch_delete_all_succeed_and_empty() {
    let app = TestApp::new();
    let token = app.activated_user("olga@example.com").await;
    let a = app.create_todo(&token, json!({"text": "a"})).await;
    let b = app.create_todo(&token, json!({"text": "b"})).await;
    let ids = [
        a.body["todo"]["id"].to_string(),
        b.body["todo"]["id"].to_string(),
    ];

    let res = app
        .call(
            Method::DELETE,
            "/v1/batch/todos",
            Some(&token),
            Some(json!({"ids": ids})),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["success"], true);

    let res = app
        .call(
            Method::DELETE,
            "/v1/batch/todos",
            Some(&token),
            Some(json!({"ids": []})),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "no IDs provided");
}

// ============================================================================
// Rate limiting and CORS
// ============================================================================

#[tokio::test]
async fn test_rate_limit() {
    let app = TestApp::with_limiter(LimiterConfig {
        rps: 0.001,
        burst: 2,
        enabled: true,
    });

    let healthcheck = |ip: &'static str| {
        Request::builder()
            .uri("/v1/healthcheck")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    let res = app.send(healthcheck("203.0.113.1")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.headers["x-ratelimit-limit"], "2");
    assert_eq!(res.headers["x-ratelimit-remaining"], "1");
    assert!(res.headers.contains_key("x-ratelimit-reset"));

    assert_eq!(app.send(healthcheck("203.0.113.1")).await.status, StatusCode::OK);

    let res = app.send(healthcheck("203.0.113.1")).await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.body["error"], "rate limit exceeded");
    assert_eq!(res.headers["x-ratelimit-remaining"], "0");

    let res = app.send(healthcheck("203.0.113.2")).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_disabled_limiter_admits_everything() {
    let app = TestApp::new();
    for _ in 0..20 {
        let res = app.call(Method::GET, "/v1/healthcheck", None, None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert!(!res.headers.contains_key("x-ratelimit-limit"));
    }
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = TestApp::with_limiter(LimiterConfig {
        rps: 0.001,
        burst: 1,
        enabled: true,
    });

    let preflight = |origin: &'static str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/v1/users/activation")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .header("x-forwarded-for", "198.51.100.9")
            .body(Body::empty())
            .unwrap()
    };

    // Trusted preflights are answered before the limiter and never charged.
    for _ in 0..3 {
        let res = app.send(preflight(TRUSTED_ORIGIN)).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], TRUSTED_ORIGIN);
        let methods = res.headers[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap();
        assert!(methods.contains("PUT"));
        assert!(!res.headers.contains_key("x-ratelimit-limit"));
    }

    // Untrusted preflights fall through to the limiter and the router.
    let res = app.send(preflight("http://evil.example")).await;
    assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(!res.headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    assert_eq!(res.headers["x-ratelimit-remaining"], "0");

    for _ in 0..3 {
        let res = app.send(preflight("http://evil.example")).await;
        assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
        assert!(!res.headers.contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    }
}

#[tokio::test]
async fn test_cors_simple_request() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/v1/healthcheck")
        .header(header::ORIGIN, TRUSTED_ORIGIN)
        .body(Body::empty())
        .unwrap();
    let res = app.send(request).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], TRUSTED_ORIGIN);
    let vary: Vec<&str> = res
        .headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    assert!(vary.iter().any(|v| v.contains("origin") || v.contains("Origin")));
}
