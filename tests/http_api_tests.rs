use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use nfsgate::auth::AuthService;
use nfsgate::config::{GatewayConfig, MonitorConfig, ThrottleConfig};
use nfsgate::files::{FileGateway, Sandbox};
use nfsgate::identity::{JwtAuthority, LoginThrottle};
use nfsgate::monitor::Monitor;
use nfsgate::repository::{initialize, Repository, DEFAULT_ADMIN_EMAIL};
use nfsgate::server::{build_router, AppState};

const BOUNDARY: &str = "nfsgate-test-boundary";

struct Harness {
    _data: TempDir,
    root: TempDir,
    app: Router,
}

fn harness() -> Harness {
    let data = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    initialize(data.path(), DEFAULT_ADMIN_EMAIL, "admin-pw").unwrap();

    let repo = Arc::new(Repository::open(data.path()).unwrap());
    let jwt = Arc::new(JwtAuthority::new("http-test-secret").unwrap());
    let auth = AuthService::new(repo.clone(), jwt.clone(), jwt, LoginThrottle::new(ThrottleConfig::default())).unwrap();
    let sandbox = Sandbox::new(root.path()).unwrap();
    let monitor = Monitor::new(root.path(), MonitorConfig::default());
    let state = AppState::new(repo, auth, FileGateway::new(sandbox), monitor);
    Harness { _data: data, root, app: build_router(state) }
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

async fn send(app: &Router, req: Request<Body>) -> Reply {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    Reply { status, headers, body }
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut b = Request::builder().method(method).uri(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        b = b.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    b.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut b = Request::builder().method("GET").uri(uri);
    if let Some(t) = token {
        b = b.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    b.body(Body::empty()).unwrap()
}

fn multipart(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, filename, data) in parts {
        out.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(f) => out.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    name, f
                )
                .as_bytes(),
            ),
            None => out.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes()),
        }
        out.extend_from_slice(data);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    out
}

fn upload_request(uri: &str, token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let r = send(app, json_request("POST", "/api/auth/login", None, json!({"email": email, "password": password}))).await;
    assert_eq!(r.status, StatusCode::OK, "login failed: {:?}", r.body);
    r.json()["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn liveness_needs_no_token() {
    let h = harness();
    let r = send(&h.app, get("/", None)).await;
    assert_eq!(r.status, StatusCode::OK);
}

#[tokio::test]
async fn missing_or_bad_bearer_is_unauthorized() {
    let h = harness();
    let r = send(&h.app, get("/api/files?path=/", None)).await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    let body = r.json();
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "missing_token");

    let r = send(&h.app, get("/api/admin/users", Some("not-a-token"))).await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_admin_is_forbidden_on_admin_routes() {
    let h = harness();
    let r = send(
        &h.app,
        json_request("POST", "/api/auth/register", None, json!({"email": "joe@x", "password": "pw", "name": "Joe"})),
    )
    .await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(r.json().get("password").is_none());

    let token = login(&h.app, "joe@x", "pw").await;
    let r = send(&h.app, get("/api/admin/users", Some(&token))).await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
    let r = send(&h.app, get("/api/monitoring", Some(&token))).await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);

    let admin = login(&h.app, DEFAULT_ADMIN_EMAIL, "admin-pw").await;
    let r = send(&h.app, get("/api/admin/users", Some(&admin))).await;
    assert_eq!(r.status, StatusCode::OK);
    let users = r.json();
    assert_eq!(users.as_array().unwrap().len(), 2);
    assert!(users[0].get("password").is_none());
}

#[tokio::test]
async fn login_failures_are_uniform() {
    let h = harness();
    let a = send(&h.app, json_request("POST", "/api/auth/login", None, json!({"email": "ghost@x", "password": "pw"}))).await;
    let b = send(
        &h.app,
        json_request("POST", "/api/auth/login", None, json!({"email": DEFAULT_ADMIN_EMAIL, "password": "wrong"})),
    )
    .await;
    assert_eq!(a.status, StatusCode::UNAUTHORIZED);
    assert_eq!(a.body, b.body);

    let malformed = send(&h.app, json_request("POST", "/api/auth/login", None, json!({"email": 7}))).await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
    assert_eq!(malformed.json()["code"], "invalid_body");
}

#[tokio::test]
async fn profile_and_logout() {
    let h = harness();
    let token = login(&h.app, DEFAULT_ADMIN_EMAIL, "admin-pw").await;
    let r = send(&h.app, get("/api/auth/profile", Some(&token))).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.json()["email"], DEFAULT_ADMIN_EMAIL);

    let r = send(&h.app, json_request("PUT", "/api/auth/profile", Some(&token), json!({"name": "Root"}))).await;
    assert_eq!(r.json()["name"], "Root");

    let r = send(&h.app, json_request("POST", "/api/logout", Some(&token), json!({}))).await;
    assert_eq!(r.status, StatusCode::OK);
    let r = send(&h.app, get("/api/auth/profile", Some(&token))).await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    assert_eq!(r.json()["code"], "token_revoked");
}

#[tokio::test]
async fn folder_upload_rename_delete_cycle() {
    let h = harness();
    let token = login(&h.app, DEFAULT_ADMIN_EMAIL, "admin-pw").await;

    let r = send(&h.app, json_request("POST", "/api/files/folder", Some(&token), json!({"path": "/", "name": "docs"}))).await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert_eq!(r.json()["path"], "/docs");
    let again = send(&h.app, json_request("POST", "/api/files/folder", Some(&token), json!({"path": "/", "name": "docs"}))).await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let body = multipart(&[("path", None, &b"/docs"[..]), ("file", Some("report.pdf"), &b"%PDF-1.4 hello"[..])]);
    let r = send(&h.app, upload_request("/api/files/upload", &token, body)).await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert_eq!(r.json()["size"], 14);
    assert_eq!(std::fs::read(h.root.path().join("docs/report.pdf")).unwrap(), b"%PDF-1.4 hello");

    let r = send(&h.app, get("/api/files?path=/docs", Some(&token))).await;
    let names: Vec<String> = r.json().as_array().unwrap().iter().map(|e| e["name"].as_str().unwrap().to_string()).collect();
    assert_eq!(names, vec!["report.pdf"]);

    let r = send(
        &h.app,
        json_request("PUT", "/api/files/rename", Some(&token), json!({"path": "/docs/report.pdf", "newName": "final.pdf"})),
    )
    .await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.json()["path"], "/docs/final.pdf");

    let r = send(&h.app, get("/api/files/info?path=/docs/final.pdf", Some(&token))).await;
    assert_eq!(r.json()["is_dir"], false);

    let r = send(&h.app, json_request("DELETE", "/api/files", Some(&token), json!({"path": "/docs"}))).await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
    assert!(!h.root.path().join("docs").exists());
}

#[tokio::test]
async fn upload_with_file_before_path_and_type_filter() {
    let h = harness();
    let token = login(&h.app, DEFAULT_ADMIN_EMAIL, "admin-pw").await;
    std::fs::create_dir(h.root.path().join("in")).unwrap();

    let body = multipart(&[("file", Some("scan.png"), &b"\x89PNG...."[..]), ("path", None, &b"/in"[..])]);
    let r = send(&h.app, upload_request("/api/files/upload", &token, body)).await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(h.root.path().join("in/scan.png").exists());

    let body = multipart(&[("file", Some("tool.exe"), &b"MZ"[..])]);
    let r = send(&h.app, upload_request("/api/files/upload?path=/in", &token, body)).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.json()["code"], "file_type_not_allowed");
    assert!(!h.root.path().join("in/tool.exe").exists());
}

#[tokio::test]
async fn byte_range_streaming() {
    let h = harness();
    let token = login(&h.app, DEFAULT_ADMIN_EMAIL, "admin-pw").await;
    let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(h.root.path().join("blob.bin"), &data).unwrap();

    let req = Request::builder()
        .uri("/api/files/stream?path=/blob.bin")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::RANGE, "bytes=100-199")
        .body(Body::empty())
        .unwrap();
    let r = send(&h.app, req).await;
    assert_eq!(r.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(r.headers[header::CONTENT_RANGE], "bytes 100-199/1000");
    assert_eq!(r.headers[header::ACCEPT_RANGES], "bytes");
    assert_eq!(&r.body[..], &data[100..200]);

    let whole = send(&h.app, get("/api/files/stream?path=/blob.bin", Some(&token))).await;
    assert_eq!(whole.status, StatusCode::OK);
    assert_eq!(whole.body.len(), 1000);

    let req = Request::builder()
        .uri("/api/files/download?path=/blob.bin&mode=download")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::RANGE, "bytes=5000-")
        .body(Body::empty())
        .unwrap();
    let r = send(&h.app, req).await;
    assert_eq!(r.status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(r.headers[header::CONTENT_RANGE], "bytes */1000");
}

#[tokio::test]
async fn download_mode_sets_attachment() {
    let h = harness();
    let token = login(&h.app, DEFAULT_ADMIN_EMAIL, "admin-pw").await;
    std::fs::write(h.root.path().join("a.txt"), b"hi").unwrap();
    let r = send(&h.app, get("/api/files/download?path=/a.txt&mode=download", Some(&token))).await;
    assert_eq!(r.status, StatusCode::OK);
    let disposition = r.headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment"));
    let r = send(&h.app, get("/api/files/preview?path=/a.txt", Some(&token))).await;
    assert_eq!(r.headers[header::CONTENT_TYPE], "text/plain");
    assert!(r.headers[header::CONTENT_DISPOSITION].to_str().unwrap().starts_with("inline"));
}

#[tokio::test]
async fn escapes_are_rejected() {
    let h = harness();
    let token = login(&h.app, DEFAULT_ADMIN_EMAIL, "admin-pw").await;
    let r = send(&h.app, get("/api/files?path=/../..", Some(&token))).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.json()["code"], "path_outside_root");

    let r = send(&h.app, get("/api/files/info?path=/nope", Some(&token))).await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
    let r = send(&h.app, get("/api/files/info", Some(&token))).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_roles_settings_and_audit() {
    let h = harness();
    let admin = login(&h.app, DEFAULT_ADMIN_EMAIL, "admin-pw").await;

    let role = json!({"id": 7, "name": "auditor", "permissions": ["audit:read"]});
    let r = send(&h.app, json_request("POST", "/api/admin/roles", Some(&admin), role.clone())).await;
    assert_eq!(r.status, StatusCode::CREATED);
    let dup = send(&h.app, json_request("POST", "/api/admin/roles", Some(&admin), role)).await;
    assert_eq!(dup.status, StatusCode::CONFLICT);

    let r = send(&h.app, get("/api/admin/roles/abc", Some(&admin))).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    let r = send(&h.app, json_request("DELETE", "/api/admin/roles/7", Some(&admin), json!({}))).await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
    let r = send(&h.app, get("/api/admin/roles/7", Some(&admin))).await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);

    let r = send(&h.app, get("/api/admin/settings", Some(&admin))).await;
    let mut settings = r.json();
    assert_eq!(settings["max_file_size"], 100);
    settings["session_timeout"] = json!(45);
    let r = send(&h.app, json_request("PUT", "/api/admin/settings", Some(&admin), settings)).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.json()["session_timeout"], 45);

    let r = send(&h.app, get("/api/admin/audit-logs", Some(&admin))).await;
    let actions: Vec<String> = r.json().as_array().unwrap().iter().map(|a| a["action"].as_str().unwrap().to_string()).collect();
    assert_eq!(actions, vec!["create_role", "delete_role", "update_settings"]);
}

#[tokio::test]
async fn bulk_delete_reports_count() {
    let h = harness();
    let admin = login(&h.app, DEFAULT_ADMIN_EMAIL, "admin-pw").await;
    let r = send(
        &h.app,
        json_request("POST", "/api/admin/users", Some(&admin), json!({"id": "u1", "email": "u1@x", "password": "pw", "roleId": 2})),
    )
    .await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert_eq!(r.json()["role"]["name"], "user");

    let r = send(
        &h.app,
        json_request("POST", "/api/admin/users/bulk-delete", Some(&admin), json!({"ids": ["u1", "u2", "u3"]})),
    )
    .await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.json()["deleted"], 1);
}

#[tokio::test]
async fn data_dir_inside_fs_root_is_withheld_from_file_routes() {
    let root = tempfile::tempdir().unwrap();
    let data = root.path().join("data");
    initialize(&data, DEFAULT_ADMIN_EMAIL, "admin-pw").unwrap();
    let cfg = GatewayConfig {
        http_port: 0,
        data_dir: data.clone(),
        fs_root: root.path().to_path_buf(),
        jwt_secret: "http-test-secret".into(),
        cors_origins: Vec::new(),
        init: false,
        admin_password: None,
        throttle: ThrottleConfig::default(),
        monitor: MonitorConfig::default(),
    };
    let app = build_router(AppState::from_config(&cfg).unwrap());

    let r = send(&app, json_request("POST", "/api/auth/register", None, json!({"email": "eve@x", "password": "pw"}))).await;
    assert_eq!(r.status, StatusCode::CREATED);
    let eve = login(&app, "eve@x", "pw").await;
    let users_before = std::fs::read(data.join("users.json")).unwrap();

    let r = send(&app, get("/api/files?path=/", Some(&eve))).await;
    assert_eq!(r.status, StatusCode::OK);
    assert!(r.json().as_array().unwrap().iter().all(|e| e["name"] != "data"));

    let r = send(&app, get("/api/files/stream?path=/data/users.json", Some(&eve))).await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
    assert_eq!(r.json()["code"], "path_reserved");

    let planted = json!([{"id": "x", "email": "eve2@x", "password": "", "role": {"id": 1, "name": "admin"}}]);
    let body = multipart(&[("path", None, &b"/data"[..]), ("file", Some("evil.png"), planted.to_string().as_bytes())]);
    let r = send(&app, upload_request("/api/files/upload", &eve, body)).await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);

    let r = send(&app, json_request("DELETE", "/api/files", Some(&eve), json!({"path": "/data/users.json"}))).await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
    let r = send(&app, json_request("DELETE", "/api/files", Some(&eve), json!({"path": "/data"}))).await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
    let r = send(&app, json_request("PUT", "/api/files/rename", Some(&eve), json!({"path": "/data", "newName": "loot"}))).await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);

    // a file planted next to the data dir cannot be renamed into it
    let body = multipart(&[("path", None, &b"/"[..]), ("file", Some("evil.png"), planted.to_string().as_bytes())]);
    let r = send(&app, upload_request("/api/files/upload", &eve, body)).await;
    assert_eq!(r.status, StatusCode::CREATED);
    let r = send(&app, json_request("PUT", "/api/files/rename", Some(&eve), json!({"path": "/evil.png", "newName": "data"}))).await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);

    assert_eq!(std::fs::read(data.join("users.json")).unwrap(), users_before);
    let r = send(&app, get("/api/admin/users", Some(&eve))).await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_access_follows_the_stored_account() {
    let h = harness();
    let admin = login(&h.app, DEFAULT_ADMIN_EMAIL, "admin-pw").await;
    let r = send(
        &h.app,
        json_request("POST", "/api/admin/users", Some(&admin), json!({"id": "boss", "email": "boss@x", "password": "pw", "roleId": 1})),
    )
    .await;
    assert_eq!(r.status, StatusCode::CREATED);
    let boss = login(&h.app, "boss@x", "pw").await;
    assert_eq!(send(&h.app, get("/api/admin/users", Some(&boss))).await.status, StatusCode::OK);

    let r = send(&h.app, json_request("PUT", "/api/admin/users/boss", Some(&admin), json!({"roleId": 2}))).await;
    assert_eq!(r.status, StatusCode::OK);
    let r = send(&h.app, get("/api/admin/users", Some(&boss))).await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);

    let r = send(&h.app, json_request("DELETE", "/api/admin/users/boss", Some(&admin), json!({}))).await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
    let r = send(&h.app, get("/api/files?path=/", Some(&boss))).await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    assert_eq!(r.json()["code"], "account_not_found");
}
