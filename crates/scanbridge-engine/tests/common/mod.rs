//! Shared test backend: a scripted HTTP server standing in for the
//! document-management backend.

use std::sync::{Arc, Mutex};

use tiny_http::{Header, Method, Response, Server};

/// Mutable behavior and counters of the scripted backend.
#[derive(Default)]
pub struct BackendState {
    /// Successful folder uploads accepted.
    pub uploads: u32,
    /// Total folder-upload attempts seen (including failed ones).
    pub upload_attempts: u32,
    /// Respond 503 to every folder upload while true.
    pub fail_all_uploads: bool,
    /// Respond 403 to resolve-code calls while true.
    pub reject_resolve: bool,
    /// `server_url` echoed by resolve-code (backends behind reverse
    /// proxies echo a URL without the port).
    pub resolve_echo_url: Option<String>,
    /// resolve-code calls seen.
    pub resolves: u32,
    /// register calls seen.
    pub registers: u32,
}

pub struct TestBackend {
    pub url: String,
    pub state: Arc<Mutex<BackendState>>,
}

/// Spawns the scripted backend on an ephemeral port.
pub fn spawn_backend(initial: BackendState) -> TestBackend {
    let server = Server::http("127.0.0.1:0").expect("bind test backend");
    let port = server
        .server_addr()
        .to_ip()
        .expect("test backend ip addr")
        .port();
    let url = format!("http://127.0.0.1:{}", port);
    let state = Arc::new(Mutex::new(initial));

    let thread_state = state.clone();
    let self_url = url.clone();
    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            handle(request, &thread_state, &self_url);
        }
    });

    TestBackend { url, state }
}

fn json_response(body: String) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body).with_header(
        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap(),
    )
}

fn handle(request: tiny_http::Request, state: &Arc<Mutex<BackendState>>, self_url: &str) {
    let url = request.url().to_string();
    let method = request.method().clone();

    if method == Method::Post && url == "/api/scanner/bridge/resolve-code" {
        let mut s = state.lock().unwrap();
        s.resolves += 1;
        if s.reject_resolve {
            let _ = request.respond(
                Response::from_string("pairing code expired").with_status_code(403),
            );
            return;
        }
        let echo = s.resolve_echo_url.clone().unwrap_or_else(|| self_url.to_string());
        drop(s);
        let body = format!(
            r#"{{"server_url":"{}","token":"tok-1","bridge_name":"Test Bridge"}}"#,
            echo
        );
        let _ = request.respond(json_response(body));
        return;
    }

    if method == Method::Post && url == "/api/scanner/bridge/register" {
        state.lock().unwrap().registers += 1;
        let body = r#"{"bridge_id":"bridge-1","api_key":"key-1","tenant_name":"Test Tenant"}"#;
        let _ = request.respond(json_response(body.to_string()));
        return;
    }

    if method == Method::Get && url == "/api/scanner/bridge/status" {
        let _ = request.respond(json_response("{}".to_string()));
        return;
    }

    if method == Method::Post && url == "/api/scanner/bridge/folder-upload" {
        let mut s = state.lock().unwrap();
        s.upload_attempts += 1;
        if s.fail_all_uploads {
            let _ = request.respond(
                Response::from_string("maintenance window").with_status_code(503),
            );
            return;
        }
        s.uploads += 1;
        let job_id = s.uploads;
        drop(s);
        let body = format!(
            r#"{{"success":true,"job_id":{},"filename":"upload","duplicate":false,"message":"stored"}}"#,
            job_id
        );
        let _ = request.respond(json_response(body));
        return;
    }

    if method == Method::Post && url == "/api/scanner/bridge/folder-sync-status" {
        let _ = request.respond(json_response("{}".to_string()));
        return;
    }

    if method == Method::Get && url == "/api/scanner/bridge/pending-scans" {
        let _ = request.respond(json_response(r#"{"jobs":[]}"#.to_string()));
        return;
    }

    if method == Method::Post && url == "/api/scanner/bridge/scanners" {
        let _ = request.respond(json_response("{}".to_string()));
        return;
    }

    let _ = request.respond(Response::from_string("not found").with_status_code(404));
}

/// Structured pairing payload pointing at the given backend.
pub fn structured_code(server_url: &str) -> String {
    format!(
        r#"{{"v":1,"server_url":"{}","token":"tok-qr","bridge_name":"QR Bridge"}}"#,
        server_url
    )
}
