use actix_web::{
    App,
    HttpRequest,
    HttpResponse,
    HttpServer,
    dev::ServerHandle,
    http::{
        StatusCode,
        header,
    },
    web,
};
use anyhow::Context;
use serde_json::Value;
use std::{
    collections::HashMap,
    net::TcpListener,
    sync::{
        Arc,
        Mutex,
    },
    thread::JoinHandle,
};

const DOCUMENT_PATH: &str = "/machine/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    /// Path below the document, e.g. `secret/get/info`.
    pub path: String,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone)]
enum Answer {
    Json(Value),
    Status(u16),
}

#[derive(Debug, Default)]
struct MachineState {
    answers: HashMap<(String, String), Answer>,
    requests: Vec<RecordedRequest>,
}

/// In-process HTTP stand-in for a machine's configuration endpoint.
///
/// Routes that were never configured answer `null`, like the real endpoint
/// does for anything it does not know.
pub struct FakeMachine {
    base_url: String,
    state: Arc<Mutex<MachineState>>,
    server_handle: ServerHandle,
    server_thread: Option<JoinHandle<()>>,
}

impl FakeMachine {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(Mutex::new(MachineState::default()));

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .context("failed to bind HTTP listener for fake machine")?;
        let address = listener
            .local_addr()
            .context("failed to read listener address")?;
        let base_url = format!("http://{}", address);

        tracing::info!("fake machine listening on {}", base_url);

        let server_state = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(server_state.clone()))
                .default_service(web::route().to(handle_request))
        })
        .workers(1)
        .listen(listener)
        .context("failed to start Actix server")?
        .run();

        let server_handle = server.handle();
        let server_thread = std::thread::spawn(move || {
            let sys = actix_web::rt::System::new();
            let _ = sys.block_on(server);
        });

        Ok(Self {
            base_url,
            state,
            server_handle,
            server_thread: Some(server_thread),
        })
    }

    pub fn document_url(&self) -> String {
        format!("{}{}", self.base_url, DOCUMENT_PATH)
    }

    /// Answers `method` requests for `path` with `body`.
    pub fn serve(&self, method: &str, path: &str, body: Value) -> &Self {
        self.answer(method, path, Answer::Json(body))
    }

    pub fn serve_status(&self, method: &str, path: &str, status: u16) -> &Self {
        self.answer(method, path, Answer::Status(status))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn requested_paths(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|request| request.path)
            .collect()
    }

    fn answer(&self, method: &str, path: &str, answer: Answer) -> &Self {
        self.lock()
            .answers
            .insert((method.to_uppercase(), path.to_string()), answer);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MachineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for FakeMachine {
    fn drop(&mut self) {
        let _ = self.server_handle.stop(true);
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}

async fn handle_request(
    request: HttpRequest,
    body: web::Bytes,
    state: web::Data<Arc<Mutex<MachineState>>>,
) -> HttpResponse {
    let method = request.method().as_str().to_string();
    let path = request
        .path()
        .strip_prefix(DOCUMENT_PATH)
        .unwrap_or(request.path())
        .to_string();
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    tracing::info!("fake machine received {method} {path}");

    let mut state = state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    state.requests.push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        content_type,
        body: String::from_utf8_lossy(&body).into_owned(),
    });
    match state.answers.get(&(method, path)) {
        Some(Answer::Json(value)) => HttpResponse::Ok()
            .content_type("application/json")
            .body(value.to_string()),
        Some(Answer::Status(status)) => {
            HttpResponse::build(StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
                .body("machine error")
        }
        None => HttpResponse::Ok()
            .content_type("application/json")
            .body("null"),
    }
}
