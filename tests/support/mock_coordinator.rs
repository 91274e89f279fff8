use std::{
    collections::{HashMap, VecDeque},
    convert::Infallible,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use bytes::Bytes;
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// In-memory coordinator: a task queue, an object store, and a log of reports.
#[derive(Clone)]
pub struct MockCoordinator {
    inner: Arc<Mutex<CoordinatorState>>,
    object_requests: Arc<AtomicU64>,
    miner: Arc<str>,
    sector_size: u64,
}

#[derive(Default)]
struct CoordinatorState {
    tasks: VecDeque<Value>,
    objects: HashMap<String, Bytes>,
    reports: Vec<(u64, Value)>,
    queue_stalls: usize,
    queue_stall_delay: Duration,
    queue_polls: usize,
}

impl MockCoordinator {
    pub fn new(miner: &str, sector_size: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CoordinatorState::default())),
            object_requests: Arc::new(AtomicU64::new(0)),
            miner: Arc::from(miner),
            sector_size,
        }
    }

    pub fn sector_name(&self, sector_id: u64) -> String {
        format!("s-{}-{}", self.miner, sector_id)
    }

    /// Queues a raw task payload exactly as it will travel on the wire.
    pub fn enqueue(&self, task: Value) {
        self.state().tasks.push_back(task);
    }

    pub fn put_object(&self, category: &str, name: &str, data: impl Into<Bytes>) {
        self.state()
            .objects
            .insert(object_key(category, name), data.into());
    }

    pub fn object(&self, category: &str, name: &str) -> Option<Bytes> {
        self.state().objects.get(&object_key(category, name)).cloned()
    }

    /// Holds the next `count` queue polls for `delay` before answering, the way
    /// an idle coordinator keeps a long-poll open.
    pub fn stall_queue_polls(&self, count: usize, delay: Duration) {
        let mut state = self.state();
        state.queue_stalls = count;
        state.queue_stall_delay = delay;
    }

    /// Number of `Filecoin.WorkerQueue` calls received, stalled ones included.
    pub fn queue_polls(&self) -> usize {
        self.state().queue_polls
    }

    pub fn reports(&self) -> Vec<(u64, Value)> {
        self.state().reports.clone()
    }

    /// Number of GET/PUT requests that reached the object store.
    pub fn object_requests(&self) -> u64 {
        self.object_requests.load(Ordering::SeqCst)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CoordinatorState> {
        self.inner.lock().expect("mock coordinator poisoned")
    }
}

pub fn task_payload(task_type: u64, task_id: u64, sector_id: u64) -> Value {
    json!({
        "Type": task_type,
        "TaskID": task_id,
        "SectorID": sector_id,
        "SealTicket": {
            "BlockHeight": 10,
            "TicketBytes": vec![1u8; 32],
        },
        "Pieces": [
            { "Size": 1016, "CommP": vec![2u8; 32] }
        ],
    })
}

fn object_key(category: &str, name: &str) -> String {
    format!("{category}/{name}")
}

pub struct MockCoordinatorServer {
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockCoordinatorServer {
    pub async fn start(coordinator: MockCoordinator) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock coordinator listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let coordinator = coordinator.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    serve_request(coordinator.clone(), req)
                }))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock coordinator stopped: {err}");
            }
        });

        Ok(Self {
            base_url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Object store endpoint.
    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    pub fn rpc_url(&self) -> String {
        format!("{}/rpc/v0", self.base_url)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(
    coordinator: MockCoordinator,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_string();
    if let Some(object) = path.strip_prefix("/remote/") {
        return Ok(serve_object(&coordinator, object.to_string(), req).await);
    }

    if req.method() != Method::POST {
        return Ok(plain(StatusCode::METHOD_NOT_ALLOWED, "Unsupported method"));
    }

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => return Ok(plain(StatusCode::BAD_REQUEST, format!("failed to read body: {err}"))),
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            return Ok(plain(
                StatusCode::BAD_REQUEST,
                format!("invalid JSON payload: {err}"),
            ))
        }
    };

    if payload.get("method").and_then(Value::as_str) == Some("Filecoin.WorkerQueue") {
        let stall = {
            let mut state = coordinator.state();
            if state.queue_stalls > 0 {
                state.queue_stalls -= 1;
                state.queue_polls += 1;
                Some(state.queue_stall_delay)
            } else {
                None
            }
        };
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
            let id = payload.get("id").cloned().unwrap_or(Value::Null);
            return Ok(json_response(error(id, 1, "no task became available")));
        }
    }

    let response_value = handle_call(&coordinator, payload);
    Ok(json_response(response_value))
}

fn json_response(value: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

async fn serve_object(
    coordinator: &MockCoordinator,
    object: String,
    req: Request<Body>,
) -> Response<Body> {
    coordinator.object_requests.fetch_add(1, Ordering::SeqCst);

    let method = req.method().clone();
    match method {
        Method::GET => {
            let stored = coordinator.state().objects.get(&object).cloned();
            match stored {
                Some(data) => Response::new(Body::from(data)),
                None => plain(StatusCode::NOT_FOUND, "no such object"),
            }
        }
        Method::PUT => match body::to_bytes(req.into_body()).await {
            Ok(data) => {
                coordinator.state().objects.insert(object, data);
                Response::new(Body::empty())
            }
            Err(err) => plain(StatusCode::BAD_REQUEST, format!("failed to read body: {err}")),
        },
        _ => plain(StatusCode::METHOD_NOT_ALLOWED, "Unsupported method"),
    }
}

fn handle_call(coordinator: &MockCoordinator, call: Value) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = call
        .get("params")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    match method.as_str() {
        "Filecoin.ActorAddress" => success(id, json!(coordinator.miner.as_ref())),
        "Filecoin.ActorSectorSize" => match params.first().and_then(Value::as_str) {
            Some(miner) if miner == coordinator.miner.as_ref() => {
                success(id, json!(coordinator.sector_size))
            }
            _ => error(id, 1, "unknown actor"),
        },
        "Filecoin.WorkerQueue" => {
            let next = {
                let mut state = coordinator.state();
                state.queue_polls += 1;
                state.tasks.pop_front()
            };
            success(id, next.unwrap_or(Value::Null))
        }
        "Filecoin.WorkerDone" => match (params.first().and_then(Value::as_u64), params.get(1)) {
            (Some(task_id), Some(result)) => {
                coordinator.state().reports.push((task_id, result.clone()));
                success(id, Value::Null)
            }
            _ => error(id, -32602, "invalid params"),
        },
        _ => error(id, -32601, format!("unknown method {method}")),
    }
}

fn plain(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;
    response
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}
