//! Shared fixtures: a local stand-in for the remote job queue and an agent wired to
//! the simulated printer.
#![allow(dead_code)]

use autodrop_agent::actions::ShellAction;
use autodrop_agent::config::{AgentConfig, WebUser};
use autodrop_agent::file_manager::DiskStaging;
use autodrop_agent::settings::MemorySettings;
use autodrop_agent::snapshot::HttpSnapshot;
use autodrop_agent::{Agent, AgentDeps, AgentHandle, AgentSnapshot};
use autodrop_shared::{Notification, NotificationStatus};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use printer_sim::SimulatedPrinter;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};

pub const JOB_BODY: &str = ";START\n\n;job42\nG1 X0\n";
pub const JOB_PATH: &str = "Autodrop3D/job42.gcode";

/// A request the fake queue received.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Poll(HashMap<String, String>),
    Done(HashMap<String, String>),
    Status(serde_json::Value),
}

struct QueueState {
    jobs: VecDeque<(u16, String)>,
    status_reply: (u16, String),
    done_reply: (u16, String),
    requests: Vec<Recorded>,
}

#[derive(Clone)]
pub struct FakeQueue {
    pub url: String,
    state: Arc<Mutex<QueueState>>,
}

impl FakeQueue {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(QueueState {
            jobs: VecDeque::new(),
            status_reply: (200, "RECORDED".to_string()),
            done_reply: (200, "OK".to_string()),
            requests: Vec::new(),
        }));
        let app = Router::new()
            .route("/queue", get(queue_get).post(queue_post))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/queue", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { url, state }
    }

    /// Answer the next poll with `status` and `body`. Polls beyond the queued answers get 404.
    pub fn push_job_reply(&self, status: u16, body: &str) {
        self.state.lock().unwrap().jobs.push_back((status, body.to_string()));
    }

    pub fn set_status_reply(&self, status: u16, body: &str) {
        self.state.lock().unwrap().status_reply = (status, body.to_string());
    }

    pub fn set_done_reply(&self, status: u16, body: &str) {
        self.state.lock().unwrap().done_reply = (status, body.to_string());
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn polls(&self) -> usize {
        self.requests().iter().filter(|r| matches!(r, Recorded::Poll(_))).count()
    }

    pub fn done_requests(&self) -> Vec<HashMap<String, String>> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Done(query) => Some(query),
                _ => None,
            })
            .collect()
    }

    pub fn status_reports(&self) -> Vec<serde_json::Value> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Status(body) => Some(body),
                _ => None,
            })
            .collect()
    }
}

fn reply((status, body): (u16, String)) -> (StatusCode, String) {
    (StatusCode::from_u16(status).unwrap(), body)
}

async fn queue_get(
    State(state): State<Arc<Mutex<QueueState>>>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let mut state = state.lock().unwrap();
    if query.get("stat").map(String::as_str) == Some("Done") {
        state.requests.push(Recorded::Done(query));
        return reply(state.done_reply.clone());
    }
    state.requests.push(Recorded::Poll(query));
    match state.jobs.pop_front() {
        Some(answer) => reply(answer),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

async fn queue_post(
    State(state): State<Arc<Mutex<QueueState>>>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, String) {
    let mut state = state.lock().unwrap();
    state.requests.push(Recorded::Status(body));
    reply(state.status_reply.clone())
}

pub struct Harness {
    pub agent: AgentHandle,
    pub printer: Arc<SimulatedPrinter>,
    pub settings: Arc<MemorySettings>,
    pub queue: FakeQueue,
    pub dir: TempDir,
}

impl Harness {
    pub fn uploads(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn data_folder(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub async fn snapshot(&self) -> AgentSnapshot {
        self.agent.snapshot().await.unwrap()
    }

    /// Poll the agent state until `pred` holds.
    pub async fn wait_until<F>(&self, mut pred: F) -> AgentSnapshot
    where
        F: FnMut(&AgentSnapshot) -> bool,
    {
        for _ in 0..100 {
            let snapshot = self.snapshot().await;
            if pred(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition never held, last state: {:?}", self.snapshot().await);
    }

    /// Stage job42 with a manual tick and start it on the connected printer.
    pub async fn start_job42(&self) -> AgentSnapshot {
        self.queue.push_job_reply(200, JOB_BODY);
        self.agent.job_queue_poller().tick().await.unwrap();
        self.wait_until(|s| !s.bed_clear && s.current_job.is_some()).await
    }
}

/// Test configuration pointing at the fake queue. Pollers tick once when started
/// and then only after an hour, so tests control every later tick.
pub fn test_config(queue: &FakeQueue, dir: &TempDir) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.autodrop.name = "printer-1".to_string();
    config.autodrop.key = "secret".to_string();
    config.autodrop.server = queue.url.clone();
    config.autodrop.polling_interval = 3600.0;
    config.online_check.host = "127.0.0.1".to_string();
    config.online_check.port = 9;
    config.storage.uploads = dir.path().join("uploads");
    config.storage.data_folder = dir.path().join("data");
    config.http.timeout = 5;
    config.web.users = vec![
        WebUser { username: "admin".into(), password: "password".into(), admin: true },
        WebUser { username: "viewer".into(), password: "viewer".into(), admin: false },
    ];
    config
}

pub async fn harness(configure: impl FnOnce(&mut AgentConfig)) -> Harness {
    let queue = FakeQueue::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&queue, &dir);
    configure(&mut config);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer = Arc::new(
        SimulatedPrinter::new()
            .with_files_root(&config.storage.uploads)
            .with_events(events_tx),
    );
    let settings = Arc::new(MemorySettings::new(config.clone()));
    let agent = Agent::spawn(AgentDeps {
        device: printer.clone(),
        staging: Arc::new(DiskStaging::new(&config.storage.uploads)),
        camera: Arc::new(HttpSnapshot),
        settings: settings.clone(),
        actions: Arc::new(ShellAction::new(Duration::from_secs(5))),
    })
    .unwrap();
    printer.set_hooks(agent.interceptor());
    agent.forward_events(events_rx);
    Harness { agent, printer, settings, queue, dir }
}

/// Next notification with `status`, skipping others.
pub async fn expect_notification(
    rx: &mut broadcast::Receiver<Notification>,
    status: NotificationStatus,
) -> Notification {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let notification = rx.recv().await.unwrap();
            if notification.status == status {
                return notification;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {:?} notification", status))
}
