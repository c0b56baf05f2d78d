//! In-process mock of the bibliographic API, served by axum on a random port.
//!
//! Replies are queued per decoded path; the last queued reply repeats.
//! Unknown paths answer 404.

use crate::client::RateLimitedClient;
use crate::config::ClientConfig;
use crate::openalex;
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum MockReply {
    Json(Value),
    Status(u16),
    /// 429 with the given `Retry-After` value
    RateLimited(String),
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<String, VecDeque<MockReply>>>,
    hits: Mutex<HashMap<String, usize>>,
    /// Added before every reply
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

pub struct MockApi {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockApi {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn reply(&self, path: &str, reply: MockReply) {
        self.state
            .routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Register a work under the path the crawler will request for `id`.
    pub fn work(&self, id: &str, year: i32, references: &[&str], authors: &[(&str, &str)]) {
        self.reply(&work_path(id), MockReply::Json(work_json(year, references, authors)));
    }

    /// Register a `counts_by_year` series for an author.
    pub fn author_counts(&self, author_id: &str, counts: &[(i32, u64)]) {
        let series: Vec<Value> = counts
            .iter()
            .map(|(year, cited)| json!({"year": year, "cited_by_count": cited}))
            .collect();
        self.reply(
            &format!("/authors/{}", author_id),
            MockReply::Json(json!({ "counts_by_year": series })),
        );
    }

    /// Hold every request for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = delay;
    }

    /// Most requests ever being answered at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.state.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    /// Settings pointing at this mock with no spacing, jitter or long backoff.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.base_url.clone(),
            min_interval: Duration::ZERO,
            backoff_base: Duration::from_millis(10),
            max_jitter: Duration::ZERO,
            timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    pub fn client(&self) -> RateLimitedClient {
        RateLimitedClient::new(self.client_config()).unwrap()
    }
}

/// Decoded request path for a work id.
pub fn work_path(id: &str) -> String {
    if openalex::is_doi(id) {
        format!("/works/doi:{}", id)
    } else {
        format!("/works/{}", id)
    }
}

/// Work metadata in the API's shape. `authors` holds `(author id, institution id)`;
/// an empty institution id means none.
pub fn work_json(year: i32, references: &[&str], authors: &[(&str, &str)]) -> Value {
    let authorships: Vec<Value> = authors
        .iter()
        .map(|(author, institution)| {
            let institutions: Vec<Value> = if institution.is_empty() {
                Vec::new()
            } else {
                vec![json!({ "id": format!("https://openalex.org/{}", institution) })]
            };
            json!({
                "author": {
                    "id": format!("https://openalex.org/{}", author),
                    "display_name": format!("Author {}", author),
                },
                "institutions": institutions,
            })
        })
        .collect();

    json!({
        "publication_year": year,
        "referenced_works": references,
        "authorships": authorships,
    })
}

async fn handle(State(state): State<Arc<MockState>>, uri: Uri) -> Response {
    let path = urlencoding::decode(uri.path())
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| uri.path().to_string());

    *state.hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.peak_in_flight.fetch_max(current, Ordering::SeqCst);
    let delay = *state.delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    let reply = {
        let mut routes = state.routes.lock().unwrap();
        match routes.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    };

    match reply {
        Some(MockReply::Json(body)) => Json(body).into_response(),
        Some(MockReply::Status(code)) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        Some(MockReply::RateLimited(after)) => {
            (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, after)]).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
