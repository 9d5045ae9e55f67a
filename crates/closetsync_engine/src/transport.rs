//! Remote profile service abstraction.

use crate::config::{CallOptions, SyncConfig};
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, HttpRequest, Method, NetworkClient};
use async_trait::async_trait;
use closetsync_protocol::{Mutation, Operation, OperationKind, UserProfile};
use parking_lot::Mutex;
use reqwest::Url;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// The server side of synchronization.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, mock for testing, etc.).
#[async_trait]
pub trait RemoteProfileService: Send + Sync {
    /// Fetches the server's snapshot of a user's profile.
    async fn fetch_profile(&self, user_id: &str) -> SyncResult<UserProfile>;

    /// Delivers one queued operation.
    async fn dispatch(&self, operation: &Operation) -> SyncResult<()>;
}

/// REST implementation of [`RemoteProfileService`].
pub struct HttpProfileService<C, N> {
    base_url: Url,
    network: NetworkClient<C, N>,
    dispatch_options: CallOptions,
    fetch_options: CallOptions,
}

impl<C: HttpClient, N: Connectivity> HttpProfileService<C, N> {
    /// Creates a service for `config.base_url`.
    pub fn new(config: &SyncConfig, network: NetworkClient<C, N>) -> SyncResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            SyncError::InvalidConfig(format!("invalid base url {:?}: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidConfig(format!(
                "base url {:?} cannot carry a path",
                config.base_url
            )));
        }

        Ok(Self {
            base_url,
            network,
            dispatch_options: config.dispatch.clone(),
            fetch_options: config.fetch.clone(),
        })
    }

    /// Returns the network client.
    pub fn network(&self) -> &NetworkClient<C, N> {
        &self.network
    }

    /// Builds the request that delivers an operation.
    pub fn request_for(&self, operation: &Operation) -> SyncResult<HttpRequest> {
        let user = operation.user_id();
        let request = match operation.mutation()? {
            Mutation::AddClosetItem(item) => {
                HttpRequest::new(Method::Post, self.endpoint(&["users", user, "closet"]))
                    .with_body(serde_json::to_value(&item)?)
            }
            Mutation::RemoveClosetItem { item_id } => HttpRequest::new(
                Method::Delete,
                self.endpoint(&["users", user, "closet", &item_id]),
            ),
            Mutation::UpdateClosetItem { item_id, changes } => HttpRequest::new(
                Method::Patch,
                self.endpoint(&["users", user, "closet", &item_id]),
            )
            .with_body(serde_json::to_value(&changes)?),
            Mutation::ToggleFavorite { item_id, favorite } => {
                HttpRequest::new(Method::Post, self.endpoint(&["users", user, "favorite"]))
                    .with_body(json!({ "itemId": item_id, "favorite": favorite }))
            }
            Mutation::UpdatePreferences(preferences) => {
                HttpRequest::new(Method::Patch, self.endpoint(&["users", user, "preferences"]))
                    .with_body(Value::Object(preferences))
            }
            Mutation::SubmitQuiz(answers) => {
                HttpRequest::new(Method::Post, self.endpoint(&["users", user, "quiz"]))
                    .with_body(answers)
            }
            Mutation::AddLikedItem { item_id } => self
                .feedback_item(Method::Post, user, &item_id)
                .with_body(json!({ "liked": true })),
            Mutation::AddDislikedItem { item_id } => self
                .feedback_item(Method::Post, user, &item_id)
                .with_body(json!({ "liked": false })),
            Mutation::RemoveLikedItem { item_id } => self
                .feedback_item(Method::Delete, user, &item_id)
                .with_body(json!({ "list": "liked" })),
            Mutation::RemoveDislikedItem { item_id } => self
                .feedback_item(Method::Delete, user, &item_id)
                .with_body(json!({ "list": "disliked" })),
            Mutation::SaveOutfit(items) => {
                HttpRequest::new(Method::Post, self.endpoint(&["users", user, "outfits"]))
                    .with_body(json!({ "items": items }))
            }
            Mutation::RemoveOutfit(items) => {
                HttpRequest::new(Method::Delete, self.endpoint(&["users", user, "outfits"]))
                    .with_body(json!({ "items": items }))
            }
        };
        Ok(request)
    }

    fn feedback_item(&self, method: Method, user: &str, item_id: &str) -> HttpRequest {
        HttpRequest::new(
            method,
            self.endpoint(&["users", user, "feedback", "items", item_id]),
        )
    }

    /// Joins percent-encoded path segments onto the base URL.
    fn endpoint(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.into()
    }
}

#[async_trait]
impl<C: HttpClient, N: Connectivity> RemoteProfileService for HttpProfileService<C, N> {
    async fn fetch_profile(&self, user_id: &str) -> SyncResult<UserProfile> {
        let request = HttpRequest::get(self.endpoint(&["users", user_id]));
        self.network.call_json(&request, &self.fetch_options).await
    }

    async fn dispatch(&self, operation: &Operation) -> SyncResult<()> {
        let request = self.request_for(operation)?;
        debug!(
            operation_id = %operation.id(),
            method = %request.method,
            url = %request.url,
            "dispatching operation"
        );
        self.network
            .call(&request, &self.dispatch_options)
            .await
            .map(|_| ())
    }
}

/// A scripted in-memory server for testing.
///
/// Successful dispatches are applied to the stored profile of the
/// operation's user, so a later fetch reflects them.
#[derive(Debug, Default)]
pub struct MockProfileService {
    profiles: Mutex<HashMap<String, UserProfile>>,
    delivered: Mutex<Vec<Operation>>,
    failing_kinds: Mutex<HashSet<OperationKind>>,
    fail_next: AtomicUsize,
    fail_fetch: AtomicBool,
    unreachable: AtomicBool,
    attempts: AtomicUsize,
    fetches: AtomicUsize,
    dispatch_delay: Mutex<Option<Duration>>,
}

impl MockProfileService {
    /// Creates an empty mock server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the server snapshot for a user.
    pub fn set_profile(&self, profile: UserProfile) {
        self.profiles
            .lock()
            .insert(profile.user_id.clone(), profile);
    }

    /// Returns the server snapshot for a user.
    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles.lock().get(user_id).cloned()
    }

    /// Rejects the next `count` dispatches with a 503.
    pub fn fail_next_dispatches(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Rejects every dispatch of `kind` with a 503.
    pub fn fail_kind(&self, kind: OperationKind) {
        self.failing_kinds.lock().insert(kind);
    }

    /// Clears every scripted failure.
    pub fn clear_failures(&self) {
        self.failing_kinds.lock().clear();
        self.fail_next.store(0, Ordering::SeqCst);
        self.fail_fetch.store(false, Ordering::SeqCst);
        self.unreachable.store(false, Ordering::SeqCst);
    }

    /// Makes snapshot fetches fail with a 503.
    pub fn set_fetch_failing(&self, failing: bool) {
        self.fail_fetch.store(failing, Ordering::SeqCst);
    }

    /// Simulates an offline device: every call fails with
    /// [`SyncError::OfflineNoFallback`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Makes every dispatch wait `delay` before answering.
    pub fn set_dispatch_delay(&self, delay: Option<Duration>) {
        *self.dispatch_delay.lock() = delay;
    }

    /// Returns successfully delivered operations in delivery order.
    pub fn delivered(&self) -> Vec<Operation> {
        self.delivered.lock().clone()
    }

    /// Returns the number of dispatch attempts, failed ones included.
    pub fn dispatch_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Returns the number of snapshot fetches.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn take_scripted_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn unavailable() -> SyncError {
    SyncError::RequestFailed {
        status: 503,
        message: "Service Unavailable".to_string(),
    }
}

#[async_trait]
impl RemoteProfileService for MockProfileService {
    async fn fetch_profile(&self, user_id: &str) -> SyncResult<UserProfile> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::OfflineNoFallback);
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.profile(user_id).ok_or_else(|| SyncError::RequestFailed {
            status: 404,
            message: "User not found".to_string(),
        })
    }

    async fn dispatch(&self, operation: &Operation) -> SyncResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.dispatch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::OfflineNoFallback);
        }
        if self.failing_kinds.lock().contains(&operation.kind()) || self.take_scripted_failure() {
            return Err(unavailable());
        }

        let mutation = operation.mutation()?;
        self.profiles
            .lock()
            .entry(operation.user_id().to_string())
            .or_insert_with(|| UserProfile::new(operation.user_id(), operation.timestamp()))
            .apply(&mutation, operation.timestamp());
        self.delivered.lock().push(operation.clone());
        Ok(())
    }
}
