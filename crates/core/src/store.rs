//! Process-wide in-memory state: per-requester drafts and pending requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::domain::{LeaveRequest, RequestId, UserId};
use crate::flows::states::ConversationDraft;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("request id `{0}` is already pending")]
    DuplicateId(RequestId),
}

#[derive(Default)]
pub struct DraftStore {
    drafts: RwLock<HashMap<UserId, ConversationDraft>>,
}

impl DraftStore {
    /// Starts a fresh draft, replacing any draft already in progress.
    pub async fn begin(&self, requester: UserId) -> bool {
        let mut drafts = self.drafts.write().await;
        drafts.insert(requester, ConversationDraft::default()).is_some()
    }

    pub async fn get(&self, requester: UserId) -> Option<ConversationDraft> {
        self.drafts.read().await.get(&requester).cloned()
    }

    /// Replaces an existing draft. A draft discarded in the meantime stays discarded.
    pub async fn update(&self, requester: UserId, draft: ConversationDraft) -> bool {
        let mut drafts = self.drafts.write().await;
        match drafts.get_mut(&requester) {
            Some(slot) => {
                *slot = draft;
                true
            }
            None => false,
        }
    }

    pub async fn discard(&self, requester: UserId) -> Option<ConversationDraft> {
        self.drafts.write().await.remove(&requester)
    }

    pub async fn len(&self) -> usize {
        self.drafts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.drafts.read().await.is_empty()
    }
}

#[derive(Debug)]
struct SlotState {
    request: LeaveRequest,
    settled: bool,
}

type Slot = Arc<Mutex<SlotState>>;

/// Pending requests keyed by id. Each entry has its own lock so actions on
/// different ids never wait on each other.
#[derive(Default)]
pub struct PendingRequests {
    entries: RwLock<HashMap<RequestId, Slot>>,
}

impl PendingRequests {
    pub async fn insert(&self, request: LeaveRequest) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&request.id) {
            return Err(StoreError::DuplicateId(request.id));
        }
        let id = request.id.clone();
        entries.insert(id, Arc::new(Mutex::new(SlotState { request, settled: false })));
        Ok(())
    }

    pub async fn get(&self, id: &RequestId) -> Option<LeaveRequest> {
        let slot = self.slot(id).await?;
        let state = slot.lock().await;
        (!state.settled).then(|| state.request.clone())
    }

    /// Idempotent: removing an absent id returns `None`.
    pub async fn remove(&self, id: &RequestId) -> Option<LeaveRequest> {
        let slot = self.entries.write().await.remove(id)?;
        let mut state = slot.lock().await;
        if state.settled {
            return None;
        }
        state.settled = true;
        Some(state.request.clone())
    }

    /// Exclusive access to one pending request for the duration of an action.
    ///
    /// Returns `None` when the id is unknown or was settled while waiting for
    /// the entry lock.
    pub async fn checkout(&self, id: &RequestId) -> Option<PendingEntry<'_>> {
        let slot = self.slot(id).await?;
        let guard = slot.lock_owned().await;
        if guard.settled {
            return None;
        }
        Some(PendingEntry { id: id.clone(), guard, store: self })
    }

    pub async fn contains(&self, id: &RequestId) -> bool {
        self.entries.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn slot(&self, id: &RequestId) -> Option<Slot> {
        self.entries.read().await.get(id).cloned()
    }
}

pub struct PendingEntry<'a> {
    id: RequestId,
    guard: OwnedMutexGuard<SlotState>,
    store: &'a PendingRequests,
}

impl PendingEntry<'_> {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn request(&self) -> &LeaveRequest {
        &self.guard.request
    }

    pub fn request_mut(&mut self) -> &mut LeaveRequest {
        &mut self.guard.request
    }

    /// Marks the request settled and drops it from the store while still
    /// holding its lock, so a waiting action observes it as gone.
    pub async fn finish(mut self) -> LeaveRequest {
        self.guard.settled = true;
        self.store.entries.write().await.remove(&self.id);
        self.guard.request.clone()
    }
}

/// `REQ_{YYYYmmddHHMMSS}_{requester}_{seq}`; the sequence keeps ids unique
/// for submissions that share a second and a requester.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    sequence: AtomicU64,
}

impl RequestIdGenerator {
    pub fn next(&self, requester: UserId, now: DateTime<Utc>) -> RequestId {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        RequestId(format!("REQ_{}_{}_{sequence}", now.format("%Y%m%d%H%M%S"), requester.0))
    }
}
