//! Approval gateways: where the engine asks a human before a step advances

use crate::error::ApprovalError;
use crate::models::workflow::ApprovalRequest;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

/// Asks a human to choose one of the offered options
///
/// There is no built-in timeout: a request may wait indefinitely. Callers
/// wanting bounded latency wrap their gateway.
#[async_trait]
pub trait ApprovalGateway: Send + Sync {
    async fn request(&self, request: &ApprovalRequest) -> Result<String, ApprovalError>;
}

/// Request waiting for an answer in a [`ChannelApprovalGateway`]
#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub id: Uuid,
    pub request: ApprovalRequest,
    pub requested_at: chrono::DateTime<chrono::Utc>,
}

struct PendingEntry {
    info: PendingApproval,
    tx: oneshot::Sender<String>,
}

/// Gateway answered from elsewhere in the process (a UI task, a test)
///
/// Each request parks a oneshot sender keyed by a fresh id. If the waiting
/// engine gives up (cancellation), the entry stays until answered or
/// discarded.
pub struct ChannelApprovalGateway {
    pending: Arc<DashMap<Uuid, PendingEntry>>,
    announcements: broadcast::Sender<PendingApproval>,
}

impl ChannelApprovalGateway {
    pub fn new() -> Self {
        let (announcements, _) = broadcast::channel(64);
        Self {
            pending: Arc::new(DashMap::new()),
            announcements,
        }
    }

    /// Receive every new pending request as it is created
    pub fn subscribe(&self) -> broadcast::Receiver<PendingApproval> {
        self.announcements.subscribe()
    }

    /// Answer a pending request; the answer must be one of its options
    pub fn respond(&self, approval_id: Uuid, answer: &str) -> Result<(), ApprovalError> {
        {
            let entry = self.pending.get(&approval_id).ok_or(ApprovalError::Closed)?;
            if !entry.info.request.options.iter().any(|o| o == answer) {
                return Err(ApprovalError::InvalidOption {
                    answer: answer.to_string(),
                    options: entry.info.request.options.clone(),
                });
            }
        }

        let (_key, entry) = self
            .pending
            .remove(&approval_id)
            .ok_or(ApprovalError::Closed)?;

        if entry.tx.send(answer.to_string()).is_err() {
            tracing::warn!(
                "Approval {} answered after the workflow stopped waiting",
                approval_id
            );
        } else {
            tracing::info!("Approval {} answered with '{}'", approval_id, answer);
        }
        Ok(())
    }

    /// Drop a pending request without answering it
    pub fn discard(&self, approval_id: Uuid) -> bool {
        self.pending.remove(&approval_id).is_some()
    }

    /// Snapshot of every unanswered request, oldest first
    pub fn pending(&self) -> Vec<PendingApproval> {
        let mut pending: Vec<_> = self
            .pending
            .iter()
            .map(|entry| entry.info.clone())
            .collect();
        pending.sort_by_key(|p| p.requested_at);
        pending
    }
}

impl Default for ChannelApprovalGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalGateway for ChannelApprovalGateway {
    async fn request(&self, request: &ApprovalRequest) -> Result<String, ApprovalError> {
        let (tx, rx) = oneshot::channel();
        let info = PendingApproval {
            id: Uuid::new_v4(),
            request: request.clone(),
            requested_at: chrono::Utc::now(),
        };
        let approval_id = info.id;

        self.pending.insert(
            approval_id,
            PendingEntry {
                info: info.clone(),
                tx,
            },
        );
        let _ = self.announcements.send(info);

        tracing::info!(
            "Approval request {} created for step '{}'",
            approval_id,
            request.step_name
        );

        rx.await.map_err(|_| ApprovalError::Closed)
    }
}

/// Gateway that always answers with the request's approve option
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApproveGateway;

#[async_trait]
impl ApprovalGateway for AutoApproveGateway {
    async fn request(&self, request: &ApprovalRequest) -> Result<String, ApprovalError> {
        tracing::info!("Auto-approving step '{}'", request.step_name);
        Ok(request.approve_option.clone())
    }
}
