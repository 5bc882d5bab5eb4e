//! Poll service.
//!
//! Entry point for every poll operation: validates input, enforces
//! ownership, delegates to the vote and aggregation engines, and publishes
//! changes to live viewers once they are committed.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use webpolls_common::{AppError, AppResult};
use webpolls_db::{
    entities::poll_option,
    repositories::{PollOptionRepository, PollRepository, PollVoteRepository},
};

use super::{
    aggregation::{AggregationService, PollResult, ResultSnapshot},
    broadcast::{BroadcastHub, PollEvent, Subscription},
    vote::VoteService,
};

/// Fewest options a poll may have.
pub const MIN_OPTIONS: usize = 2;
/// Most options a poll may have.
pub const MAX_OPTIONS: usize = 4;
/// Longest allowed question, in characters.
pub const MAX_QUESTION_LEN: usize = 256;
/// Longest allowed option text, in characters.
pub const MAX_OPTION_LEN: usize = 100;

/// Number of locks that order result broadcasts. Polls share a lock when
/// their ids are equal modulo this value.
const PUBLISH_STRIPES: usize = 64;

/// Input for creating a poll.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePollInput {
    pub question: String,
    pub options: Vec<String>,
}

impl CreatePollInput {
    /// Check the input and return the trimmed question and options.
    fn normalize(self) -> AppResult<(String, Vec<String>)> {
        let question = self.question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("Question cannot be empty".to_string()));
        }
        if question.chars().count() > MAX_QUESTION_LEN {
            return Err(AppError::Validation(format!(
                "Question is too long (max {MAX_QUESTION_LEN} chars)"
            )));
        }

        if self.options.len() < MIN_OPTIONS {
            return Err(AppError::Validation(format!(
                "Poll must have at least {MIN_OPTIONS} options"
            )));
        }
        if self.options.len() > MAX_OPTIONS {
            return Err(AppError::Validation(format!(
                "Poll cannot have more than {MAX_OPTIONS} options"
            )));
        }

        let options = self
            .options
            .iter()
            .map(|o| normalize_option(o))
            .collect::<AppResult<Vec<_>>>()?;

        Ok((question.to_string(), options))
    }
}

fn normalize_option(content: &str) -> AppResult<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("Poll options cannot be empty".to_string()));
    }
    if content.chars().count() > MAX_OPTION_LEN {
        return Err(AppError::Validation(format!(
            "Poll option is too long (max {MAX_OPTION_LEN} chars)"
        )));
    }
    Ok(content.to_string())
}

/// Poll service for business logic.
#[derive(Clone)]
pub struct PollService {
    poll_repo: PollRepository,
    option_repo: PollOptionRepository,
    votes: VoteService,
    aggregation: AggregationService,
    hub: BroadcastHub,
    /// Held from reading a poll's results until they are published, so
    /// events for one poll leave in the order their reads began.
    publish_locks: Arc<[Mutex<()>]>,
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub fn new(
        poll_repo: PollRepository,
        option_repo: PollOptionRepository,
        vote_repo: PollVoteRepository,
        hub: BroadcastHub,
    ) -> Self {
        Self {
            aggregation: AggregationService::new(
                poll_repo.clone(),
                option_repo.clone(),
                vote_repo.clone(),
            ),
            votes: VoteService::new(vote_repo),
            poll_repo,
            option_repo,
            hub,
            publish_locks: (0..PUBLISH_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Create a poll owned by `owner_id`.
    pub async fn create_poll(&self, owner_id: i32, input: CreatePollInput) -> AppResult<PollResult> {
        let (question, options) = input.normalize()?;

        let (poll, _) = self
            .poll_repo
            .create_with_options(owner_id, &question, &options)
            .await?;

        info!(poll_id = poll.id, owner_id, options = options.len(), "Poll created");

        self.aggregation.poll_result(poll.id, Some(owner_id)).await
    }

    /// Delete a poll. Only its owner may do so.
    pub async fn delete_poll(&self, poll_id: i32, requester: i32) -> AppResult<()> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        ensure_owner(poll.user_id, requester)?;

        self.poll_repo.delete(poll_id).await?;

        info!(poll_id, "Poll deleted");
        self.hub.publish(PollEvent::Deleted { poll_id });

        Ok(())
    }

    /// Results of one poll, personalized for `viewer`.
    pub async fn get_poll(&self, poll_id: i32, viewer: Option<i32>) -> AppResult<PollResult> {
        self.aggregation.poll_result(poll_id, viewer).await
    }

    /// Every poll, newest first.
    pub async fn list_polls(&self, viewer: Option<i32>) -> AppResult<Vec<PollResult>> {
        self.aggregation.polls_for_viewer(viewer).await
    }

    /// Polls owned by `owner_id`, newest first.
    pub async fn list_polls_by_owner(
        &self,
        owner_id: i32,
        viewer: Option<i32>,
    ) -> AppResult<Vec<PollResult>> {
        self.aggregation.polls_by_owner(owner_id, viewer).await
    }

    /// Record a vote and return the voter's view of the updated poll.
    ///
    /// Live viewers are notified after the vote has been committed. The
    /// results are read and published under the poll's publish lock, so
    /// when votes race, the last event sent still counts all of them.
    pub async fn vote(
        &self,
        poll_id: i32,
        option_id: i32,
        voter: Option<i32>,
    ) -> AppResult<PollResult> {
        let vote = self.votes.cast_vote(poll_id, option_id, voter).await?;

        let _ordered = self.publish_lock(poll_id).lock().await;
        let result = self
            .aggregation
            .poll_result(poll_id, Some(vote.user_id))
            .await
            .inspect_err(|e| {
                warn!(poll_id, error = %e, "Vote recorded but results could not be read");
            })?;

        self.publish_snapshot(&ResultSnapshot::from(&result));

        Ok(result)
    }

    /// Change the text of an option of `poll_id`. Only the poll's owner may
    /// do so.
    pub async fn update_option(
        &self,
        option_id: i32,
        poll_id: i32,
        content: &str,
        requester: i32,
    ) -> AppResult<poll_option::Model> {
        let content = normalize_option(content)?;

        let poll = self.poll_repo.get_by_id(poll_id).await?;
        ensure_owner(poll.user_id, requester)?;

        let updated = self
            .option_repo
            .update_content(poll_id, option_id, &content)
            .await?;

        info!(poll_id, option_id, "Poll option updated");
        self.broadcast_results(poll_id).await;

        Ok(updated)
    }

    /// Remove an option and its votes. Only the poll's owner may do so, and
    /// only while the poll keeps at least [`MIN_OPTIONS`] options.
    pub async fn delete_option(&self, option_id: i32, poll_id: i32, requester: i32) -> AppResult<()> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        ensure_owner(poll.user_id, requester)?;

        self.option_repo
            .delete_keeping_minimum(poll_id, option_id, MIN_OPTIONS as u64)
            .await?;

        info!(poll_id, option_id, "Poll option deleted");
        self.broadcast_results(poll_id).await;

        Ok(())
    }

    /// Announce that polls disappeared outside this service (account deletion).
    pub fn announce_deleted(&self, poll_ids: &[i32]) {
        for &poll_id in poll_ids {
            self.hub.publish(PollEvent::Deleted { poll_id });
        }
    }

    /// Open a live stream of poll events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    /// The hub this service publishes to.
    #[must_use]
    pub const fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    fn publish_lock(&self, poll_id: i32) -> &Mutex<()> {
        &self.publish_locks[poll_id.unsigned_abs() as usize % self.publish_locks.len()]
    }

    /// Publish fresh results for `poll_id`. Failures are logged only.
    async fn broadcast_results(&self, poll_id: i32) {
        let _ordered = self.publish_lock(poll_id).lock().await;
        match self.aggregation.snapshot(poll_id).await {
            Ok(snapshot) => self.publish_snapshot(&snapshot),
            Err(e) => warn!(poll_id, error = %e, "Failed to compute results for broadcast"),
        }
    }

    fn publish_snapshot(&self, snapshot: &ResultSnapshot) {
        match PollEvent::updated(snapshot) {
            Ok(event) => self.hub.publish(event),
            Err(e) => warn!(poll_id = snapshot.poll_id, error = %e, "Failed to serialize results"),
        }
    }
}

fn ensure_owner(owner_id: i32, requester: i32) -> AppResult<()> {
    if owner_id == requester {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the poll's owner can change it".to_string(),
        ))
    }
}
