//! Vote engine.

use tracing::info;
use webpolls_common::{AppError, AppResult};
use webpolls_db::{entities::poll_vote, repositories::PollVoteRepository};

/// Vote service: records one choice per user per poll.
#[derive(Clone)]
pub struct VoteService {
    vote_repo: PollVoteRepository,
}

impl VoteService {
    /// Create a new vote service.
    #[must_use]
    pub const fn new(vote_repo: PollVoteRepository) -> Self {
        Self { vote_repo }
    }

    /// Record `voter`'s choice of `option_id` in `poll_id`.
    ///
    /// A repeated vote replaces the previous choice. Anonymous voters are
    /// rejected with [`AppError::Unauthorized`].
    pub async fn cast_vote(
        &self,
        poll_id: i32,
        option_id: i32,
        voter: Option<i32>,
    ) -> AppResult<poll_vote::Model> {
        let user_id = voter.ok_or(AppError::Unauthorized)?;

        if poll_id <= 0 || option_id <= 0 {
            return Err(AppError::Validation(
                "Both a poll and an option must be given".to_string(),
            ));
        }

        let vote = self.vote_repo.cast(poll_id, option_id, user_id).await?;

        info!(poll_id, option_id, user_id, "Vote recorded");

        Ok(vote)
    }

    /// The option `user_id` currently votes for in `poll_id`.
    pub async fn current_choice(&self, user_id: i32, poll_id: i32) -> AppResult<Option<i32>> {
        self.vote_repo.find_user_choice(user_id, poll_id).await
    }
}
