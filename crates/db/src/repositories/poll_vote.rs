//! Poll vote repository.

use std::sync::Arc;

use crate::entities::{Poll, PollOption, PollVote, poll_option, poll_vote};
use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::{Expr, OnConflict},
};
use webpolls_common::{AppError, AppResult};

/// Number of votes cast for one option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionVoteCount {
    pub poll_id: i32,
    pub option_id: i32,
    pub votes: i64,
}

/// Poll vote repository for database operations.
#[derive(Clone)]
pub struct PollVoteRepository {
    db: Arc<DatabaseConnection>,
}

impl PollVoteRepository {
    /// Create a new poll vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Record `user_id`'s choice of `option_id` in `poll_id`.
    ///
    /// Runs in one transaction: the poll must exist, the option must belong
    /// to it, and the vote row is written with an upsert on `(poll_id,
    /// user_id)`. A previous vote by the same user in the same poll is
    /// overwritten, never duplicated, and concurrent calls for the same user
    /// converge to the last committed choice.
    pub async fn cast(
        &self,
        poll_id: i32,
        option_id: i32,
        user_id: i32,
    ) -> AppResult<poll_vote::Model> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Hold the poll row so a concurrent poll deletion waits for us.
        let mut poll_query = Poll::find_by_id(poll_id);
        if txn.get_database_backend() == DatabaseBackend::Postgres {
            poll_query = poll_query.lock_shared();
        }
        poll_query
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))?;

        PollOption::find_by_id(option_id)
            .filter(poll_option::Column::PollId.eq(poll_id))
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| {
                AppError::NotFound(format!("Option {option_id} not found in poll {poll_id}"))
            })?;

        let vote = poll_vote::ActiveModel {
            poll_id: Set(poll_id),
            option_id: Set(option_id),
            user_id: Set(user_id),
            voted_at: Set(Utc::now().into()),
            ..Default::default()
        };

        PollVote::insert(vote)
            .on_conflict(
                OnConflict::columns([poll_vote::Column::PollId, poll_vote::Column::UserId])
                    .update_columns([poll_vote::Column::OptionId, poll_vote::Column::VotedAt])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let stored = PollVote::find()
            .filter(poll_vote::Column::PollId.eq(poll_id))
            .filter(poll_vote::Column::UserId.eq(user_id))
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::Internal("Vote row missing after upsert".to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(stored)
    }

    /// Find a user's vote rows in a poll (zero or one under the unique index).
    pub async fn find_by_user_and_poll(
        &self,
        user_id: i32,
        poll_id: i32,
    ) -> AppResult<Vec<poll_vote::Model>> {
        PollVote::find()
            .filter(poll_vote::Column::UserId.eq(user_id))
            .filter(poll_vote::Column::PollId.eq(poll_id))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The option a user currently votes for in a poll, if any.
    pub async fn find_user_choice(&self, user_id: i32, poll_id: i32) -> AppResult<Option<i32>> {
        PollVote::find()
            .select_only()
            .column(poll_vote::Column::OptionId)
            .filter(poll_vote::Column::UserId.eq(user_id))
            .filter(poll_vote::Column::PollId.eq(poll_id))
            .into_tuple::<i32>()
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// A user's choices across several polls, as `(poll_id, option_id)`.
    pub async fn find_user_choices(
        &self,
        user_id: i32,
        poll_ids: &[i32],
    ) -> AppResult<Vec<(i32, i32)>> {
        if poll_ids.is_empty() {
            return Ok(Vec::new());
        }

        PollVote::find()
            .select_only()
            .column(poll_vote::Column::PollId)
            .column(poll_vote::Column::OptionId)
            .filter(poll_vote::Column::UserId.eq(user_id))
            .filter(poll_vote::Column::PollId.is_in(poll_ids.to_vec()))
            .into_tuple::<(i32, i32)>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Vote counts per option for a set of polls.
    ///
    /// Options without votes produce no row.
    pub async fn count_by_option(&self, poll_ids: &[i32]) -> AppResult<Vec<OptionVoteCount>> {
        if poll_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = PollVote::find()
            .select_only()
            .column(poll_vote::Column::PollId)
            .column(poll_vote::Column::OptionId)
            .column_as(Expr::col(poll_vote::Column::Id).count(), "votes")
            .filter(poll_vote::Column::PollId.is_in(poll_ids.to_vec()))
            .group_by(poll_vote::Column::PollId)
            .group_by(poll_vote::Column::OptionId)
            .order_by_asc(poll_vote::Column::OptionId)
            .into_tuple::<(i32, i32, i64)>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(poll_id, option_id, votes)| OptionVoteCount {
                poll_id,
                option_id,
                votes,
            })
            .collect())
    }
}
