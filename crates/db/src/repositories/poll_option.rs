//! Poll option repository.

use std::sync::Arc;

use crate::entities::{Poll, PollOption, PollVote, poll_option, poll_vote};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use webpolls_common::{AppError, AppResult};

/// Poll option repository for database operations.
#[derive(Clone)]
pub struct PollOptionRepository {
    db: Arc<DatabaseConnection>,
}

impl PollOptionRepository {
    /// Create a new poll option repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// List the options of a poll in creation order.
    pub async fn find_by_poll(&self, poll_id: i32) -> AppResult<Vec<poll_option::Model>> {
        PollOption::find()
            .filter(poll_option::Column::PollId.eq(poll_id))
            .order_by_asc(poll_option::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find an option, but only if it belongs to `poll_id`.
    pub async fn find_in_poll(
        &self,
        poll_id: i32,
        id: i32,
    ) -> AppResult<Option<poll_option::Model>> {
        PollOption::find_by_id(id)
            .filter(poll_option::Column::PollId.eq(poll_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Replace the text of an option of `poll_id`.
    pub async fn update_content(
        &self,
        poll_id: i32,
        id: i32,
        content: &str,
    ) -> AppResult<poll_option::Model> {
        let option = self.find_in_poll(poll_id, id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Option {id} not found in poll {poll_id}"))
        })?;

        let mut active: poll_option::ActiveModel = option.into();
        active.content = Set(content.to_string());

        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete an option (and the votes cast for it) unless the poll would be
    /// left with fewer than `min_remaining` options.
    ///
    /// The poll row is locked for the duration of the transaction on
    /// PostgreSQL so two concurrent deletions cannot both pass the count check.
    pub async fn delete_keeping_minimum(
        &self,
        poll_id: i32,
        option_id: i32,
        min_remaining: u64,
    ) -> AppResult<()> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut poll_query = Poll::find_by_id(poll_id);
        if txn.get_database_backend() == DatabaseBackend::Postgres {
            poll_query = poll_query.lock_exclusive();
        }
        poll_query
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))?;

        let belongs = PollOption::find_by_id(option_id)
            .filter(poll_option::Column::PollId.eq(poll_id))
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        if belongs.is_none() {
            return Err(AppError::NotFound(format!(
                "Option {option_id} not found in poll {poll_id}"
            )));
        }

        let count = PollOption::find()
            .filter(poll_option::Column::PollId.eq(poll_id))
            .count(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if count <= min_remaining {
            return Err(AppError::Invariant(format!(
                "Poll must keep at least {min_remaining} options"
            )));
        }

        PollVote::delete_many()
            .filter(poll_vote::Column::OptionId.eq(option_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        PollOption::delete_by_id(option_id)
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
