//! Poll repository.

use std::sync::Arc;

use crate::entities::{Poll, PollOption, PollVote, poll, poll_option, poll_vote};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use webpolls_common::{AppError, AppResult};

/// One poll joined with one of its options.
///
/// Listing queries return these flat rows; callers group them by `poll_id`.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct PollListingRow {
    pub poll_id: i32,
    pub question: String,
    pub owner_id: i32,
    pub option_id: i32,
    pub option_content: String,
}

/// Poll repository for database operations.
#[derive(Clone)]
pub struct PollRepository {
    db: Arc<DatabaseConnection>,
}

impl PollRepository {
    /// Create a new poll repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a poll by ID.
    pub async fn find_by_id(&self, id: i32) -> AppResult<Option<poll::Model>> {
        Poll::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a poll by ID, returning error if not found.
    pub async fn get_by_id(&self, id: i32) -> AppResult<poll::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {id}")))
    }

    /// Create a poll together with its options.
    ///
    /// All rows are written in one transaction: if any option insert fails,
    /// neither the poll nor any option is persisted.
    pub async fn create_with_options(
        &self,
        user_id: i32,
        question: &str,
        options: &[String],
    ) -> AppResult<(poll::Model, Vec<poll_option::Model>)> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let poll = poll::ActiveModel {
            question: Set(question.to_string()),
            user_id: Set(user_id),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let mut created = Vec::with_capacity(options.len());
        for content in options {
            let option = poll_option::ActiveModel {
                poll_id: Set(poll.id),
                content: Set(content.clone()),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
            created.push(option);
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((poll, created))
    }

    /// Delete a poll with its options and votes.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        PollVote::delete_many()
            .filter(poll_vote::Column::PollId.eq(id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        PollOption::delete_many()
            .filter(poll_option::Column::PollId.eq(id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let result = Poll::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("Poll not found: {id}")));
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List polls joined with their options.
    ///
    /// Newest poll first; options of a poll in creation order. When
    /// `owner_id` is given only that user's polls are returned.
    pub async fn find_listing_rows(&self, owner_id: Option<i32>) -> AppResult<Vec<PollListingRow>> {
        let mut query = Poll::find()
            .select_only()
            .column_as(poll::Column::Id, "poll_id")
            .column(poll::Column::Question)
            .column_as(poll::Column::UserId, "owner_id")
            .column_as(poll_option::Column::Id, "option_id")
            .column_as(poll_option::Column::Content, "option_content")
            .join(JoinType::InnerJoin, poll::Relation::PollOption.def());

        if let Some(owner_id) = owner_id {
            query = query.filter(poll::Column::UserId.eq(owner_id));
        }

        query
            .order_by_desc(poll::Column::Id)
            .order_by_asc(poll_option::Column::Id)
            .into_model::<PollListingRow>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_poll(id: i32, question: &str) -> poll::Model {
        poll::Model {
            id,
            question: question.to_string(),
            user_id: 1,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_get_by_id_returns_poll() {
        let poll = create_test_poll(7, "Coffee or Tea?");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[poll.clone()]])
                .into_connection(),
        );

        let repo = PollRepository::new(db);
        let found = repo.get_by_id(7).await.unwrap();

        assert_eq!(found.question, "Coffee or Tea?");
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<poll::Model>::new()])
                .into_connection(),
        );

        let repo = PollRepository::new(db);
        let result = repo.get_by_id(99).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_poll_is_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 0, // votes
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 0, // options
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 0, // poll
                    },
                ])
                .into_connection(),
        );

        let repo = PollRepository::new(db);
        let result = repo.delete(5).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
