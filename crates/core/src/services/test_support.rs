//! Shared fixtures for service tests.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{DatabaseConnection, Set};
use webpolls_db::{
    entities::user,
    repositories::{PollOptionRepository, PollRepository, PollVoteRepository, UserRepository},
    test_utils::TestDatabase,
};

use super::{AggregationService, BroadcastHub, PollService, UserService, VoteService};

/// A migrated in-memory database plus a running hub.
pub struct TestContext {
    db: Arc<DatabaseConnection>,
    hub: BroadcastHub,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_buffer(16).await
    }

    pub async fn with_buffer(buffer: usize) -> Self {
        let db = TestDatabase::in_memory().await.unwrap();
        Self {
            db: Arc::new(db.conn),
            hub: BroadcastHub::spawn(buffer),
        }
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub fn polls(&self) -> PollRepository {
        PollRepository::new(Arc::clone(&self.db))
    }

    pub fn options(&self) -> PollOptionRepository {
        PollOptionRepository::new(Arc::clone(&self.db))
    }

    pub fn votes(&self) -> PollVoteRepository {
        PollVoteRepository::new(Arc::clone(&self.db))
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(Arc::clone(&self.db))
    }

    pub fn vote_service(&self) -> VoteService {
        VoteService::new(self.votes())
    }

    pub fn aggregation(&self) -> AggregationService {
        AggregationService::new(self.polls(), self.options(), self.votes())
    }

    pub fn poll_service(&self) -> PollService {
        PollService::new(self.polls(), self.options(), self.votes(), self.hub.clone())
    }

    pub fn user_service(&self) -> UserService {
        UserService::new(self.users())
    }

    /// Insert a user directly and return its id.
    pub async fn user(&self, username: &str) -> i32 {
        let model = user::ActiveModel {
            username: Set(username.to_string()),
            email: Set(format!("{username}@example.com")),
            password_hash: Set("not-a-real-hash".to_string()),
            token: Set(Some(format!("token-{username}"))),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };
        self.users().create(model).await.unwrap().id
    }

    /// Insert a poll directly and return its id and option ids.
    pub async fn poll(&self, owner: i32, question: &str, options: &[&str]) -> (i32, Vec<i32>) {
        let options: Vec<String> = options.iter().map(ToString::to_string).collect();
        let (poll, created) = self
            .polls()
            .create_with_options(owner, question, &options)
            .await
            .unwrap();
        (poll.id, created.into_iter().map(|o| o.id).collect())
    }
}
