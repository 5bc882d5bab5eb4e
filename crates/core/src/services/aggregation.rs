//! Aggregation engine.
//!
//! Read-side computation of poll results: per-option vote counts, the poll
//! total, percentages, and the viewer's own choice.

use std::collections::HashMap;

use serde::Serialize;
use webpolls_common::AppResult;
use webpolls_db::repositories::{
    PollListingRow, PollOptionRepository, PollRepository, PollVoteRepository,
};

/// Tally for one option, as seen by a particular viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResult {
    pub id: i32,
    pub content: String,
    pub vote_count: i64,
    pub percentage: f64,
}

/// Aggregated results of a poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub id: i32,
    pub question: String,
    pub owner_id: i32,
    pub options: Vec<OptionResult>,
    pub total_votes: i64,
    /// Option the viewer currently votes for, if any.
    pub viewer_voted_option_id: Option<i32>,
}

/// Viewer-independent tally of one option.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionTally {
    pub id: i32,
    pub vote_count: i64,
    pub percentage: f64,
}

/// Results pushed to live viewers after a change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSnapshot {
    pub poll_id: i32,
    pub total_votes: i64,
    pub options: Vec<OptionTally>,
}

impl From<&PollResult> for ResultSnapshot {
    fn from(result: &PollResult) -> Self {
        Self {
            poll_id: result.id,
            total_votes: result.total_votes,
            options: result
                .options
                .iter()
                .map(|o| OptionTally {
                    id: o.id,
                    vote_count: o.vote_count,
                    percentage: o.percentage,
                })
                .collect(),
        }
    }
}

impl PollResult {
    /// Fill in vote counts, the total and percentages.
    ///
    /// Options missing from `counts` have zero votes.
    fn apply_counts(&mut self, counts: &HashMap<i32, i64>) {
        for option in &mut self.options {
            option.vote_count = counts.get(&option.id).copied().unwrap_or(0);
        }
        self.total_votes = self.options.iter().map(|o| o.vote_count).sum();

        let total = self.total_votes;
        for option in &mut self.options {
            option.percentage = percentage(option.vote_count, total);
        }
    }
}

/// Share of `votes` in `total`, in percent. Zero when nobody has voted.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percentage(votes: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    votes as f64 / total as f64 * 100.0
}

/// Group flat poll/option rows into polls.
///
/// Polls keep the order in which they first appear and options keep row
/// order. Counts start at zero.
#[must_use]
pub fn group_listing_rows(rows: Vec<PollListingRow>) -> Vec<PollResult> {
    let mut polls: Vec<PollResult> = Vec::new();
    let mut index: HashMap<i32, usize> = HashMap::new();

    for row in rows {
        let option = OptionResult {
            id: row.option_id,
            content: row.option_content,
            vote_count: 0,
            percentage: 0.0,
        };

        if let Some(&i) = index.get(&row.poll_id) {
            polls[i].options.push(option);
        } else {
            index.insert(row.poll_id, polls.len());
            polls.push(PollResult {
                id: row.poll_id,
                question: row.question,
                owner_id: row.owner_id,
                options: vec![option],
                total_votes: 0,
                viewer_voted_option_id: None,
            });
        }
    }

    polls
}

/// Aggregation service computing poll results.
#[derive(Clone)]
pub struct AggregationService {
    poll_repo: PollRepository,
    option_repo: PollOptionRepository,
    vote_repo: PollVoteRepository,
}

impl AggregationService {
    /// Create a new aggregation service.
    #[must_use]
    pub const fn new(
        poll_repo: PollRepository,
        option_repo: PollOptionRepository,
        vote_repo: PollVoteRepository,
    ) -> Self {
        Self {
            poll_repo,
            option_repo,
            vote_repo,
        }
    }

    /// Results of one poll, personalized for `viewer`.
    pub async fn poll_result(&self, poll_id: i32, viewer: Option<i32>) -> AppResult<PollResult> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        let options = self.option_repo.find_by_poll(poll_id).await?;

        let counts: HashMap<i32, i64> = self
            .vote_repo
            .count_by_option(&[poll_id])
            .await?
            .into_iter()
            .map(|c| (c.option_id, c.votes))
            .collect();

        let viewer_voted_option_id = match viewer {
            Some(user_id) => self.vote_repo.find_user_choice(user_id, poll_id).await?,
            None => None,
        };

        let mut result = PollResult {
            id: poll.id,
            question: poll.question,
            owner_id: poll.user_id,
            options: options
                .into_iter()
                .map(|o| OptionResult {
                    id: o.id,
                    content: o.content,
                    vote_count: 0,
                    percentage: 0.0,
                })
                .collect(),
            total_votes: 0,
            viewer_voted_option_id,
        };
        result.apply_counts(&counts);

        Ok(result)
    }

    /// Viewer-independent results of one poll.
    pub async fn snapshot(&self, poll_id: i32) -> AppResult<ResultSnapshot> {
        let result = self.poll_result(poll_id, None).await?;
        Ok(ResultSnapshot::from(&result))
    }

    /// Every poll, newest first.
    pub async fn polls_for_viewer(&self, viewer: Option<i32>) -> AppResult<Vec<PollResult>> {
        self.listing(None, viewer).await
    }

    /// Polls created by `owner_id`, newest first.
    pub async fn polls_by_owner(
        &self,
        owner_id: i32,
        viewer: Option<i32>,
    ) -> AppResult<Vec<PollResult>> {
        self.listing(Some(owner_id), viewer).await
    }

    async fn listing(&self, owner_id: Option<i32>, viewer: Option<i32>) -> AppResult<Vec<PollResult>> {
        let rows = self.poll_repo.find_listing_rows(owner_id).await?;
        let mut polls = group_listing_rows(rows);
        if polls.is_empty() {
            return Ok(polls);
        }

        let poll_ids: Vec<i32> = polls.iter().map(|p| p.id).collect();

        // Option ids are unique across polls, so one map serves every poll.
        let counts: HashMap<i32, i64> = self
            .vote_repo
            .count_by_option(&poll_ids)
            .await?
            .into_iter()
            .map(|c| (c.option_id, c.votes))
            .collect();

        let choices: HashMap<i32, i32> = match viewer {
            Some(user_id) => self
                .vote_repo
                .find_user_choices(user_id, &poll_ids)
                .await?
                .into_iter()
                .collect(),
            None => HashMap::new(),
        };

        for poll in &mut polls {
            poll.apply_counts(&counts);
            poll.viewer_voted_option_id = choices.get(&poll.id).copied();
        }

        Ok(polls)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::services::test_support::TestContext;

    fn row(poll_id: i32, option_id: i32, content: &str) -> PollListingRow {
        PollListingRow {
            poll_id,
            question: format!("Question {poll_id}"),
            owner_id: 1,
            option_id,
            option_content: content.to_string(),
        }
    }

    #[test]
    fn test_percentage_of_empty_poll_is_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(3, 0), 0.0);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(1, 4), 25.0);
        assert_eq!(percentage(2, 2), 100.0);
    }

    #[test]
    fn test_group_listing_rows_preserves_order() {
        let rows = vec![
            row(9, 30, "a"),
            row(9, 31, "b"),
            row(4, 10, "x"),
            row(4, 11, "y"),
            row(4, 12, "z"),
        ];

        let polls = group_listing_rows(rows);

        assert_eq!(polls.len(), 2);
        assert_eq!(polls[0].id, 9);
        assert_eq!(polls[1].id, 4);
        let ids: Vec<i32> = polls[1].options.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![10, 11, 12]);
    }

    #[test]
    fn test_group_listing_rows_does_not_resort_interleaved_rows() {
        let rows = vec![row(2, 5, "a"), row(7, 8, "b"), row(2, 6, "c")];

        let polls = group_listing_rows(rows);

        assert_eq!(polls.len(), 2);
        assert_eq!(polls[0].id, 2);
        assert_eq!(polls[0].options.len(), 2);
        assert_eq!(polls[1].id, 7);
    }

    #[test]
    fn test_apply_counts_sums_to_hundred() {
        let mut result = group_listing_rows(vec![row(1, 1, "a"), row(1, 2, "b"), row(1, 3, "c")])
            .pop()
            .unwrap();

        result.apply_counts(&HashMap::from([(1, 1), (2, 1), (3, 1)]));

        assert_eq!(result.total_votes, 3);
        let sum: f64 = result.options.iter().map(|o| o.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_drops_viewer_fields() {
        let mut result = group_listing_rows(vec![row(1, 1, "a"), row(1, 2, "b")])
            .pop()
            .unwrap();
        result.viewer_voted_option_id = Some(2);
        result.apply_counts(&HashMap::from([(2, 3)]));

        let snapshot = ResultSnapshot::from(&result);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["pollId"], 1);
        assert_eq!(json["totalVotes"], 3);
        assert_eq!(json["options"][1]["voteCount"], 3);
        assert_eq!(json["options"][1]["percentage"], 100.0);
        assert!(json.get("viewerVotedOptionId").is_none());
    }

    #[tokio::test]
    async fn test_poll_result_without_votes() {
        let ctx = TestContext::new().await;
        let owner = ctx.user("alice").await;
        let (poll_id, _) = ctx.poll(owner, "Coffee or Tea?", &["Coffee", "Tea"]).await;

        let result = ctx.aggregation().poll_result(poll_id, Some(owner)).await.unwrap();

        assert_eq!(result.total_votes, 0);
        assert!(result.options.iter().all(|o| o.vote_count == 0));
        assert!(result.options.iter().all(|o| o.percentage == 0.0));
        assert_eq!(result.viewer_voted_option_id, None);
    }

    #[tokio::test]
    async fn test_poll_result_counts_votes() {
        let ctx = TestContext::new().await;
        let owner = ctx.user("alice").await;
        let bob = ctx.user("bob").await;
        let carol = ctx.user("carol").await;
        let (poll_id, options) = ctx.poll(owner, "Coffee or Tea?", &["Coffee", "Tea"]).await;

        ctx.votes().cast(poll_id, options[0], bob).await.unwrap();
        ctx.votes().cast(poll_id, options[1], carol).await.unwrap();
        ctx.votes().cast(poll_id, options[1], owner).await.unwrap();

        let result = ctx.aggregation().poll_result(poll_id, Some(bob)).await.unwrap();

        assert_eq!(result.total_votes, 3);
        assert_eq!(result.options[0].vote_count, 1);
        assert_eq!(result.options[1].vote_count, 2);
        assert_eq!(result.viewer_voted_option_id, Some(options[0]));
        let sum: f64 = result.options.iter().map(|o| o.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_poll_result_missing_poll() {
        let ctx = TestContext::new().await;

        let result = ctx.aggregation().poll_result(404, None).await;

        assert!(matches!(result, Err(webpolls_common::AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_listing_personalizes_per_poll() {
        let ctx = TestContext::new().await;
        let alice = ctx.user("alice").await;
        let bob = ctx.user("bob").await;
        let (first, first_options) = ctx.poll(alice, "First?", &["a", "b"]).await;
        let (second, _) = ctx.poll(bob, "Second?", &["c", "d", "e"]).await;

        ctx.votes().cast(first, first_options[1], bob).await.unwrap();

        let polls = ctx.aggregation().polls_for_viewer(Some(bob)).await.unwrap();

        assert_eq!(polls.len(), 2);
        assert_eq!(polls[0].id, second);
        assert_eq!(polls[0].options.len(), 3);
        assert_eq!(polls[0].viewer_voted_option_id, None);
        assert_eq!(polls[1].id, first);
        assert_eq!(polls[1].total_votes, 1);
        assert_eq!(polls[1].viewer_voted_option_id, Some(first_options[1]));

        let mine = ctx.aggregation().polls_by_owner(alice, None).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, first);
        assert_eq!(mine[0].viewer_voted_option_id, None);
    }
}
