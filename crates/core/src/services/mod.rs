//! Business logic services.

pub mod aggregation;
pub mod broadcast;
pub mod poll;
pub mod user;
pub mod vote;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregation::{
    AggregationService, OptionResult, OptionTally, PollResult, ResultSnapshot,
};
pub use broadcast::{BroadcastHub, PollEvent, SubscriberId, Subscription};
pub use poll::{CreatePollInput, PollService};
pub use user::{CreateUserInput, UpdateUserInput, UserService};
pub use vote::VoteService;
