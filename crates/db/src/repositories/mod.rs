//! Data access repositories.

mod poll;
mod poll_option;
mod poll_vote;
mod user;

pub use poll::{PollListingRow, PollRepository};
pub use poll_option::PollOptionRepository;
pub use poll_vote::{OptionVoteCount, PollVoteRepository};
pub use user::UserRepository;
