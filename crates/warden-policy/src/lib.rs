//! Bot Vote Labeling Policy
//!
//! Peers vote on automated accounts with `good bot` / `bad bot`. Votes are
//! counted once per voter and subject; when the count for a kind reaches its
//! threshold the subject gets the kind's label.
//!
//! # Evaluation
//!
//! 1. Extract a vote from the post; none → [`Outcome::NoVote`]
//! 2. Voter carries a disqualifying label → [`Outcome::Disqualified`], nothing counted
//! 3. Look up the subject (a failure aborts before any mutation)
//! 4. Add the voter to the kind's distinct set for the subject
//! 5. Voter carries the override label → label now
//! 6. Count reached the threshold → label (idempotent, so later crossings are no-ops)
//!
//! Evaluations are stateless; counters and account state live behind
//! [`PolicyContext`]. Replaying a record never double counts.
//!
//! [`Engine`] adapts the policy to both stream consumers.

mod config;
mod engine;
mod error;
mod policy;
mod threshold;

pub use config::{
    BotVoteConfig, DEFAULT_BAD_BOT_THRESHOLD, DEFAULT_DISQUALIFYING_LABELS, DEFAULT_GOOD_BOT_THRESHOLD,
    DEFAULT_OVERRIDE_LABEL,
};
pub use engine::{Engine, FIREHOSE_STREAM, MODERATION_STREAM};
pub use error::{PolicyError, Result};
pub use policy::{BotVotePolicy, LabelVia, Outcome, PolicyContext};
pub use threshold::{meets_threshold, votes_needed};
