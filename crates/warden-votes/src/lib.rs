//! Bot Vote Extraction
//!
//! Accounts on the network "vote" on automated accounts by posting the bare
//! phrase `good bot` or `bad bot`, either as a reply to the bot's post or
//! mentioning the bot. This crate turns a post into an [`Assessment`] or
//! nothing. It performs no I/O and holds no state.
//!
//! # Text Rule
//!
//! The whole utterance must be the vote. After lowercasing and trimming,
//! every whitespace token must be `good`, `bad`, `bot` or an `@mention`.
//! `"good bot"` and `"@someone.example good bot"` count; `"testing good bot"`
//! does not.
//!
//! # Subject Rule
//!
//! 1. A reply outside the author's own thread targets the parent's author.
//! 2. Otherwise a post with exactly one mention targets the mentioned account.
//! 3. Otherwise there is no subject and the vote is dropped.

mod extract;
mod text;

pub use extract::{extract_vote, is_self_thread, Assessment};
pub use text::parse_vote_text;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two kinds of assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoteKind {
    GoodBot,
    BadBot,
}

impl VoteKind {
    /// Both kinds, in a fixed order.
    pub const ALL: [VoteKind; 2] = [VoteKind::GoodBot, VoteKind::BadBot];

    /// Counter namespace and label value for this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            VoteKind::GoodBot => "good-bot",
            VoteKind::BadBot => "bad-bot",
        }
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
