//! The good-bot / bad-bot rule.

use crate::config::BotVoteConfig;
use crate::error::Result;
use crate::threshold::{meets_threshold, votes_needed};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_counters::{CountStore, Period};
use warden_labels::{AccountLabeler, AccountMeta, LabelChange};
use warden_metrics::WardenMetrics;
use warden_records::{Did, Post};
use warden_votes::{extract_vote, Assessment, VoteKind};

/// Shared handles an evaluation works against.
#[derive(Clone)]
pub struct PolicyContext {
    pub counters: Arc<dyn CountStore>,
    pub accounts: Arc<AccountLabeler>,
    pub metrics: WardenMetrics,
}

/// Why a label was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelVia {
    /// The voter carries the override label.
    Override,
    /// The distinct vote count reached the threshold.
    Threshold,
}

/// Result of evaluating one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The post is not a vote.
    NoVote,
    /// The voter carries a disqualifying label; nothing was counted.
    Disqualified { kind: VoteKind },
    /// The vote was counted and no label was due.
    Counted { kind: VoteKind, count: u64 },
    /// The vote was counted and the kind's label was requested.
    Labeled {
        kind: VoteKind,
        count: u64,
        via: LabelVia,
        change: LabelChange,
    },
}

impl Outcome {
    /// Metrics label.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Outcome::NoVote => "no_vote",
            Outcome::Disqualified { .. } => "disqualified",
            Outcome::Counted { .. } => "counted",
            Outcome::Labeled { .. } => "labeled",
        }
    }
}

/// Stateless evaluator; all state lives behind [`PolicyContext`].
pub struct BotVotePolicy {
    config: BotVoteConfig,
    ctx: PolicyContext,
}

impl BotVotePolicy {
    pub fn new(config: BotVoteConfig, ctx: PolicyContext) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, ctx })
    }

    pub fn config(&self) -> &BotVoteConfig {
        &self.config
    }

    pub fn context(&self) -> &PolicyContext {
        &self.ctx
    }

    /// Evaluate one newly created post by `author`.
    ///
    /// Metadata lookups happen before the counter is touched, so a lookup
    /// failure leaves no trace. A moderation failure after the increment is
    /// returned; replaying the post re-attempts the label.
    pub async fn evaluate(&self, author: &Did, post: &Post) -> Result<Outcome> {
        let Some(vote) = extract_vote(author, post) else {
            return Ok(Outcome::NoVote);
        };
        let outcome = self.evaluate_vote(&vote).await;
        let label = match &outcome {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "error",
        };
        self.ctx.metrics.vote_evaluated(vote.kind.as_str(), label);
        outcome
    }

    async fn evaluate_vote(&self, vote: &Assessment) -> Result<Outcome> {
        let kind = vote.kind;
        let voter = self.ctx.accounts.account_meta(&vote.voter).await?;
        if voter.has_any_label(self.config.disqualifying_labels.as_slice()) {
            warn!(
                voter = %vote.voter,
                subject = %vote.subject,
                labels = ?voter.labels,
                "skipping bot assessment from disqualified account"
            );
            return Ok(Outcome::Disqualified { kind });
        }

        let subject = self.ctx.accounts.account_meta(&vote.subject).await?;

        let key = vote.subject.as_str();
        let good = self
            .ctx
            .counters
            .get_count_distinct(VoteKind::GoodBot.as_str(), key, Period::Total)
            .await?;
        let bad = self
            .ctx
            .counters
            .get_count_distinct(VoteKind::BadBot.as_str(), key, Period::Total)
            .await?;
        debug!(subject = %vote.subject, good, bad, "counts before vote");

        let count = self
            .ctx
            .counters
            .increment_distinct(kind.as_str(), key, vote.voter.as_str())
            .await?;
        info!(
            vote = %kind,
            voter = %vote.voter,
            subject = %vote.subject,
            count,
            subject_labels = ?subject.labels,
            "valid bot assessment"
        );

        let via = if voter.has_label(&self.config.override_label) {
            LabelVia::Override
        } else if meets_threshold(count, self.config.threshold(kind)) {
            LabelVia::Threshold
        } else {
            debug!(
                vote = %kind,
                subject = %vote.subject,
                remaining = votes_needed(count, self.config.threshold(kind)),
                "below threshold"
            );
            return Ok(Outcome::Counted { kind, count });
        };

        let change = self.apply_label(kind, &subject).await?;
        Ok(Outcome::Labeled {
            kind,
            count,
            via,
            change,
        })
    }

    async fn apply_label(&self, kind: VoteKind, subject: &AccountMeta) -> Result<LabelChange> {
        let label = kind.as_str();
        match self.ctx.accounts.add_label(subject, label).await {
            Ok(change) => {
                self.ctx.metrics.label_action(label, "add", change.as_str());
                Ok(change)
            }
            Err(e) => {
                self.ctx.metrics.label_action(label, "add", "error");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_counters::MemCountStore;
    use warden_labels::memory::{MemDirectory, RecordingModeration};
    use warden_labels::CacheConfig;

    struct Harness {
        policy: BotVotePolicy,
        directory: Arc<MemDirectory>,
        moderation: Arc<RecordingModeration>,
        counters: Arc<MemCountStore>,
    }

    fn did(s: &str) -> Did {
        Did::parse(s).unwrap()
    }

    fn harness(config: BotVoteConfig) -> Harness {
        let directory = Arc::new(MemDirectory::new());
        let moderation = Arc::new(RecordingModeration::new());
        let counters = Arc::new(MemCountStore::new());
        let accounts = Arc::new(
            AccountLabeler::new(directory.clone(), CacheConfig::default())
                .with_moderation(moderation.clone(), did("did:plc:operator")),
        );
        let ctx = PolicyContext {
            counters: counters.clone(),
            accounts,
            metrics: WardenMetrics::unregistered().unwrap(),
        };
        for name in ["did:plc:bot", "did:plc:v1", "did:plc:v2", "did:plc:v3"] {
            directory.insert(AccountMeta::new(did(name)));
        }
        Harness {
            policy: BotVotePolicy::new(config, ctx).unwrap(),
            directory,
            moderation,
            counters,
        }
    }

    fn reply_to_bot(text: &str) -> Post {
        Post::new(text).with_reply(
            "at://did:plc:bot/app.bsky.feed.post/root",
            "at://did:plc:bot/app.bsky.feed.post/parent",
        )
    }

    #[tokio::test]
    async fn non_vote_is_ignored() {
        let h = harness(BotVoteConfig::default());
        let outcome = h.policy.evaluate(&did("did:plc:v1"), &reply_to_bot("nice post")).await.unwrap();
        assert_eq!(outcome, Outcome::NoVote);
        assert!(h.counters.is_empty());
    }

    #[tokio::test]
    async fn threshold_crossing_labels_once() {
        let h = harness(BotVoteConfig::default());
        let bot = did("did:plc:bot");
        let post = reply_to_bot("bad bot");

        let first = h.policy.evaluate(&did("did:plc:v1"), &post).await.unwrap();
        assert_eq!(
            first,
            Outcome::Counted {
                kind: VoteKind::BadBot,
                count: 1
            }
        );
        assert!(h.moderation.events().is_empty());

        let second = h.policy.evaluate(&did("did:plc:v2"), &post).await.unwrap();
        assert!(matches!(
            second,
            Outcome::Labeled {
                count: 2,
                via: LabelVia::Threshold,
                change: LabelChange::Applied,
                ..
            }
        ));

        let third = h.policy.evaluate(&did("did:plc:v3"), &post).await.unwrap();
        assert!(matches!(
            third,
            Outcome::Labeled {
                count: 3,
                change: LabelChange::Unchanged,
                ..
            }
        ));
        assert_eq!(h.moderation.events_for(&bot, "bad-bot").len(), 1);
        assert_eq!(
            h.policy.context().metrics.label_action_count("bad-bot", "add", "applied"),
            1
        );
    }

    #[tokio::test]
    async fn bad_bot_votes_do_not_move_good_bot_count() {
        let h = harness(BotVoteConfig::default());
        h.policy.evaluate(&did("did:plc:v1"), &reply_to_bot("good bot")).await.unwrap();
        h.policy.evaluate(&did("did:plc:v2"), &reply_to_bot("bad bot")).await.unwrap();

        let good = h.counters.get_count_distinct("good-bot", "did:plc:bot", Period::Total).await.unwrap();
        let bad = h.counters.get_count_distinct("bad-bot", "did:plc:bot", Period::Total).await.unwrap();
        assert_eq!((good, bad), (1, 1));
        assert!(h.moderation.events().is_empty());
    }

    #[tokio::test]
    async fn repeat_voter_counts_once() {
        let h = harness(BotVoteConfig::default());
        let post = reply_to_bot("good bot");
        for _ in 0..3 {
            h.policy.evaluate(&did("did:plc:v1"), &post).await.unwrap();
        }
        let good = h.counters.get_count_distinct("good-bot", "did:plc:bot", Period::Total).await.unwrap();
        assert_eq!(good, 1);
        assert!(h.moderation.events().is_empty());
    }

    #[tokio::test]
    async fn override_voter_labels_immediately() {
        let h = harness(BotVoteConfig::default().with_thresholds(5, 5));
        h.directory
            .insert(AccountMeta::new(did("did:plc:runner")).with_label("bladerunner"));

        let outcome = h.policy.evaluate(&did("did:plc:runner"), &reply_to_bot("good bot")).await.unwrap();
        assert!(matches!(
            outcome,
            Outcome::Labeled {
                kind: VoteKind::GoodBot,
                count: 1,
                via: LabelVia::Override,
                change: LabelChange::Applied,
            }
        ));
        assert_eq!(h.moderation.events_for(&did("did:plc:bot"), "good-bot").len(), 1);
    }

    #[tokio::test]
    async fn disqualified_voter_does_not_count() {
        let h = harness(BotVoteConfig::default().with_thresholds(1, 1));
        h.directory
            .insert(AccountMeta::new(did("did:plc:troll")).with_label("jabroni"));

        let outcome = h.policy.evaluate(&did("did:plc:troll"), &reply_to_bot("bad bot")).await.unwrap();
        assert_eq!(outcome, Outcome::Disqualified { kind: VoteKind::BadBot });
        assert!(h.counters.is_empty());
        assert!(h.moderation.events().is_empty());
        assert_eq!(
            h.policy.context().metrics.vote_count("bad-bot", "disqualified"),
            1
        );
    }

    #[tokio::test]
    async fn unknown_subject_aborts_before_counting() {
        let h = harness(BotVoteConfig::default());
        let post = Post::new("bad bot").with_reply(
            "at://did:plc:ghost/app.bsky.feed.post/root",
            "at://did:plc:ghost/app.bsky.feed.post/parent",
        );
        let err = h.policy.evaluate(&did("did:plc:v1"), &post).await.unwrap_err();
        assert!(matches!(err, crate::PolicyError::Labels(_)));
        assert!(h.counters.is_empty());
        assert_eq!(h.policy.context().metrics.vote_count("bad-bot", "error"), 1);
    }

    #[tokio::test]
    async fn failed_label_is_retried_on_redelivery() {
        let h = harness(BotVoteConfig::default().with_thresholds(1, 1));
        let post = reply_to_bot("bad bot");
        h.moderation.fail_next(1);

        assert!(h.policy.evaluate(&did("did:plc:v1"), &post).await.is_err());
        assert!(h.moderation.events().is_empty());

        // same record again: the increment is a no-op, the label goes through
        let outcome = h.policy.evaluate(&did("did:plc:v1"), &post).await.unwrap();
        assert!(matches!(
            outcome,
            Outcome::Labeled {
                count: 1,
                change: LabelChange::Applied,
                ..
            }
        ));
        assert_eq!(h.moderation.events().len(), 1);
        assert_eq!(h.policy.context().metrics.label_action_count("bad-bot", "add", "error"), 1);
    }

    #[tokio::test]
    async fn self_thread_reply_is_not_counted() {
        let h = harness(BotVoteConfig::default());
        let post = Post::new("good bot").with_reply(
            "at://did:plc:v1/app.bsky.feed.post/root",
            "at://did:plc:bot/app.bsky.feed.post/parent",
        );
        let outcome = h.policy.evaluate(&did("did:plc:v1"), &post).await.unwrap();
        assert_eq!(outcome, Outcome::NoVote);
        assert!(h.counters.is_empty());
    }
}
