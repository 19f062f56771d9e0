//! Shared fixtures for the end-to-end tests in `tests/`.
//!
//! [`Pipeline`] wires the real policy, labeler and engine against in-process
//! stores and a recording moderation sink. [`ScriptedSource`] and
//! [`ScriptedPoller`] replay fixed event lists into a consumer.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex};
use warden_consumer::{ConsumerError, EventPoller, EventSource, Sequenced};
use warden_counters::{CountStore, MemCountStore, Period};
use warden_labels::memory::{MemDirectory, RecordingModeration};
use warden_labels::{AccountLabeler, AccountMeta, CacheConfig, LabelEvent};
use warden_metrics::WardenMetrics;
use warden_policy::{BotVoteConfig, BotVotePolicy, Engine, PolicyContext};
use warden_records::{
    Did, FirehoseEvent, ModerationAction, ModerationEvent, ModerationSubject, Post, Record, RepoAction,
};

pub const OPERATOR: &str = "did:plc:operator";

pub fn did(s: &str) -> Did {
    Did::parse(s).unwrap()
}

pub fn post_uri(owner: &str, rkey: &str) -> String {
    format!("at://{}/app.bsky.feed.post/{}", owner, rkey)
}

/// Policy, engine and the fakes behind them.
pub struct Pipeline {
    pub directory: Arc<MemDirectory>,
    pub moderation: Arc<RecordingModeration>,
    pub counters: Arc<MemCountStore>,
    pub accounts: Arc<AccountLabeler>,
    pub metrics: WardenMetrics,
    pub engine: Engine,
}

impl Pipeline {
    pub fn new(config: BotVoteConfig) -> Self {
        let directory = Arc::new(MemDirectory::new());
        let moderation = Arc::new(RecordingModeration::new().with_directory(directory.clone()));
        let counters = Arc::new(MemCountStore::new());
        let accounts = Arc::new(
            AccountLabeler::new(directory.clone(), CacheConfig::default())
                .with_moderation(moderation.clone(), did(OPERATOR)),
        );
        let metrics = WardenMetrics::unregistered().unwrap();
        let ctx = PolicyContext {
            counters: counters.clone(),
            accounts: accounts.clone(),
            metrics: metrics.clone(),
        };
        let policy = BotVotePolicy::new(config, ctx).unwrap();
        Self {
            directory,
            moderation,
            counters,
            accounts,
            metrics,
            engine: Engine::new(Arc::new(policy)),
        }
    }

    /// Register accounts with the given labels.
    pub fn accounts(&self, dids: &[&str], labels: &[&str]) {
        for name in dids {
            let meta = labels
                .iter()
                .fold(AccountMeta::new(did(name)), |meta, label| meta.with_label(*label));
            self.directory.insert(meta);
        }
    }

    pub async fn total(&self, kind: &str, subject: &str) -> u64 {
        self.counters
            .get_count_distinct(kind, subject, Period::Total)
            .await
            .unwrap()
    }

    /// Label requests for `label` on `subject`.
    pub fn label_events(&self, subject: &str, label: &str) -> Vec<LabelEvent> {
        self.moderation.events_for(&did(subject), label)
    }
}

fn created(seq: u64, author: &str, post: Post) -> FirehoseEvent {
    FirehoseEvent {
        seq,
        repo: author.to_string(),
        collection: "app.bsky.feed.post".to_string(),
        rkey: format!("p{}", seq),
        action: RepoAction::Create,
        record: Some(Record::Post(post)),
    }
}

/// `author` replies `text` to a top-level post by `bot`.
pub fn reply_vote(seq: u64, author: &str, bot: &str, text: &str) -> FirehoseEvent {
    let target = post_uri(bot, "1");
    created(seq, author, Post::new(text).with_reply(target.clone(), target))
}

/// `author` posts `text` mentioning `subject`, outside any thread.
pub fn mention_vote(seq: u64, author: &str, subject: &str, text: &str) -> FirehoseEvent {
    created(seq, author, Post::new(text).with_mention(subject))
}

/// `author` replies `text` under `parent_post` in a thread rooted at `root_post`.
pub fn threaded_reply(seq: u64, author: &str, root_post: &str, parent_post: &str, text: &str) -> FirehoseEvent {
    created(seq, author, Post::new(text).with_reply(root_post, parent_post))
}

/// A moderator labels `subject`.
pub fn label_event(id: u64, subject: &str, label: &str) -> ModerationEvent {
    ModerationEvent {
        id,
        subject: ModerationSubject {
            did: Some(subject.to_string()),
            uri: None,
        },
        created_by: Some("did:plc:moderator".to_string()),
        action: ModerationAction::Label {
            create: vec![label.to_string()],
            negate: vec![],
        },
    }
}

/// Replays `events` after the requested cursor, then stays open.
pub struct ScriptedSource<E> {
    events: Vec<E>,
    /// Ignore the cursor and replay everything, like an upstream that
    /// redelivers after a reconnect.
    replay_all: bool,
    subscriptions: Mutex<Vec<Option<u64>>>,
}

impl<E: Sequenced + Clone> ScriptedSource<E> {
    pub fn new(events: Vec<E>) -> Self {
        Self {
            events,
            replay_all: false,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn replaying(events: Vec<E>) -> Self {
        Self {
            replay_all: true,
            ..Self::new(events)
        }
    }

    /// Cursor of every subscribe call, in order.
    pub fn subscriptions(&self) -> Vec<Option<u64>> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl<E: Sequenced + Clone + Sync> EventSource<E> for ScriptedSource<E> {
    async fn subscribe(&self, cursor: Option<u64>) -> warden_consumer::Result<BoxStream<'static, warden_consumer::Result<E>>> {
        self.subscriptions.lock().unwrap().push(cursor);
        let events: Vec<_> = self
            .events
            .iter()
            .filter(|e| self.replay_all || cursor.map_or(true, |c| e.seq() > c))
            .cloned()
            .map(Ok)
            .collect();
        Ok(stream::iter(events).chain(stream::pending()).boxed())
    }
}

/// Serves `events` in pages of `page` after the requested position.
pub struct ScriptedPoller<E> {
    events: Vec<E>,
    page: usize,
}

impl<E> ScriptedPoller<E> {
    pub fn new(events: Vec<E>, page: usize) -> Self {
        Self { events, page }
    }
}

#[async_trait]
impl<E: Sequenced + Clone + Sync> EventPoller<E> for ScriptedPoller<E> {
    async fn poll(&self, after: Option<u64>) -> Result<Vec<E>, ConsumerError> {
        Ok(self
            .events
            .iter()
            .filter(|e| after.map_or(true, |a| e.seq() > a))
            .take(self.page)
            .cloned()
            .collect())
    }
}
