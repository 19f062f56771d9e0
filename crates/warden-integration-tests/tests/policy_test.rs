//! Votes through the engine, the way the firehose consumer delivers them.

use warden_consumer::EventHandler;
use warden_integration_tests::*;
use warden_policy::BotVoteConfig;

const BOT: &str = "did:plc:bot";

fn pipeline() -> Pipeline {
    let pipeline = Pipeline::new(BotVoteConfig::default());
    pipeline.accounts(&[BOT, "did:plc:v1", "did:plc:v2", "did:plc:v3"], &[]);
    pipeline
}

#[tokio::test]
async fn repeat_votes_count_once_per_voter() {
    let p = pipeline();
    for seq in 1..=5 {
        p.engine.handle(reply_vote(seq, "did:plc:v1", BOT, "good bot")).await.unwrap();
    }
    assert_eq!(p.total("good-bot", BOT).await, 1);
    assert!(p.label_events(BOT, "good-bot").is_empty());
}

#[tokio::test]
async fn threshold_vote_labels_exactly_once() {
    let p = pipeline();
    p.engine.handle(reply_vote(1, "did:plc:v1", BOT, "bad bot")).await.unwrap();
    assert!(p.label_events(BOT, "bad-bot").is_empty());

    p.engine.handle(reply_vote(2, "did:plc:v2", BOT, "bad bot")).await.unwrap();
    p.engine.handle(reply_vote(3, "did:plc:v3", BOT, "Bad Bot")).await.unwrap();
    // redelivery of the crossing vote
    p.engine.handle(reply_vote(2, "did:plc:v2", BOT, "bad bot")).await.unwrap();

    assert_eq!(p.total("bad-bot", BOT).await, 3);
    let events = p.label_events(BOT, "bad-bot");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].created_by, did(OPERATOR));
    assert!(p.directory.get(&did(BOT)).unwrap().has_label("bad-bot"));
}

#[tokio::test]
async fn kinds_are_counted_separately() {
    let p = pipeline();
    p.engine.handle(reply_vote(1, "did:plc:v1", BOT, "good bot")).await.unwrap();
    p.engine.handle(reply_vote(2, "did:plc:v2", BOT, "bad bot")).await.unwrap();

    assert_eq!(p.total("good-bot", BOT).await, 1);
    assert_eq!(p.total("bad-bot", BOT).await, 1);
    assert!(p.moderation.events().is_empty());
}

#[tokio::test]
async fn disqualified_voters_never_move_counters() {
    let p = pipeline();
    p.accounts(&["did:plc:jab"], &["jabroni"]);
    p.accounts(&["did:plc:flagged"], &["bad-bot"]);

    p.engine.handle(reply_vote(1, "did:plc:jab", BOT, "bad bot")).await.unwrap();
    p.engine.handle(reply_vote(2, "did:plc:flagged", BOT, "bad bot")).await.unwrap();

    assert_eq!(p.total("bad-bot", BOT).await, 0);
    assert_eq!(p.metrics.vote_count("bad-bot", "disqualified"), 2);
}

#[tokio::test]
async fn override_voter_labels_on_first_vote() {
    let p = Pipeline::new(BotVoteConfig::default().with_thresholds(5, 5));
    p.accounts(&[BOT], &[]);
    p.accounts(&["did:plc:runner"], &["bladerunner"]);

    p.engine.handle(reply_vote(1, "did:plc:runner", BOT, "good bot")).await.unwrap();

    assert_eq!(p.total("good-bot", BOT).await, 1);
    assert_eq!(p.label_events(BOT, "good-bot").len(), 1);
}

#[tokio::test]
async fn replies_in_own_thread_never_count() {
    let p = pipeline();
    // v1 answers a bot reply under v1's own post
    let event = threaded_reply(1, "did:plc:v1", &post_uri("did:plc:v1", "1"), &post_uri(BOT, "2"), "good bot");
    p.engine.handle(event).await.unwrap();

    // A -> B -> A: v1 replies to the bot inside a thread v1 started
    let event = threaded_reply(2, "did:plc:v1", &post_uri("did:plc:v1", "1"), &post_uri(BOT, "3"), "bad bot");
    p.engine.handle(event).await.unwrap();

    assert_eq!(p.total("good-bot", BOT).await, 0);
    assert_eq!(p.total("bad-bot", BOT).await, 0);
}

#[tokio::test]
async fn mention_vote_targets_mentioned_account() {
    let p = pipeline();
    p.engine
        .handle(mention_vote(1, "did:plc:v1", BOT, "@bot.example.com good bot"))
        .await
        .unwrap();
    assert_eq!(p.total("good-bot", BOT).await, 1);
}

#[tokio::test]
async fn extra_words_are_not_votes() {
    let p = pipeline();
    p.engine
        .handle(reply_vote(1, "did:plc:v1", BOT, "testing good bot one"))
        .await
        .unwrap();
    assert_eq!(p.total("good-bot", BOT).await, 0);
    assert_eq!(p.metrics.event_count("firehose", "no_vote"), 1);
}

#[tokio::test]
async fn failed_label_is_retried_on_redelivery() {
    let p = pipeline();
    p.engine.handle(reply_vote(1, "did:plc:v1", BOT, "good bot")).await.unwrap();

    p.moderation.fail_next(1);
    let failed = p.engine.handle(reply_vote(2, "did:plc:v2", BOT, "good bot")).await;
    assert!(failed.is_err());
    assert!(p.label_events(BOT, "good-bot").is_empty());

    p.engine.handle(reply_vote(2, "did:plc:v2", BOT, "good bot")).await.unwrap();
    assert_eq!(p.total("good-bot", BOT).await, 2);
    assert_eq!(p.label_events(BOT, "good-bot").len(), 1);
}
