//! Warden Records - identifiers and stream payloads
//!
//! Everything the labeling pipeline reads off the wire is decoded into the
//! types in this crate before any rule sees it.
//!
//! # Identifiers
//!
//! - [`Did`] - validated account identifier (`did:<method>:<id>`)
//! - [`AtUri`] - `at://<authority>/<collection>/<rkey>` record reference
//!
//! # Records
//!
//! [`Record`] is a tagged variant with one case per known payload type.
//! Unknown types decode to [`Record::Unknown`] instead of failing, so new
//! upstream record types never stall the stream.
//!
//! # Events
//!
//! - [`FirehoseEvent`] - one repository operation from the primary stream
//! - [`ModerationEvent`] - one moderator action from the moderation stream

mod did;
mod error;
mod event;
mod record;
mod uri;

pub use did::Did;
pub use error::{RecordError, Result};
pub use event::{FirehoseEvent, ModerationAction, ModerationEvent, ModerationSubject, RepoAction};
pub use record::{ByteSlice, Facet, FacetFeature, Follow, Like, Post, Record, ReplyRef, Repost, StrongRef};
pub use uri::AtUri;

/// Collection name for posts.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";
