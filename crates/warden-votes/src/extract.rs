//! Subject resolution.

use crate::text::parse_vote_text;
use crate::VoteKind;
use warden_records::{AtUri, Did, Post, RecordError, ReplyRef};

/// A vote by one account about another. Lives only for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub voter: Did,
    pub subject: Did,
    pub kind: VoteKind,
}

/// Whether a reply sits inside the author's own thread: the parent or the
/// thread root belongs to the author.
pub fn is_self_thread(author: &Did, reply: &ReplyRef) -> Result<bool, RecordError> {
    let parent = AtUri::parse(&reply.parent.uri)?;
    let root = AtUri::parse(&reply.root.uri)?;
    Ok(parent.authority() == author.as_str() || root.authority() == author.as_str())
}

/// Extract a bot assessment from a post.
///
/// Malformed reply or mention identifiers drop the post; they are never
/// reported as errors. A vote about oneself is dropped too.
pub fn extract_vote(author: &Did, post: &Post) -> Option<Assessment> {
    let kind = parse_vote_text(&post.text)?;
    let subject = resolve_subject(author, post)?;
    if &subject == author {
        return None;
    }
    Some(Assessment {
        voter: author.clone(),
        subject,
        kind,
    })
}

fn resolve_subject(author: &Did, post: &Post) -> Option<Did> {
    if let Some(reply) = &post.reply {
        if !is_self_thread(author, reply).ok()? {
            let parent = AtUri::parse(&reply.parent.uri).ok()?;
            return parent.authority_did().ok();
        }
    }

    let mut mentions = post.mentions();
    match (mentions.next(), mentions.next()) {
        (Some(did), None) => Did::parse(did).ok(),
        _ => None,
    }
}
