//! Literal token matching over post text.

use crate::VoteKind;

fn allowed(token: &str) -> bool {
    matches!(token, "good" | "bad" | "bot") || (token.len() > 1 && token.starts_with('@'))
}

/// Parse post text into a vote kind.
///
/// Returns `None` when any token falls outside the vote vocabulary, when no
/// `good bot` / `bad bot` pair is present, or when both pairs are present.
///
/// ```
/// use warden_votes::{parse_vote_text, VoteKind};
///
/// assert_eq!(parse_vote_text("Good Bot"), Some(VoteKind::GoodBot));
/// assert_eq!(parse_vote_text("bad bot @one.example.com"), Some(VoteKind::BadBot));
/// assert_eq!(parse_vote_text("testing good bot one"), None);
/// ```
pub fn parse_vote_text(text: &str) -> Option<VoteKind> {
    let lowered = text.trim().to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();
    if !tokens.iter().all(|t| allowed(t)) {
        return None;
    }

    let mut found = None;
    for pair in tokens.windows(2) {
        let kind = match pair {
            ["good", "bot"] => VoteKind::GoodBot,
            ["bad", "bot"] => VoteKind::BadBot,
            _ => continue,
        };
        match found {
            None => found = Some(kind),
            Some(prev) if prev != kind => return None,
            Some(_) => {}
        }
    }
    found
}
