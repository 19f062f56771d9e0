//! Vote thresholds.
//!
//! A label is applied once the distinct voter count for its kind reaches the
//! configured threshold. The check is `>=`, not `==`, so a count that crossed
//! while the moderation call failed retries on the next vote or redelivery.

/// Check if a distinct vote count meets the threshold.
///
/// # Examples
///
/// ```
/// use warden_policy::meets_threshold;
///
/// assert!(!meets_threshold(1, 2));
/// assert!(meets_threshold(2, 2));
/// assert!(meets_threshold(5, 2));
/// ```
pub const fn meets_threshold(count: u64, threshold: u64) -> bool {
    count >= threshold
}

/// How many more distinct votes are needed.
pub const fn votes_needed(count: u64, threshold: u64) -> u64 {
    threshold.saturating_sub(count)
}
