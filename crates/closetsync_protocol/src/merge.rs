//! Snapshot merge.
//!
//! Combines a local and a remote [`UserProfile`] into one reconciled
//! snapshot using last-write-wins per field:
//!
//! 1. The snapshot with the larger `last_active` is the base and its scalar
//!    fields win outright. Ties pick the local snapshot.
//! 2. Closets are unioned by item id; an item present on both sides keeps
//!    the copy with the larger `date_added` (ties keep the remote copy).
//! 3. Feedback sets are unioned, saved outfits are unioned with set-equality
//!    dedup and `last_interaction` is the maximum of both sides.
//!
//! Removals are not expressed through the merge; they travel as queued
//! operations. This is not a CRDT: two devices editing the same field of
//! the same entity concurrently lose one of the edits.

use crate::operation::FeedbackList;
use crate::profile::{ClosetItem, Feedback, UserProfile};
use std::collections::{BTreeSet, HashMap};

/// Merges a local and a remote snapshot.
///
/// The result carries the base snapshot's `user_id`; callers merge
/// snapshots of the same user.
///
/// # Example
///
/// ```rust
/// use closetsync_protocol::{merge, ClosetItem, UserProfile};
///
/// let mut local = UserProfile::new("u", 10);
/// local.closet.push(ClosetItem::new("a", "tops", 1));
///
/// let mut remote = UserProfile::new("u", 20);
/// remote.closet.push(ClosetItem::new("b", "shoes", 2));
///
/// let merged = merge(&local, &remote);
/// assert_eq!(merged.last_active, 20);
/// assert_eq!(merged.closet.len(), 2);
/// ```
pub fn merge(local: &UserProfile, remote: &UserProfile) -> UserProfile {
    let (base, other) = if local.last_active >= remote.last_active {
        (local, remote)
    } else {
        (remote, local)
    };

    let mut merged = base.clone();
    merged.closet = merge_closet(&local.closet, &remote.closet);
    merged.feedback = merge_feedback(
        &local.feedback,
        &remote.feedback,
        &base.feedback,
        &other.feedback,
    );
    merged
}

/// Merges snapshots when either side may be missing.
///
/// One absent side returns the other unchanged.
pub fn merge_optional(
    local: Option<&UserProfile>,
    remote: Option<&UserProfile>,
) -> Option<UserProfile> {
    match (local, remote) {
        (Some(local), Some(remote)) => Some(merge(local, remote)),
        (Some(only), None) | (None, Some(only)) => Some(only.clone()),
        (None, None) => None,
    }
}

fn merge_closet(local: &[ClosetItem], remote: &[ClosetItem]) -> Vec<ClosetItem> {
    let mut merged: Vec<ClosetItem> = Vec::with_capacity(local.len().max(remote.len()));
    let mut index: HashMap<&str, usize> = HashMap::new();

    for item in remote.iter().chain(local.iter()) {
        match index.get(item.id.as_str()) {
            Some(&slot) => {
                if item.date_added > merged[slot].date_added {
                    merged[slot] = item.clone();
                }
            }
            None => {
                index.insert(item.id.as_str(), merged.len());
                merged.push(item.clone());
            }
        }
    }

    merged
}

fn merge_feedback(
    local: &Feedback,
    remote: &Feedback,
    base: &Feedback,
    other: &Feedback,
) -> Feedback {
    let mut liked: BTreeSet<String> = local
        .liked_items
        .union(&remote.liked_items)
        .cloned()
        .collect();
    let mut disliked: BTreeSet<String> = local
        .disliked_items
        .union(&remote.disliked_items)
        .cloned()
        .collect();
    let viewed = local
        .viewed_items
        .union(&remote.viewed_items)
        .cloned()
        .collect();

    // An id can land in both lists when the two sides disagree. The base
    // snapshot decides, then the other one, then liked wins.
    let contested: Vec<String> = liked.intersection(&disliked).cloned().collect();
    for item_id in contested {
        let keep = membership(base, &item_id)
            .or_else(|| membership(other, &item_id))
            .unwrap_or(FeedbackList::Liked);
        match keep {
            FeedbackList::Liked => disliked.remove(&item_id),
            FeedbackList::Disliked => liked.remove(&item_id),
        };
    }

    let mut saved_outfits = Vec::with_capacity(local.saved_outfits.len());
    for outfit in local.saved_outfits.iter().chain(remote.saved_outfits.iter()) {
        if !saved_outfits.contains(outfit) {
            saved_outfits.push(outfit.clone());
        }
    }

    Feedback {
        liked_items: liked,
        disliked_items: disliked,
        viewed_items: viewed,
        saved_outfits,
        last_interaction: local.last_interaction.max(remote.last_interaction),
    }
}

fn membership(feedback: &Feedback, item_id: &str) -> Option<FeedbackList> {
    let liked = feedback.liked_items.contains(item_id);
    let disliked = feedback.disliked_items.contains(item_id);
    match (liked, disliked) {
        (true, false) => Some(FeedbackList::Liked),
        (false, true) => Some(FeedbackList::Disliked),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Outfit;
    use serde_json::json;

    fn outfit(ids: &[&str]) -> Outfit {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn closet_keeps_newer_copy_and_remote_additions() {
        let mut local = UserProfile::new("u", 100);
        local.closet.push(ClosetItem::new("a", "tops", 1));

        let mut remote = UserProfile::new("u", 50);
        remote.closet.push(ClosetItem::new("a", "tops", 2));
        remote.closet.push(ClosetItem::new("b", "shoes", 3));

        let merged = merge(&local, &remote);
        let closet: Vec<(&str, i64)> = merged
            .closet
            .iter()
            .map(|item| (item.id.as_str(), item.date_added))
            .collect();
        assert_eq!(closet, vec![("a", 2), ("b", 3)]);
    }

    #[test]
    fn local_only_items_survive() {
        let mut local = UserProfile::new("u", 1);
        local.closet.push(ClosetItem::new("offline", "bags", 9));
        let remote = UserProfile::new("u", 2);

        let merged = merge(&local, &remote);
        assert!(merged.closet_item("offline").is_some());
    }

    #[test]
    fn base_scalars_follow_last_active() {
        let mut local = UserProfile::new("u", 10);
        local.preferences.insert("fit".into(), json!("slim"));
        let mut remote = UserProfile::new("u", 20);
        remote.preferences.insert("fit".into(), json!("loose"));

        assert_eq!(merge(&local, &remote).preferences["fit"], json!("loose"));

        remote.last_active = 10;
        // Equal timestamps keep the local snapshot as base.
        assert_eq!(merge(&local, &remote).preferences["fit"], json!("slim"));
    }

    #[test]
    fn feedback_sets_union() {
        let mut local = UserProfile::new("u", 1);
        local.feedback.like("l1");
        local.feedback.viewed_items.insert("v1".into());
        local.feedback.last_interaction = 7;

        let mut remote = UserProfile::new("u", 2);
        remote.feedback.like("l2");
        remote.feedback.dislike("d1");
        remote.feedback.viewed_items.insert("v2".into());
        remote.feedback.last_interaction = 5;

        let merged = merge(&local, &remote).feedback;
        assert_eq!(merged.liked_items.len(), 2);
        assert!(merged.disliked_items.contains("d1"));
        assert_eq!(merged.viewed_items.len(), 2);
        assert_eq!(merged.last_interaction, 7);
    }

    #[test]
    fn contested_item_follows_base() {
        let mut local = UserProfile::new("u", 30);
        local.feedback.like("x");
        let mut remote = UserProfile::new("u", 10);
        remote.feedback.dislike("x");

        let merged = merge(&local, &remote);
        assert!(merged.feedback.liked_items.contains("x"));
        assert!(!merged.feedback.disliked_items.contains("x"));
        assert!(merged.feedback.is_exclusive());

        remote.last_active = 40;
        let merged = merge(&local, &remote);
        assert!(merged.feedback.disliked_items.contains("x"));
        assert!(merged.feedback.is_exclusive());
    }

    #[test]
    fn outfits_dedup_by_items() {
        let mut local = UserProfile::new("u", 1);
        local.feedback.saved_outfits.push(outfit(&["a", "b"]));
        let mut remote = UserProfile::new("u", 1);
        remote.feedback.saved_outfits.push(outfit(&["b", "a"]));
        remote.feedback.saved_outfits.push(outfit(&["c", "d"]));

        let merged = merge(&local, &remote);
        assert_eq!(
            merged.feedback.saved_outfits,
            vec![outfit(&["a", "b"]), outfit(&["c", "d"])]
        );
    }

    #[test]
    fn merge_is_idempotent_for_sample() {
        let mut local = UserProfile::new("u", 5);
        local.closet.push(ClosetItem::new("a", "tops", 4));
        local.feedback.like("x");
        let mut remote = UserProfile::new("u", 9);
        remote.closet.push(ClosetItem::new("a", "tops", 4).with_color("red"));
        remote.feedback.dislike("x");
        remote.feedback.saved_outfits.push(outfit(&["a", "z"]));

        let once = merge(&local, &remote);
        let twice = merge(&once, &remote);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_optional_sides() {
        let profile = UserProfile::new("u", 1);
        assert_eq!(merge_optional(Some(&profile), None), Some(profile.clone()));
        assert_eq!(merge_optional(None, Some(&profile)), Some(profile.clone()));
        assert_eq!(merge_optional(None, None), None);
    }
}
