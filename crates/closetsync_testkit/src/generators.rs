//! Property-based test generators using proptest.
//!
//! Item ids are drawn from a small pool so generated snapshots overlap and
//! exercise the conflict paths of the merge.

use closetsync_protocol::{
    ClosetItem, ClosetItemChanges, Feedback, FeedbackList, Mutation, Outfit, Timestamp,
    UserProfile,
};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

const CATEGORIES: &[&str] = &["tops", "bottoms", "shoes", "outerwear", "accessories"];
const COLORS: &[&str] = &["black", "white", "navy", "red", "beige"];

/// Strategy for item ids from a small shared pool.
pub fn item_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f][0-3]").expect("Invalid regex")
}

/// Strategy for timestamps in a narrow range, so ties happen.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    0i64..50
}

/// Strategy for a closet item with the given id.
pub fn closet_item_strategy(id: String) -> impl Strategy<Value = ClosetItem> {
    (
        prop::sample::select(CATEGORIES),
        prop::sample::select(COLORS),
        timestamp_strategy(),
        any::<bool>(),
        0u32..10,
    )
        .prop_map(move |(category, color, date_added, favorite, worn_count)| {
            let mut item = ClosetItem::new(id.clone(), category, date_added).with_color(color);
            item.favorite = favorite;
            item.worn_count = worn_count;
            item
        })
}

/// Strategy for a closet with unique item ids.
pub fn closet_strategy() -> impl Strategy<Value = Vec<ClosetItem>> {
    prop::collection::btree_set(item_id_strategy(), 0..6)
        .prop_flat_map(|ids| {
            ids.into_iter()
                .map(closet_item_strategy)
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

/// Strategy for an outfit of 2 to 4 distinct items.
pub fn outfit_strategy() -> impl Strategy<Value = Outfit> {
    prop::collection::btree_set(item_id_strategy(), 2..5)
}

/// Strategy for feedback that satisfies the liked/disliked exclusivity.
pub fn feedback_strategy() -> impl Strategy<Value = Feedback> {
    (
        prop::collection::btree_map(item_id_strategy(), any::<bool>(), 0..8),
        prop::collection::btree_set(item_id_strategy(), 0..4),
        prop::collection::vec(outfit_strategy(), 0..3),
        timestamp_strategy(),
    )
        .prop_map(|(opinions, viewed_items, outfits, last_interaction)| {
            let mut feedback = Feedback {
                viewed_items,
                last_interaction,
                ..Feedback::default()
            };
            for (item_id, liked) in opinions {
                if liked {
                    feedback.like(&item_id);
                } else {
                    feedback.dislike(&item_id);
                }
            }
            for outfit in &outfits {
                feedback.save_outfit(outfit);
            }
            feedback
        })
}

/// Strategy for a small preferences object.
pub fn preferences_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-c]", 0i64..5, 0..3).prop_map(|entries: BTreeMap<String, i64>| {
        entries
            .into_iter()
            .map(|(key, value)| (key, Value::from(value)))
            .collect()
    })
}

/// Strategy for a profile snapshot of `user_id`.
pub fn profile_strategy(user_id: &str) -> impl Strategy<Value = UserProfile> {
    let user_id = user_id.to_string();
    (
        timestamp_strategy(),
        closet_strategy(),
        feedback_strategy(),
        preferences_strategy(),
    )
        .prop_map(move |(last_active, closet, feedback, preferences)| UserProfile {
            closet,
            feedback,
            preferences,
            ..UserProfile::new(user_id.clone(), last_active)
        })
}

/// Strategy for like/dislike style mutations on the shared pool.
pub fn feedback_mutation_strategy() -> impl Strategy<Value = Mutation> {
    (item_id_strategy(), 0u8..4).prop_map(|(item_id, action)| match action {
        0 => Mutation::AddLikedItem { item_id },
        1 => Mutation::AddDislikedItem { item_id },
        2 => Mutation::RemoveLikedItem { item_id },
        _ => Mutation::RemoveDislikedItem { item_id },
    })
}

/// Strategy for any mutation.
pub fn mutation_strategy() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        item_id_strategy()
            .prop_flat_map(closet_item_strategy)
            .prop_map(Mutation::AddClosetItem),
        item_id_strategy().prop_map(|item_id| Mutation::RemoveClosetItem { item_id }),
        (item_id_strategy(), prop::option::of(prop::sample::select(COLORS)), prop::option::of(0u32..10))
            .prop_map(|(item_id, color, worn_count)| Mutation::UpdateClosetItem {
                item_id,
                changes: ClosetItemChanges {
                    color: color.map(str::to_string),
                    worn_count,
                    ..ClosetItemChanges::default()
                },
            }),
        (item_id_strategy(), any::<bool>())
            .prop_map(|(item_id, favorite)| Mutation::ToggleFavorite { item_id, favorite }),
        preferences_strategy().prop_map(Mutation::UpdatePreferences),
        (0i64..3).prop_map(|answer| Mutation::SubmitQuiz(serde_json::json!({ "q1": answer }))),
        feedback_mutation_strategy(),
        outfit_strategy().prop_map(Mutation::SaveOutfit),
        outfit_strategy().prop_map(Mutation::RemoveOutfit),
    ]
}

/// Strategy for a sequence of mutations.
pub fn mutation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(mutation_strategy(), min_ops..max_ops)
}

/// Which list an item ends up in, if any.
pub fn feedback_membership(feedback: &Feedback, item_id: &str) -> Option<FeedbackList> {
    match (
        feedback.liked_items.contains(item_id),
        feedback.disliked_items.contains(item_id),
    ) {
        (true, false) => Some(FeedbackList::Liked),
        (false, true) => Some(FeedbackList::Disliked),
        _ => None,
    }
}

/// Returns the closet ids of a profile as a set.
pub fn closet_ids(profile: &UserProfile) -> BTreeSet<String> {
    profile.closet.iter().map(|item| item.id.clone()).collect()
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn closet_ids_are_unique(closet in closet_strategy()) {
            let ids: BTreeSet<_> = closet.iter().map(|item| item.id.as_str()).collect();
            prop_assert_eq!(ids.len(), closet.len());
        }

        #[test]
        fn generated_feedback_is_exclusive(feedback in feedback_strategy()) {
            prop_assert!(feedback.is_exclusive());
        }

        #[test]
        fn outfits_have_two_items(outfit in outfit_strategy()) {
            prop_assert!(outfit.len() >= 2);
        }
    }
}
