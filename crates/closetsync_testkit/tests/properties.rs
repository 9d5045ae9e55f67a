//! Property tests for merge, local application and the durable queue.

use closetsync_engine::{DurableQueue, ProfileStore, QUEUE_KEY};
use closetsync_protocol::{merge, FeedbackList, Mutation, Operation, UserProfile};
use closetsync_storage::InMemoryStore;
use closetsync_testkit::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;

fn apply_all(profile: &UserProfile, mutations: &[Mutation]) -> UserProfile {
    let mut profile = profile.clone();
    for (i, mutation) in mutations.iter().enumerate() {
        profile.apply(mutation, 100 + i as i64);
    }
    profile
}

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn merge_is_idempotent(
        local in profile_strategy("u"),
        remote in profile_strategy("u"),
    ) {
        let once = merge(&local, &remote);
        let twice = merge(&once, &remote);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn merge_keeps_every_closet_id(
        local in profile_strategy("u"),
        remote in profile_strategy("u"),
    ) {
        let merged = merge(&local, &remote);
        let expected: std::collections::BTreeSet<String> =
            closet_ids(&local).union(&closet_ids(&remote)).cloned().collect();
        prop_assert_eq!(closet_ids(&merged), expected);
        prop_assert_eq!(merged.closet.len(), closet_ids(&merged).len());
    }

    #[test]
    fn merge_keeps_feedback_exclusive(
        local in profile_strategy("u"),
        remote in profile_strategy("u"),
    ) {
        let merged = merge(&local, &remote);
        prop_assert!(merged.feedback.is_exclusive());

        // Every opinion from either side survives in one of the two lists.
        for item_id in local
            .feedback
            .liked_items
            .iter()
            .chain(&local.feedback.disliked_items)
            .chain(&remote.feedback.liked_items)
            .chain(&remote.feedback.disliked_items)
        {
            prop_assert!(feedback_membership(&merged.feedback, item_id).is_some());
        }
    }

    #[test]
    fn merge_takes_newest_last_active(
        local in profile_strategy("u"),
        remote in profile_strategy("u"),
    ) {
        let merged = merge(&local, &remote);
        prop_assert_eq!(merged.last_active, local.last_active.max(remote.last_active));
        prop_assert_eq!(
            merged.feedback.last_interaction,
            local.feedback.last_interaction.max(remote.feedback.last_interaction)
        );
    }

    #[test]
    fn feedback_sequences_stay_exclusive(
        profile in profile_strategy("u"),
        mutations in prop::collection::vec(feedback_mutation_strategy(), 0..40),
    ) {
        let profile = apply_all(&profile, &mutations);
        prop_assert!(profile.feedback.is_exclusive());
    }

    #[test]
    fn last_feedback_action_wins(
        mutations in prop::collection::vec(feedback_mutation_strategy(), 1..40),
    ) {
        let profile = apply_all(&UserProfile::new("u", 0), &mutations);
        let feedback = &profile.feedback;
        match mutations.last().unwrap() {
            Mutation::AddLikedItem { item_id } => {
                prop_assert_eq!(feedback_membership(feedback, item_id), Some(FeedbackList::Liked));
            }
            Mutation::AddDislikedItem { item_id } => {
                prop_assert_eq!(feedback_membership(feedback, item_id), Some(FeedbackList::Disliked));
            }
            Mutation::RemoveLikedItem { item_id } => {
                prop_assert!(!feedback.liked_items.contains(item_id));
            }
            Mutation::RemoveDislikedItem { item_id } => {
                prop_assert!(!feedback.disliked_items.contains(item_id));
            }
            other => unreachable!("unexpected mutation {other:?}"),
        }
    }

    #[test]
    fn apply_is_idempotent(
        profile in profile_strategy("u"),
        mutation in mutation_strategy(),
    ) {
        let mut once = profile.clone();
        once.apply(&mutation, 77);
        let mut twice = once.clone();
        twice.apply(&mutation, 77);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn operations_decode_to_their_mutation(mutation in mutation_strategy()) {
        let operation = Operation::new(&mutation, "u", 1).unwrap();
        prop_assert_eq!(operation.kind(), mutation.kind());
        prop_assert_eq!(operation.mutation().unwrap(), mutation);
    }

    #[test]
    fn queue_reload_matches_memory(
        mutations in mutation_sequence_strategy(1, 12),
        resolve_mask in prop::collection::vec(any::<bool>(), 12),
    ) {
        let store = Arc::new(InMemoryStore::new());
        let mut queue = DurableQueue::load(Arc::clone(&store), QUEUE_KEY, 5);
        let mut ids = Vec::new();
        for (i, mutation) in mutations.iter().enumerate() {
            ids.push(queue.enqueue(mutation, "u", i as i64).unwrap());
        }

        let resolved: Vec<_> = ids
            .iter()
            .zip(&resolve_mask)
            .filter(|(_, resolve)| **resolve)
            .map(|(id, _)| id.clone())
            .collect();
        queue.mark_resolved(&resolved).unwrap();

        let reloaded = DurableQueue::load(store, QUEUE_KEY, 5);
        prop_assert_eq!(reloaded.pending(), queue.pending());
        prop_assert_eq!(reloaded.pending_count(), ids.len() - resolved.len());
    }
}

#[tokio::test]
async fn offline_scenario_with_harness() {
    let harness = TestSync::in_memory("u1", false);
    harness
        .remote
        .set_profile(sample_profile("u1", 1, &["server-item"]));

    harness.sync.enqueue_add_closet_item(sample_item("offline-item", 9)).unwrap();
    harness.sync.enqueue_save_outfit(["offline-item", "server-item"]).unwrap();
    assert_eq!(harness.sync.status().pending_count, 2);

    harness.connectivity.set_online(true);
    let result = harness.sync.sync_now().await.unwrap().completed().unwrap();
    assert_eq!(result.delivered, 2);

    let profile = harness.profiles.current_profile().unwrap();
    assert!(profile.closet_item("offline-item").is_some());
    assert!(profile.closet_item("server-item").is_some());
    assert_eq!(profile.feedback.saved_outfits.len(), 1);
    assert_eq!(harness.sync.status().pending_count, 0);
}
