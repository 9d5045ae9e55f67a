//! User profile snapshots.

use crate::operation::{ClosetItemChanges, Mutation, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A saved outfit: an unordered set of item ids.
///
/// Two outfits are the same outfit if they contain exactly the same items.
pub type Outfit = BTreeSet<String>;

/// An item in the user's closet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosetItem {
    /// Item id, unique within a closet.
    pub id: String,
    /// Category, e.g. "tops" or "shoes".
    #[serde(default)]
    pub category: String,
    /// Subcategory, e.g. "t-shirts".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    /// Dominant color.
    #[serde(default)]
    pub color: String,
    /// Brand name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// Size label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the user marked the item as favorite.
    #[serde(default)]
    pub favorite: bool,
    /// How many times the item was worn.
    #[serde(default)]
    pub worn_count: u32,
    /// When the item was last worn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_worn: Option<Timestamp>,
    /// When the item was added; the per-item merge tiebreaker.
    pub date_added: Timestamp,
}

impl ClosetItem {
    /// Creates an item with the given id, category and add time.
    pub fn new(id: impl Into<String>, category: impl Into<String>, date_added: Timestamp) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            subcategory: None,
            color: String::new(),
            brand: None,
            size: None,
            tags: Vec::new(),
            favorite: false,
            worn_count: 0,
            last_worn: None,
            date_added,
        }
    }

    /// Sets the color.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Sets the brand.
    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    /// Sets the tags.
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Applies a partial update.
    pub fn apply_changes(&mut self, changes: &ClosetItemChanges) {
        if let Some(category) = &changes.category {
            self.category = category.clone();
        }
        if let Some(subcategory) = &changes.subcategory {
            self.subcategory = Some(subcategory.clone());
        }
        if let Some(color) = &changes.color {
            self.color = color.clone();
        }
        if let Some(brand) = &changes.brand {
            self.brand = Some(brand.clone());
        }
        if let Some(size) = &changes.size {
            self.size = Some(size.clone());
        }
        if let Some(tags) = &changes.tags {
            self.tags = tags.clone();
        }
        if let Some(worn_count) = changes.worn_count {
            self.worn_count = worn_count;
        }
        if let Some(last_worn) = changes.last_worn {
            self.last_worn = Some(last_worn);
        }
    }
}

/// Feedback the user gave on recommendations.
///
/// # Invariants
///
/// - `liked_items` and `disliked_items` are disjoint
/// - `saved_outfits` holds no two equal outfits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    /// Liked item ids.
    #[serde(default)]
    pub liked_items: BTreeSet<String>,
    /// Disliked item ids.
    #[serde(default)]
    pub disliked_items: BTreeSet<String>,
    /// Viewed item ids.
    #[serde(default)]
    pub viewed_items: BTreeSet<String>,
    /// Saved outfits.
    #[serde(default)]
    pub saved_outfits: Vec<Outfit>,
    /// Time of the last feedback interaction.
    #[serde(default)]
    pub last_interaction: Timestamp,
}

impl Feedback {
    /// Likes an item, evicting it from the disliked items.
    pub fn like(&mut self, item_id: &str) {
        self.disliked_items.remove(item_id);
        self.liked_items.insert(item_id.to_string());
    }

    /// Dislikes an item, evicting it from the liked items.
    pub fn dislike(&mut self, item_id: &str) {
        self.liked_items.remove(item_id);
        self.disliked_items.insert(item_id.to_string());
    }

    /// Saves an outfit unless an equal one is already saved.
    ///
    /// Returns true if the outfit was added.
    pub fn save_outfit(&mut self, outfit: &Outfit) -> bool {
        if self.saved_outfits.contains(outfit) {
            return false;
        }
        self.saved_outfits.push(outfit.clone());
        true
    }

    /// Returns true if no item is both liked and disliked.
    pub fn is_exclusive(&self) -> bool {
        self.liked_items.is_disjoint(&self.disliked_items)
    }
}

/// A complete, point-in-time user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Owner.
    pub user_id: String,
    /// Last activity time; the primary merge tiebreaker.
    #[serde(default)]
    pub last_active: Timestamp,
    /// Closet items, unique by id.
    #[serde(default)]
    pub closet: Vec<ClosetItem>,
    /// Recommendation feedback.
    #[serde(default)]
    pub feedback: Feedback,
    /// Style preferences, opaque to sync.
    #[serde(default)]
    pub preferences: Map<String, Value>,
    /// Style quiz answers, opaque to sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_quiz: Option<Value>,
}

impl UserProfile {
    /// Creates an empty profile.
    pub fn new(user_id: impl Into<String>, last_active: Timestamp) -> Self {
        Self {
            user_id: user_id.into(),
            last_active,
            closet: Vec::new(),
            feedback: Feedback::default(),
            preferences: Map::new(),
            style_quiz: None,
        }
    }

    /// Looks up a closet item by id.
    pub fn closet_item(&self, item_id: &str) -> Option<&ClosetItem> {
        self.closet.iter().find(|item| item.id == item_id)
    }

    fn closet_item_mut(&mut self, item_id: &str) -> Option<&mut ClosetItem> {
        self.closet.iter_mut().find(|item| item.id == item_id)
    }

    /// Applies a mutation made at `timestamp` to this snapshot.
    ///
    /// Applying the same mutation twice leaves the snapshot as applying it
    /// once did, so pending operations can be replayed over a freshly merged
    /// snapshot. Mutations that target a missing closet item are no-ops.
    pub fn apply(&mut self, mutation: &Mutation, timestamp: Timestamp) {
        match mutation {
            Mutation::AddClosetItem(item) => match self.closet_item_mut(&item.id) {
                Some(existing) => *existing = item.clone(),
                None => self.closet.push(item.clone()),
            },
            Mutation::RemoveClosetItem { item_id } => {
                self.closet.retain(|item| &item.id != item_id);
            }
            Mutation::UpdateClosetItem { item_id, changes } => {
                if let Some(item) = self.closet_item_mut(item_id) {
                    item.apply_changes(changes);
                }
            }
            Mutation::ToggleFavorite { item_id, favorite } => {
                if let Some(item) = self.closet_item_mut(item_id) {
                    item.favorite = *favorite;
                }
            }
            Mutation::UpdatePreferences(preferences) => {
                for (key, value) in preferences {
                    self.preferences.insert(key.clone(), value.clone());
                }
            }
            Mutation::SubmitQuiz(answers) => {
                self.style_quiz = Some(answers.clone());
            }
            Mutation::AddLikedItem { item_id } => self.feedback.like(item_id),
            Mutation::RemoveLikedItem { item_id } => {
                self.feedback.liked_items.remove(item_id);
            }
            Mutation::AddDislikedItem { item_id } => self.feedback.dislike(item_id),
            Mutation::RemoveDislikedItem { item_id } => {
                self.feedback.disliked_items.remove(item_id);
            }
            Mutation::SaveOutfit(outfit) => {
                self.feedback.save_outfit(outfit);
            }
            Mutation::RemoveOutfit(outfit) => {
                self.feedback.saved_outfits.retain(|saved| saved != outfit);
            }
        }

        if is_feedback(mutation) {
            self.feedback.last_interaction = self.feedback.last_interaction.max(timestamp);
        }
        self.last_active = self.last_active.max(timestamp);
    }
}

fn is_feedback(mutation: &Mutation) -> bool {
    matches!(
        mutation,
        Mutation::AddLikedItem { .. }
            | Mutation::RemoveLikedItem { .. }
            | Mutation::AddDislikedItem { .. }
            | Mutation::RemoveDislikedItem { .. }
            | Mutation::SaveOutfit(_)
            | Mutation::RemoveOutfit(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outfit(ids: &[&str]) -> Outfit {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn like_evicts_dislike() {
        let mut profile = UserProfile::new("u", 0);
        profile.apply(&Mutation::AddDislikedItem { item_id: "x".into() }, 10);
        profile.apply(&Mutation::AddLikedItem { item_id: "x".into() }, 20);

        assert!(profile.feedback.liked_items.contains("x"));
        assert!(!profile.feedback.disliked_items.contains("x"));
        assert_eq!(profile.feedback.last_interaction, 20);
        assert_eq!(profile.last_active, 20);
    }

    #[test]
    fn dislike_evicts_like() {
        let mut feedback = Feedback::default();
        feedback.like("x");
        feedback.dislike("x");
        assert!(feedback.is_exclusive());
        assert!(feedback.disliked_items.contains("x"));
    }

    #[test]
    fn add_closet_item_replaces_same_id() {
        let mut profile = UserProfile::new("u", 0);
        profile.apply(
            &Mutation::AddClosetItem(ClosetItem::new("c1", "tops", 5).with_color("red")),
            5,
        );
        profile.apply(
            &Mutation::AddClosetItem(ClosetItem::new("c1", "tops", 5).with_color("blue")),
            6,
        );

        assert_eq!(profile.closet.len(), 1);
        assert_eq!(profile.closet_item("c1").unwrap().color, "blue");
    }

    #[test]
    fn update_and_favorite_missing_item_is_noop() {
        let mut profile = UserProfile::new("u", 0);
        profile.apply(
            &Mutation::ToggleFavorite {
                item_id: "ghost".into(),
                favorite: true,
            },
            3,
        );
        assert!(profile.closet.is_empty());
        assert_eq!(profile.last_active, 3);
    }

    #[test]
    fn update_closet_item_changes_fields() {
        let mut profile = UserProfile::new("u", 0);
        profile.closet.push(ClosetItem::new("c1", "tops", 1));

        profile.apply(
            &Mutation::UpdateClosetItem {
                item_id: "c1".into(),
                changes: ClosetItemChanges {
                    color: Some("green".into()),
                    worn_count: Some(4),
                    ..ClosetItemChanges::default()
                },
            },
            2,
        );

        let item = profile.closet_item("c1").unwrap();
        assert_eq!(item.color, "green");
        assert_eq!(item.worn_count, 4);
        assert_eq!(item.date_added, 1);
    }

    #[test]
    fn outfits_dedup_by_set_equality() {
        let mut profile = UserProfile::new("u", 0);
        profile.apply(&Mutation::SaveOutfit(outfit(&["a", "b"])), 1);
        profile.apply(&Mutation::SaveOutfit(outfit(&["b", "a"])), 2);
        assert_eq!(profile.feedback.saved_outfits.len(), 1);

        profile.apply(&Mutation::RemoveOutfit(outfit(&["a", "b"])), 3);
        assert!(profile.feedback.saved_outfits.is_empty());
    }

    #[test]
    fn apply_is_idempotent() {
        let mutations = vec![
            Mutation::AddClosetItem(ClosetItem::new("c1", "shoes", 4)),
            Mutation::AddLikedItem { item_id: "x".into() },
            Mutation::SaveOutfit(outfit(&["c1", "x"])),
            Mutation::UpdatePreferences(
                json!({ "fit": "relaxed" }).as_object().cloned().unwrap(),
            ),
        ];

        let mut once = UserProfile::new("u", 0);
        for m in &mutations {
            once.apply(m, 10);
        }
        let mut twice = once.clone();
        for m in &mutations {
            twice.apply(m, 10);
        }
        assert_eq!(once, twice);
    }

    #[test]
    fn preferences_merge_shallowly() {
        let mut profile = UserProfile::new("u", 0);
        profile
            .preferences
            .insert("palette".into(), json!("earth"));
        profile.apply(
            &Mutation::UpdatePreferences(json!({ "fit": "slim" }).as_object().cloned().unwrap()),
            1,
        );

        assert_eq!(profile.preferences["palette"], json!("earth"));
        assert_eq!(profile.preferences["fit"], json!("slim"));
    }

    #[test]
    fn profile_json_shape() {
        let mut profile = UserProfile::new("user_1", 100);
        profile.closet.push(ClosetItem::new("c1", "tops", 50));
        profile.feedback.like("sku");

        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["userId"], json!("user_1"));
        assert_eq!(value["lastActive"], json!(100));
        assert_eq!(value["closet"][0]["dateAdded"], json!(50));
        assert_eq!(value["feedback"]["likedItems"], json!(["sku"]));

        let sparse: UserProfile = serde_json::from_value(json!({ "userId": "u2" })).unwrap();
        assert_eq!(sparse.last_active, 0);
        assert!(sparse.closet.is_empty());
    }
}
