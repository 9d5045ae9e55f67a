//! Queued operations.

use crate::error::{ProtocolError, ProtocolResult};
use crate::profile::{ClosetItem, Outfit};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Returns the current wall-clock time in epoch milliseconds.
pub fn current_timestamp() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or_default()
}

/// Kind of a queued operation.
///
/// The set is closed: every kind maps to exactly one remote endpoint and
/// one [`Mutation`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// A new item was added to the closet.
    AddClosetItem,
    /// An item was removed from the closet.
    RemoveClosetItem,
    /// Fields of a closet item changed.
    UpdateClosetItem,
    /// A closet item was (un)marked as favorite.
    ToggleFavorite,
    /// Style preferences changed.
    UpdatePreferences,
    /// The style quiz was submitted.
    SubmitQuiz,
    /// An item was liked.
    AddLikedItem,
    /// A like was withdrawn.
    RemoveLikedItem,
    /// An item was disliked.
    AddDislikedItem,
    /// A dislike was withdrawn.
    RemoveDislikedItem,
    /// An outfit was saved.
    SaveOutfit,
    /// A saved outfit was removed.
    RemoveOutfit,
}

impl OperationKind {
    /// All kinds, in declaration order.
    pub const ALL: [OperationKind; 12] = [
        OperationKind::AddClosetItem,
        OperationKind::RemoveClosetItem,
        OperationKind::UpdateClosetItem,
        OperationKind::ToggleFavorite,
        OperationKind::UpdatePreferences,
        OperationKind::SubmitQuiz,
        OperationKind::AddLikedItem,
        OperationKind::RemoveLikedItem,
        OperationKind::AddDislikedItem,
        OperationKind::RemoveDislikedItem,
        OperationKind::SaveOutfit,
        OperationKind::RemoveOutfit,
    ];

    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::AddClosetItem => "ADD_CLOSET_ITEM",
            OperationKind::RemoveClosetItem => "REMOVE_CLOSET_ITEM",
            OperationKind::UpdateClosetItem => "UPDATE_CLOSET_ITEM",
            OperationKind::ToggleFavorite => "TOGGLE_FAVORITE",
            OperationKind::UpdatePreferences => "UPDATE_PREFERENCES",
            OperationKind::SubmitQuiz => "SUBMIT_QUIZ",
            OperationKind::AddLikedItem => "ADD_LIKED_ITEM",
            OperationKind::RemoveLikedItem => "REMOVE_LIKED_ITEM",
            OperationKind::AddDislikedItem => "ADD_DISLIKED_ITEM",
            OperationKind::RemoveDislikedItem => "REMOVE_DISLIKED_ITEM",
            OperationKind::SaveOutfit => "SAVE_OUTFIT",
            OperationKind::RemoveOutfit => "REMOVE_OUTFIT",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ProtocolError::UnknownKind(s.to_string()))
    }
}

/// Which feedback list a like/dislike withdrawal targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackList {
    /// The liked items.
    Liked,
    /// The disliked items.
    Disliked,
}

/// Partial update of a closet item. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosetItemChanges {
    /// New category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// New subcategory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    /// New color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// New brand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// New size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Replacement tag list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// New wear count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worn_count: Option<u32>,
    /// New last-worn time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_worn: Option<Timestamp>,
}

impl ClosetItemChanges {
    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        *self == ClosetItemChanges::default()
    }
}

/// A typed user-state change.
///
/// `Mutation` is the decoded form of an [`Operation`]'s `kind` + `payload`.
/// Matching on it is exhaustive, so adding a kind is a compile-time change
/// everywhere operations are interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Add (or replace) a closet item.
    AddClosetItem(ClosetItem),
    /// Remove a closet item.
    RemoveClosetItem {
        /// Item to remove.
        item_id: String,
    },
    /// Update fields of a closet item.
    UpdateClosetItem {
        /// Item to update.
        item_id: String,
        /// Fields to change.
        changes: ClosetItemChanges,
    },
    /// Set the favorite flag of a closet item.
    ToggleFavorite {
        /// Item to flag.
        item_id: String,
        /// New favorite state.
        favorite: bool,
    },
    /// Shallow-merge keys into the style preferences.
    UpdatePreferences(Map<String, Value>),
    /// Replace the style quiz answers.
    SubmitQuiz(Value),
    /// Like an item.
    AddLikedItem {
        /// Item id.
        item_id: String,
    },
    /// Withdraw a like.
    RemoveLikedItem {
        /// Item id.
        item_id: String,
    },
    /// Dislike an item.
    AddDislikedItem {
        /// Item id.
        item_id: String,
    },
    /// Withdraw a dislike.
    RemoveDislikedItem {
        /// Item id.
        item_id: String,
    },
    /// Save an outfit.
    SaveOutfit(Outfit),
    /// Remove a saved outfit.
    RemoveOutfit(Outfit),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemRef {
    item_id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePayload {
    item_id: String,
    changes: ClosetItemChanges,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FavoritePayload {
    item_id: String,
    favorite: bool,
}

#[derive(Serialize, Deserialize)]
struct PreferencesPayload {
    preferences: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct QuizPayload {
    answers: Value,
}

#[derive(Serialize, Deserialize)]
struct OutfitPayload {
    items: Outfit,
}

impl Mutation {
    /// Returns the operation kind of this mutation.
    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::AddClosetItem(_) => OperationKind::AddClosetItem,
            Mutation::RemoveClosetItem { .. } => OperationKind::RemoveClosetItem,
            Mutation::UpdateClosetItem { .. } => OperationKind::UpdateClosetItem,
            Mutation::ToggleFavorite { .. } => OperationKind::ToggleFavorite,
            Mutation::UpdatePreferences(_) => OperationKind::UpdatePreferences,
            Mutation::SubmitQuiz(_) => OperationKind::SubmitQuiz,
            Mutation::AddLikedItem { .. } => OperationKind::AddLikedItem,
            Mutation::RemoveLikedItem { .. } => OperationKind::RemoveLikedItem,
            Mutation::AddDislikedItem { .. } => OperationKind::AddDislikedItem,
            Mutation::RemoveDislikedItem { .. } => OperationKind::RemoveDislikedItem,
            Mutation::SaveOutfit(_) => OperationKind::SaveOutfit,
            Mutation::RemoveOutfit(_) => OperationKind::RemoveOutfit,
        }
    }

    /// Encodes the mutation into its wire payload.
    pub fn to_payload(&self) -> ProtocolResult<Value> {
        let value = match self {
            Mutation::AddClosetItem(item) => serde_json::to_value(item)?,
            Mutation::RemoveClosetItem { item_id }
            | Mutation::AddLikedItem { item_id }
            | Mutation::RemoveLikedItem { item_id }
            | Mutation::AddDislikedItem { item_id }
            | Mutation::RemoveDislikedItem { item_id } => serde_json::to_value(ItemRef {
                item_id: item_id.clone(),
            })?,
            Mutation::UpdateClosetItem { item_id, changes } => {
                serde_json::to_value(UpdatePayload {
                    item_id: item_id.clone(),
                    changes: changes.clone(),
                })?
            }
            Mutation::ToggleFavorite { item_id, favorite } => {
                serde_json::to_value(FavoritePayload {
                    item_id: item_id.clone(),
                    favorite: *favorite,
                })?
            }
            Mutation::UpdatePreferences(preferences) => {
                serde_json::to_value(PreferencesPayload {
                    preferences: preferences.clone(),
                })?
            }
            Mutation::SubmitQuiz(answers) => serde_json::to_value(QuizPayload {
                answers: answers.clone(),
            })?,
            Mutation::SaveOutfit(items) | Mutation::RemoveOutfit(items) => {
                serde_json::to_value(OutfitPayload {
                    items: items.clone(),
                })?
            }
        };
        Ok(value)
    }

    /// Decodes a payload of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPayload`] if the payload does not have
    /// the shape the kind requires.
    pub fn decode(kind: OperationKind, payload: &Value) -> ProtocolResult<Self> {
        fn parse<T: serde::de::DeserializeOwned>(
            kind: OperationKind,
            payload: &Value,
        ) -> ProtocolResult<T> {
            T::deserialize(payload).map_err(|e| ProtocolError::invalid_payload(kind, e.to_string()))
        }

        let mutation = match kind {
            OperationKind::AddClosetItem => Mutation::AddClosetItem(parse(kind, payload)?),
            OperationKind::RemoveClosetItem => {
                let r: ItemRef = parse(kind, payload)?;
                Mutation::RemoveClosetItem { item_id: r.item_id }
            }
            OperationKind::UpdateClosetItem => {
                let p: UpdatePayload = parse(kind, payload)?;
                Mutation::UpdateClosetItem {
                    item_id: p.item_id,
                    changes: p.changes,
                }
            }
            OperationKind::ToggleFavorite => {
                let p: FavoritePayload = parse(kind, payload)?;
                Mutation::ToggleFavorite {
                    item_id: p.item_id,
                    favorite: p.favorite,
                }
            }
            OperationKind::UpdatePreferences => {
                let p: PreferencesPayload = parse(kind, payload)?;
                Mutation::UpdatePreferences(p.preferences)
            }
            OperationKind::SubmitQuiz => {
                let p: QuizPayload = parse(kind, payload)?;
                Mutation::SubmitQuiz(p.answers)
            }
            OperationKind::AddLikedItem => {
                let r: ItemRef = parse(kind, payload)?;
                Mutation::AddLikedItem { item_id: r.item_id }
            }
            OperationKind::RemoveLikedItem => {
                let r: ItemRef = parse(kind, payload)?;
                Mutation::RemoveLikedItem { item_id: r.item_id }
            }
            OperationKind::AddDislikedItem => {
                let r: ItemRef = parse(kind, payload)?;
                Mutation::AddDislikedItem { item_id: r.item_id }
            }
            OperationKind::RemoveDislikedItem => {
                let r: ItemRef = parse(kind, payload)?;
                Mutation::RemoveDislikedItem { item_id: r.item_id }
            }
            OperationKind::SaveOutfit => {
                let p: OutfitPayload = parse(kind, payload)?;
                Mutation::SaveOutfit(p.items)
            }
            OperationKind::RemoveOutfit => {
                let p: OutfitPayload = parse(kind, payload)?;
                Mutation::RemoveOutfit(p.items)
            }
        };
        Ok(mutation)
    }
}

/// Unique operation identifier: `"{timestamp}-{random suffix}"`.
///
/// Ids generated at increasing timestamps sort by arrival.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Generates a new id for an operation created at `timestamp`.
    pub fn generate(timestamp: Timestamp) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{timestamp:013}-{}", &suffix[..8]))
    }

    /// Wraps an existing id string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single queued mutation intended for the remote profile service.
///
/// An operation is immutable once created except for its delivery
/// bookkeeping (`retry_count`, `resolved`, `abandoned`), which only the
/// [`crate::OperationLog`] changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    id: OperationId,
    timestamp: Timestamp,
    user_id: String,
    kind: OperationKind,
    payload: Value,
    #[serde(default)]
    retry_count: u32,
    #[serde(default)]
    resolved: bool,
    #[serde(default)]
    abandoned: bool,
}

impl Operation {
    /// Creates a new unresolved operation for a mutation.
    pub fn new(
        mutation: &Mutation,
        user_id: impl Into<String>,
        timestamp: Timestamp,
    ) -> ProtocolResult<Self> {
        Ok(Self {
            id: OperationId::generate(timestamp),
            timestamp,
            user_id: user_id.into(),
            kind: mutation.kind(),
            payload: mutation.to_payload()?,
            retry_count: 0,
            resolved: false,
            abandoned: false,
        })
    }

    /// Creates an operation from a raw kind and payload.
    ///
    /// The payload is validated against the kind before it is accepted.
    pub fn from_raw(
        kind: OperationKind,
        payload: Value,
        user_id: impl Into<String>,
        timestamp: Timestamp,
    ) -> ProtocolResult<Self> {
        Mutation::decode(kind, &payload)?;
        Ok(Self {
            id: OperationId::generate(timestamp),
            timestamp,
            user_id: user_id.into(),
            kind,
            payload,
            retry_count: 0,
            resolved: false,
            abandoned: false,
        })
    }

    /// Returns the operation id.
    pub fn id(&self) -> &OperationId {
        &self.id
    }

    /// Returns the creation timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Returns the owning user id.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the operation kind.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Returns the raw payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the number of failed delivery attempts.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns true once the operation needs no further delivery.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Returns true if the operation was given up after too many failures.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Decodes the typed mutation.
    pub fn mutation(&self) -> ProtocolResult<Mutation> {
        Mutation::decode(self.kind, &self.payload)
    }

    pub(crate) fn resolve(&mut self) {
        self.resolved = true;
    }

    pub(crate) fn record_failure(&mut self) -> u32 {
        self.retry_count = self.retry_count.saturating_add(1);
        self.retry_count
    }

    pub(crate) fn abandon(&mut self) {
        self.resolved = true;
        self.abandoned = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_wire_names() {
        let encoded = serde_json::to_value(OperationKind::AddClosetItem).unwrap();
        assert_eq!(encoded, json!("ADD_CLOSET_ITEM"));

        for kind in OperationKind::ALL {
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, json!(kind.as_str()));
        }
    }

    #[test]
    fn kind_from_str_is_lenient() {
        assert_eq!(
            "save-outfit".parse::<OperationKind>().unwrap(),
            OperationKind::SaveOutfit
        );
        assert_eq!(
            "TOGGLE_FAVORITE".parse::<OperationKind>().unwrap(),
            OperationKind::ToggleFavorite
        );
        assert!("EXPLODE".parse::<OperationKind>().is_err());
    }

    #[test]
    fn mutation_payload_shapes() {
        let like = Mutation::AddLikedItem {
            item_id: "sku-1".into(),
        };
        assert_eq!(like.to_payload().unwrap(), json!({ "itemId": "sku-1" }));

        let favorite = Mutation::ToggleFavorite {
            item_id: "c1".into(),
            favorite: true,
        };
        assert_eq!(
            favorite.to_payload().unwrap(),
            json!({ "itemId": "c1", "favorite": true })
        );
    }

    #[test]
    fn mutation_decode_matches_kind() {
        let outfit: Outfit = ["a".to_string(), "b".to_string()].into_iter().collect();
        let mutation = Mutation::SaveOutfit(outfit);
        let payload = mutation.to_payload().unwrap();

        let decoded = Mutation::decode(OperationKind::SaveOutfit, &payload).unwrap();
        assert_eq!(decoded, mutation);
    }

    #[test]
    fn mutation_decode_rejects_wrong_shape() {
        let err = Mutation::decode(OperationKind::RemoveClosetItem, &json!({ "id": 3 }))
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidPayload {
                kind: OperationKind::RemoveClosetItem,
                ..
            }
        ));
    }

    #[test]
    fn operation_ids_sort_by_timestamp() {
        let a = OperationId::generate(999);
        let b = OperationId::generate(1_000);
        assert!(a < b);
        assert!(a.as_str().starts_with("0000000000999-"));
    }

    #[test]
    fn operation_serializes_camel_case() {
        let op = Operation::new(
            &Mutation::RemoveClosetItem {
                item_id: "c9".into(),
            },
            "user_1",
            1_700_000_000_000,
        )
        .unwrap();

        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["userId"], json!("user_1"));
        assert_eq!(value["kind"], json!("REMOVE_CLOSET_ITEM"));
        assert_eq!(value["retryCount"], json!(0));
        assert_eq!(value["resolved"], json!(false));
    }

    #[test]
    fn operation_from_raw_validates() {
        let ok = Operation::from_raw(
            OperationKind::AddDislikedItem,
            json!({ "itemId": "x" }),
            "u",
            1,
        );
        assert!(ok.is_ok());

        let bad = Operation::from_raw(OperationKind::SubmitQuiz, json!("nope"), "u", 1);
        assert!(bad.is_err());
    }

    #[test]
    fn changes_is_empty() {
        assert!(ClosetItemChanges::default().is_empty());
        let changes = ClosetItemChanges {
            color: Some("navy".into()),
            ..ClosetItemChanges::default()
        };
        assert!(!changes.is_empty());
    }
}
