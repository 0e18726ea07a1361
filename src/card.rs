//! Core data structures for the commcards application.
//!
//! This module contains the entity records (`Card`, `Group`) and the root
//! aggregate (`AppData`) that is persisted, exported and imported as a single
//! JSON blob.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single communication card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Unique identifier, never reassigned after creation
    pub id: String,
    /// Card title, the only required field
    pub title: String,
    /// Optional free text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Opaque image reference handed over by the picker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    /// Groups this card belongs to, in insertion order
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default)]
    pub favorite: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A user-defined group of cards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Unique identifier, never reassigned after creation
    pub id: String,
    /// Display name
    pub name: String,
    /// `#RRGGBB`, checked by the caller before it gets here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for a card that does not exist yet.
///
/// `id` is normally left empty and assigned by the reducer; timestamps are
/// always assigned by the reducer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default)]
    pub favorite: bool,
}

impl NewCard {
    /// Creates a draft with just a title
    pub fn titled(title: impl Into<String>) -> Self {
        NewCard {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Fields for a group that does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl NewGroup {
    /// Creates a draft with just a name
    pub fn named(name: impl Into<String>) -> Self {
        NewGroup {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Root aggregate holding every card and group.
///
/// Always replaced as a unit on load, import and reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppData {
    pub cards: Vec<Card>,
    pub groups: Vec<Group>,
}

impl AppData {
    /// The canonical `{cards: [], groups: []}` aggregate
    pub fn empty() -> Self {
        AppData::default()
    }

    pub fn card(&self, id: &str) -> Option<&Card> {
        self.cards.iter().find(|card| card.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|group| group.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty() && self.groups.is_empty()
    }
}

/// Minimal structural check applied to anything about to become the aggregate:
/// an object carrying a `cards` array and a `groups` array.
pub fn is_well_formed(value: &Value) -> bool {
    match value.as_object() {
        Some(object) => {
            object.get("cards").is_some_and(Value::is_array)
                && object.get("groups").is_some_and(Value::is_array)
        }
        None => false,
    }
}

/// Formats an instant the way every freshly stamped entity stores it.
///
/// Millisecond precision with a `Z` suffix keeps the strings lexicographically
/// sortable.
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_well_formed_requires_both_arrays() {
        assert!(is_well_formed(&json!({"cards": [], "groups": []})));
        assert!(is_well_formed(
            &json!({"cards": [{"anything": 1}], "groups": [], "extra": true})
        ));
        assert!(!is_well_formed(&json!({"cards": []})));
        assert!(!is_well_formed(&json!({"cards": {}, "groups": []})));
        assert!(!is_well_formed(&json!([])));
        assert!(!is_well_formed(&json!(null)));
    }

    #[test]
    fn test_card_uses_camel_case_and_defaults() {
        let card: Card = serde_json::from_value(json!({
            "id": "c1",
            "title": "Water",
            "imageUri": "file:///water.png",
            "createdAt": "2024-01-01T00:00:00.000Z",
            "updatedAt": "2024-01-01T00:00:00.000Z"
        }))
        .unwrap();

        assert_eq!(card.image_uri.as_deref(), Some("file:///water.png"));
        assert!(card.group_ids.is_empty());
        assert!(!card.favorite);
        assert_eq!(card.text, None);

        let value = serde_json::to_value(&card).unwrap();
        assert!(value.get("groupIds").is_some());
        assert!(value.get("text").is_none());
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let earlier = format_timestamp(Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap());
        let later = format_timestamp(Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(earlier, "2024-03-09T23:59:59.000Z");
        assert!(earlier < later);
    }
}
