//! Shared types for the commcards application.
//!
//! This module contains the action protocol accepted by the store, the small
//! result/summary records passed across its boundary, and the CLI subcommands.
use std::{path::PathBuf, sync::Arc};

use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::{AppData, Card, CardsError, Group, NewCard, NewGroup};

/// A specialized Result type for commcards operations.
pub type Result<T> = std::result::Result<T, CardsError>;

/// How imported data is reconciled with the current aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum ImportMode {
    /// Union by id, imported records win on collision
    Merge,
    /// Discard the current aggregate and adopt the imported one
    Replace,
}

/// Every mutation the store accepts. There is no other way to change state.
///
/// Actions are tagged on the wire as `{"type": "...", "payload": ...}` so a
/// front end can submit them as JSON; an unrecognized `type` decodes to
/// `Unknown` and is ignored by the reducer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Action {
    Load(AppData),
    AddCard(NewCard),
    UpdateCard(Card),
    DeleteCard(String),
    ToggleFavorite(String),
    AddGroup(NewGroup),
    UpdateGroup(Group),
    DeleteGroup(String),
    Import { data: AppData, mode: ImportMode },
    Reset,
    #[serde(other)]
    Unknown,
}

impl Action {
    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Load(_) => "load",
            Action::AddCard(_) => "addCard",
            Action::UpdateCard(_) => "updateCard",
            Action::DeleteCard(_) => "deleteCard",
            Action::ToggleFavorite(_) => "toggleFavorite",
            Action::AddGroup(_) => "addGroup",
            Action::UpdateGroup(_) => "updateGroup",
            Action::DeleteGroup(_) => "deleteGroup",
            Action::Import { .. } => "import",
            Action::Reset => "reset",
            Action::Unknown => "unknown",
        }
    }
}

/// Result of reading the persisted blob at start-up
#[derive(Debug)]
pub struct LoadOutcome {
    /// What was read, or the empty aggregate on any failure
    pub data: AppData,
    /// Why the empty fallback was used, if it was a failure and not just a first run
    pub error: Option<CardsError>,
}

/// What the presentation layer renders from
#[derive(Debug, Clone)]
pub struct StateView {
    pub data: Arc<AppData>,
    /// True until the initial load has resolved
    pub loading: bool,
    /// Set when the initial load fell back to empty because of a failure
    pub load_error: Option<String>,
}

/// Summary of an accepted import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub mode: ImportMode,
    /// Cards and groups contained in the payload
    pub cards_in_payload: usize,
    pub groups_in_payload: usize,
    /// Totals after the import was applied
    pub total_cards: usize,
    pub total_groups: usize,
}

/// Ordering applied to listed cards when no search query ranks them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SortOrder {
    /// Most recently updated first
    #[default]
    Updated,
    /// Most recently created first
    Created,
    /// Alphabetical by title
    Title,
}

/// Available subcommands for the commcards application
#[derive(Subcommand)]
pub enum Commands {
    /// Create a new card
    Add {
        /// Title of the card
        #[clap(short = 'T', long)]
        title: String,

        /// Free text shown on the card
        #[clap(short, long)]
        text: Option<String>,

        /// Image URI to attach
        #[clap(short, long)]
        image: Option<String>,

        /// Group IDs to put the card in (comma-separated)
        #[clap(short, long)]
        groups: Option<String>,

        /// Mark the card as a favorite
        #[clap(short, long)]
        favorite: bool,
    },

    /// Edit an existing card
    Edit {
        /// ID of the card to edit
        id: String,

        /// New title for the card
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// New text for the card
        #[clap(short, long)]
        text: Option<String>,

        /// New image URI
        #[clap(short, long)]
        image: Option<String>,

        /// Replace group membership (comma-separated group IDs)
        #[clap(short, long)]
        groups: Option<String>,

        /// Remove text and image from the card
        #[clap(long)]
        clear_media: bool,
    },

    /// Delete a card by ID
    Delete {
        /// ID of the card to delete
        id: String,
    },

    /// Toggle the favorite flag of a card
    Favorite {
        /// ID of the card
        id: String,
    },

    /// Show a single card
    Show {
        /// ID of the card to show
        id: String,

        /// Format output as raw JSON
        #[clap(short, long)]
        json: bool,
    },

    /// List cards with optional filtering
    List {
        /// Only cards in this group
        #[clap(short, long)]
        group: Option<String>,

        /// Only favorite cards
        #[clap(short, long)]
        favorites: bool,

        /// Fuzzy search over title and text
        #[clap(short, long)]
        query: Option<String>,

        /// Ordering when no query is given
        #[clap(short, long, value_enum, default_value_t = SortOrder::Updated)]
        sort: SortOrder,

        /// Limit the number of cards returned (0 means no limit)
        #[clap(short = 'n', long, default_value_t = 0)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Group operations
    #[clap(subcommand)]
    Group(GroupCommands),

    /// Export all data as JSON
    Export {
        /// File to write; stdout when omitted
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Import data from a JSON export
    Import {
        /// File to read, or `-` for stdin
        source: PathBuf,

        /// Merge with existing data or replace it
        #[clap(short, long, value_enum, default_value_t = ImportMode::Merge)]
        mode: ImportMode,
    },

    /// Delete all cards and groups
    Reset {
        /// Must be the word RESET
        #[clap(long)]
        confirm: String,
    },
}

/// Group subcommands
#[derive(Subcommand)]
pub enum GroupCommands {
    /// Create a new group
    Add {
        /// Name of the group
        name: String,

        /// Color as #RRGGBB
        #[clap(short, long)]
        color: Option<String>,
    },

    /// Rename or recolor a group
    Edit {
        /// ID of the group to edit
        id: String,

        /// New name
        #[clap(short, long)]
        name: Option<String>,

        /// New color as #RRGGBB
        #[clap(short, long)]
        color: Option<String>,
    },

    /// Delete a group; its cards are kept and lose the membership
    Delete {
        /// ID of the group to delete
        id: String,
    },

    /// List all groups
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_actions_decode_from_tagged_json() {
        let action: Action =
            serde_json::from_value(json!({"type": "deleteCard", "payload": "c1"})).unwrap();
        assert_eq!(action, Action::DeleteCard("c1".to_string()));

        let action: Action = serde_json::from_value(json!({
            "type": "import",
            "payload": {"data": {"cards": [], "groups": []}, "mode": "replace"}
        }))
        .unwrap();
        assert_eq!(
            action,
            Action::Import {
                data: AppData::empty(),
                mode: ImportMode::Replace
            }
        );
    }

    #[test]
    fn test_unrecognized_action_type_decodes_to_unknown() {
        let action: Action = serde_json::from_value(json!({"type": "archiveCard"})).unwrap();
        assert_eq!(action, Action::Unknown);
        assert_eq!(action.kind(), "unknown");
    }
}
