//! CLI module for the commcards application
//!
//! This module turns parsed subcommands into store actions and renders the
//! resulting snapshots. Input validation (non-empty titles and names, color
//! format, existing ids) happens here, before anything is dispatched.
use std::{fs, path::PathBuf, sync::Arc};

use log::{debug, info};

use crate::{
    filter_cards, group_card_counts, parse_ids, read_import_source, require_text, validate_color,
    Action, AppData, Card, CardFilter, CardStore, CardsError, Commands, GroupCommands, ImportMode,
    KeyValueStore, NewCard, NewGroup, Result,
};

/// Options for the `list` command
#[derive(Debug, Clone)]
pub struct ListCardsOptions {
    pub filter: CardFilter,
    pub limit: usize,
    pub json: bool,
}

/// CLI Application handler - processes CLI commands against the card store
pub struct App<S> {
    /// The card store, shared with whoever else renders it
    store: Arc<CardStore<S>>,

    /// Whether to display verbose output
    verbose: bool,
}

impl<S: KeyValueStore> App<S> {
    /// Create a new CLI application around an initialized store
    pub fn new(store: Arc<CardStore<S>>, verbose: bool) -> Self {
        Self { store, verbose }
    }

    /// Run the CLI application with the given command
    pub async fn run(&self, command: Commands) -> Result<()> {
        let state = self.store.state();
        if let Some(notice) = &state.load_error {
            eprintln!(
                "{} stored data could not be read, starting empty ({})",
                console::style("Notice:").yellow(),
                notice
            );
        }

        match command {
            Commands::Add {
                title,
                text,
                image,
                groups,
                favorite,
            } => self.add_card(title, text, image, groups, favorite)?,

            Commands::Edit {
                id,
                title,
                text,
                image,
                groups,
                clear_media,
            } => self.edit_card(&id, title, text, image, groups, clear_media)?,

            Commands::Delete { id } => {
                self.require_card(&id)?;
                self.store.dispatch(Action::DeleteCard(id.clone()));
                println!("Card {} deleted", id);
            }

            Commands::Favorite { id } => {
                self.require_card(&id)?;
                let snapshot = self.store.dispatch(Action::ToggleFavorite(id.clone()));
                let favorite = snapshot.card(&id).is_some_and(|card| card.favorite);
                println!(
                    "Card {} is {}",
                    id,
                    if favorite {
                        "now a favorite"
                    } else {
                        "no longer a favorite"
                    }
                );
            }

            Commands::Show { id, json } => {
                let card = self.require_card(&id)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&card)?);
                } else {
                    self.display_cards_text(&self.store.snapshot(), &[&card], true);
                }
            }

            Commands::List {
                group,
                favorites,
                query,
                sort,
                limit,
                json,
            } => self.list_cards(ListCardsOptions {
                filter: CardFilter {
                    query,
                    group_id: group,
                    favorites_only: favorites,
                    sort,
                },
                limit,
                json,
            })?,

            Commands::Group(command) => self.handle_group(command)?,

            Commands::Export { output } => self.handle_export(output)?,

            Commands::Import { source, mode } => self.handle_import(source, mode)?,

            Commands::Reset { confirm } => {
                if confirm != "RESET" {
                    return Err(CardsError::InvalidInput {
                        message: "Type --confirm RESET to delete all cards and groups".to_string(),
                    });
                }
                self.store.dispatch(Action::Reset);
                println!("All cards and groups deleted");
            }
        }

        Ok(())
    }

    fn require_card(&self, id: &str) -> Result<Card> {
        self.store
            .snapshot()
            .card(id)
            .cloned()
            .ok_or_else(|| CardsError::CardNotFound { id: id.to_string() })
    }

    /// Makes sure every referenced group exists before a card points at it
    fn require_groups(&self, group_ids: &[String]) -> Result<()> {
        let snapshot = self.store.snapshot();
        match group_ids.iter().find(|id| snapshot.group(id).is_none()) {
            Some(missing) => Err(CardsError::GroupNotFound {
                id: missing.clone(),
            }),
            None => Ok(()),
        }
    }

    fn add_card(
        &self,
        title: String,
        text: Option<String>,
        image: Option<String>,
        groups: Option<String>,
        favorite: bool,
    ) -> Result<()> {
        let title = require_text("Title", &title)?;
        let group_ids = parse_ids(groups);
        self.require_groups(&group_ids)?;

        let before = self.store.snapshot().cards.len();
        let snapshot = self.store.dispatch(Action::AddCard(NewCard {
            id: None,
            title,
            text: text.filter(|t| !t.trim().is_empty()),
            image_uri: image,
            group_ids,
            favorite,
        }));

        match snapshot.cards.get(before) {
            Some(card) => println!("Card created with ID: {}", card.id),
            None => {
                return Err(CardsError::ApplicationError {
                    message: "Card was not created".to_string(),
                })
            }
        }
        Ok(())
    }

    fn edit_card(
        &self,
        id: &str,
        title: Option<String>,
        text: Option<String>,
        image: Option<String>,
        groups: Option<String>,
        clear_media: bool,
    ) -> Result<()> {
        let mut card = self.require_card(id)?;

        if clear_media {
            card.text = None;
            card.image_uri = None;
        }
        if let Some(title) = title {
            card.title = require_text("Title", &title)?;
        }
        if let Some(text) = text {
            card.text = Some(text).filter(|t| !t.trim().is_empty());
        }
        if let Some(image) = image {
            card.image_uri = Some(image);
        }
        if groups.is_some() {
            let group_ids = parse_ids(groups);
            self.require_groups(&group_ids)?;
            card.group_ids = group_ids;
        }

        self.store.dispatch(Action::UpdateCard(card));
        println!("Card {} updated", id);
        Ok(())
    }

    /// List cards according to provided filters and options
    fn list_cards(&self, options: ListCardsOptions) -> Result<()> {
        if let Some(group_id) = &options.filter.group_id {
            self.require_groups(std::slice::from_ref(group_id))?;
        }

        let snapshot = self.store.snapshot();
        let mut cards = filter_cards(&snapshot, &options.filter);
        if options.limit > 0 && cards.len() > options.limit {
            cards.truncate(options.limit);
        }
        debug!("Listing {} cards", cards.len());

        if options.json {
            println!("{}", serde_json::to_string_pretty(&cards)?);
            return Ok(());
        }

        if cards.is_empty() {
            println!("No cards found matching the criteria.");
            return Ok(());
        }

        self.display_cards_text(&snapshot, &cards, self.verbose);
        println!(
            "\nFound {} card{}",
            cards.len(),
            if cards.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }

    /// Display cards in text format
    fn display_cards_text(&self, data: &AppData, cards: &[&Card], detailed: bool) {
        // Use terminal width for formatting if available
        let term_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);

        for (i, card) in cards.iter().enumerate() {
            if i > 0 {
                println!("{}", "-".repeat(term_width.min(50)));
            }

            let star = if card.favorite { "★ " } else { "" };
            println!("ID: {} | Updated: {}", card.id, card.updated_at);
            println!("Title: {}{}", star, console::style(&card.title).bold());

            if !card.group_ids.is_empty() {
                let groups = card
                    .group_ids
                    .iter()
                    .map(|id| {
                        data.group(id)
                            .map(|group| group.name.clone())
                            .unwrap_or_else(|| id.clone())
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("Groups: {}", console::style(groups).cyan());
            }

            if let Some(image) = &card.image_uri {
                println!("Image: {}", image);
            }

            if let Some(text) = &card.text {
                if detailed {
                    println!("\n{}", text);
                } else {
                    let preview = text_preview(text, 100);
                    if !preview.is_empty() {
                        println!("\n{}", preview);
                    }
                }
            }
        }
    }

    fn handle_group(&self, command: GroupCommands) -> Result<()> {
        match command {
            GroupCommands::Add { name, color } => {
                let name = require_text("Name", &name)?;
                let color = color.as_deref().map(validate_color).transpose()?;

                let before = self.store.snapshot().groups.len();
                let snapshot = self.store.dispatch(Action::AddGroup(NewGroup {
                    id: None,
                    name,
                    color,
                }));
                if let Some(group) = snapshot.groups.get(before) {
                    println!("Group created with ID: {}", group.id);
                }
            }

            GroupCommands::Edit { id, name, color } => {
                let mut group = self
                    .store
                    .snapshot()
                    .group(&id)
                    .cloned()
                    .ok_or_else(|| CardsError::GroupNotFound { id: id.clone() })?;

                if let Some(name) = name {
                    group.name = require_text("Name", &name)?;
                }
                if let Some(color) = color {
                    group.color = Some(validate_color(&color)?);
                }

                self.store.dispatch(Action::UpdateGroup(group));
                println!("Group {} updated", id);
            }

            GroupCommands::Delete { id } => {
                self.require_groups(std::slice::from_ref(&id))?;
                self.store.dispatch(Action::DeleteGroup(id.clone()));
                println!("Group {} deleted; its cards were kept", id);
            }

            GroupCommands::List => {
                let snapshot = self.store.snapshot();
                if snapshot.groups.is_empty() {
                    println!("No groups yet.");
                    return Ok(());
                }

                let counts = group_card_counts(&snapshot);
                for group in &snapshot.groups {
                    let count = counts.get(group.id.as_str()).copied().unwrap_or(0);
                    println!(
                        "{} | {} | {} | {} card{}",
                        group.id,
                        console::style(&group.name).bold(),
                        group.color.as_deref().unwrap_or("-"),
                        count,
                        if count == 1 { "" } else { "s" }
                    );
                }
            }
        }

        Ok(())
    }

    fn handle_export(&self, output: Option<PathBuf>) -> Result<()> {
        let json = self.store.export_json()?;

        match output {
            Some(path) => {
                fs::write(&path, json)?;
                info!("Exported data to {}", path.display());
                println!("Exported to {}", path.display());
            }
            None => println!("{}", json),
        }
        Ok(())
    }

    fn handle_import(&self, source: PathBuf, mode: ImportMode) -> Result<()> {
        let text = read_import_source(&source)?;

        match self.store.import_json(&text, mode) {
            Ok(summary) => {
                println!(
                    "Imported {} cards and {} groups ({}). Now {} cards, {} groups.",
                    summary.cards_in_payload,
                    summary.groups_in_payload,
                    match summary.mode {
                        ImportMode::Merge => "merged",
                        ImportMode::Replace => "replaced",
                    },
                    summary.total_cards,
                    summary.total_groups
                );
                Ok(())
            }
            Err(e) if e.is_import_rejection() => {
                eprintln!("{} {}", console::style("Import rejected:").red().bold(), e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

/// First non-empty line of `text`, cut at `max_chars`
fn text_preview(text: &str, max_chars: usize) -> String {
    let first_line = text
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("");

    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
