//! Read-only views over a snapshot: search, filtering and per-group counts.
use std::collections::HashMap;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use log::{debug, trace};

use crate::{AppData, Card, SortOrder};

/// Which cards to show and in what order
#[derive(Debug, Clone, Default)]
pub struct CardFilter {
    /// Fuzzy search over title and text; ranks results when present
    pub query: Option<String>,
    /// Only cards that are members of this group
    pub group_id: Option<String>,
    pub favorites_only: bool,
    /// Ordering used when there is no query
    pub sort: SortOrder,
}

impl CardFilter {
    fn admits(&self, card: &Card) -> bool {
        if self.favorites_only && !card.favorite {
            return false;
        }
        match &self.group_id {
            Some(group_id) => card.group_ids.iter().any(|id| id == group_id),
            None => true,
        }
    }
}

/// Applies `filter` to the cards of `data`.
pub fn filter_cards<'a>(data: &'a AppData, filter: &CardFilter) -> Vec<&'a Card> {
    let candidates = data.cards.iter().filter(|card| filter.admits(card));

    let query = filter
        .query
        .as_deref()
        .map(str::trim)
        .filter(|query| !query.is_empty());

    let Some(query) = query else {
        let mut cards: Vec<&Card> = candidates.collect();
        sort_cards(&mut cards, filter.sort);
        return cards;
    };

    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, &Card)> = candidates
        .filter_map(|card| {
            // Title matches are weighted more heavily
            let title_score = matcher.fuzzy_match(&card.title, query).unwrap_or(0);
            let text_score = card
                .text
                .as_deref()
                .and_then(|text| matcher.fuzzy_match(text, query))
                .unwrap_or(0);
            let score = title_score * 2 + text_score;
            trace!("Card {} scored {} for '{}'", card.id, score, query);
            (score > 0).then_some((score, card))
        })
        .collect();

    // Stable sort keeps insertion order between equal scores
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    debug!("Search '{}' matched {} cards", query, scored.len());

    scored.into_iter().map(|(_, card)| card).collect()
}

fn sort_cards(cards: &mut [&Card], order: SortOrder) {
    match order {
        SortOrder::Updated => cards.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
        SortOrder::Created => cards.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::Title => cards.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then_with(|| a.title.cmp(&b.title))
        }),
    }
}

/// Number of cards in each group, keyed by group id. Groups without cards map to zero.
pub fn group_card_counts(data: &AppData) -> HashMap<&str, usize> {
    let mut counts: HashMap<&str, usize> = data
        .groups
        .iter()
        .map(|group| (group.id.as_str(), 0))
        .collect();

    for card in &data.cards {
        for group_id in &card.group_ids {
            if let Some(count) = counts.get_mut(group_id.as_str()) {
                *count += 1;
            }
        }
    }

    counts
}
