//! The single mutation gateway for the aggregate.
//!
//! `reduce` maps the current snapshot and an action to the next snapshot. It
//! is total over `Action`: malformed targets (unknown ids, duplicate ids on
//! create) leave the state unchanged instead of failing.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use uuid::Uuid;

use crate::{format_timestamp, Action, AppData, Card, Group, ImportMode, NewCard, NewGroup};

/// Applies `action` to `state`, reading the clock once for timestamping.
pub fn reduce(state: &AppData, action: Action) -> AppData {
    reduce_at(state, action, Utc::now())
}

/// Same as [`reduce`] with the current instant supplied by the caller.
pub fn reduce_at(state: &AppData, action: Action, now: DateTime<Utc>) -> AppData {
    let now = format_timestamp(now);
    trace!("Reducing action {}", action.kind());

    match action {
        Action::Load(data) => data,
        Action::AddCard(draft) => add_card(state, draft, &now),
        Action::UpdateCard(card) => update_card(state, card, &now),
        Action::DeleteCard(id) => {
            let mut next = state.clone();
            next.cards.retain(|card| card.id != id);
            next
        }
        Action::ToggleFavorite(id) => {
            let mut next = state.clone();
            if let Some(card) = next.cards.iter_mut().find(|card| card.id == id) {
                card.favorite = !card.favorite;
                card.updated_at = refreshed(&card.updated_at, &now);
            }
            next
        }
        Action::AddGroup(draft) => add_group(state, draft, &now),
        Action::UpdateGroup(group) => update_group(state, group, &now),
        Action::DeleteGroup(id) => delete_group(state, &id, &now),
        Action::Import {
            data,
            mode: ImportMode::Replace,
        } => data,
        Action::Import {
            data,
            mode: ImportMode::Merge,
        } => merge(state, data),
        Action::Reset => AppData::empty(),
        Action::Unknown => {
            debug!("Ignoring unknown action");
            state.clone()
        }
    }
}

/// `updatedAt` never moves backwards, even if the wall clock does.
///
/// Stamps are compared as instants, so offset forms order correctly. A
/// previous stamp that does not parse never holds back the refresh.
fn refreshed(previous: &str, now: &str) -> String {
    let previous_is_later = match (
        DateTime::parse_from_rfc3339(previous),
        DateTime::parse_from_rfc3339(now),
    ) {
        (Ok(previous_at), Ok(now_at)) => previous_at > now_at,
        _ => false,
    };

    if previous_is_later {
        previous.to_string()
    } else {
        now.to_string()
    }
}

fn fresh_id(requested: Option<String>) -> String {
    requested
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn add_card(state: &AppData, draft: NewCard, now: &str) -> AppData {
    let id = fresh_id(draft.id);
    if state.card(&id).is_some() {
        warn!("Ignoring addCard for existing card id {}", id);
        return state.clone();
    }

    let mut next = state.clone();
    next.cards.push(Card {
        id,
        title: draft.title,
        text: draft.text,
        image_uri: draft.image_uri,
        group_ids: draft.group_ids,
        favorite: draft.favorite,
        created_at: now.to_string(),
        updated_at: now.to_string(),
    });
    next
}

fn update_card(state: &AppData, card: Card, now: &str) -> AppData {
    let mut next = state.clone();
    match next.cards.iter_mut().find(|existing| existing.id == card.id) {
        Some(existing) => {
            let created_at = std::mem::take(&mut existing.created_at);
            let updated_at = refreshed(&existing.updated_at, now);
            *existing = Card {
                created_at,
                updated_at,
                ..card
            };
        }
        None => debug!("Ignoring updateCard for unknown card {}", card.id),
    }
    next
}

fn add_group(state: &AppData, draft: NewGroup, now: &str) -> AppData {
    let id = fresh_id(draft.id);
    if state.group(&id).is_some() {
        warn!("Ignoring addGroup for existing group id {}", id);
        return state.clone();
    }

    let mut next = state.clone();
    next.groups.push(Group {
        id,
        name: draft.name,
        color: draft.color,
        created_at: now.to_string(),
        updated_at: now.to_string(),
    });
    next
}

fn update_group(state: &AppData, group: Group, now: &str) -> AppData {
    let mut next = state.clone();
    match next.groups.iter_mut().find(|existing| existing.id == group.id) {
        Some(existing) => {
            let created_at = std::mem::take(&mut existing.created_at);
            let updated_at = refreshed(&existing.updated_at, now);
            *existing = Group {
                created_at,
                updated_at,
                ..group
            };
        }
        None => debug!("Ignoring updateGroup for unknown group {}", group.id),
    }
    next
}

/// Removes the group and prunes its id from every card in the same step.
fn delete_group(state: &AppData, id: &str, now: &str) -> AppData {
    let mut next = state.clone();
    next.groups.retain(|group| group.id != id);

    let mut pruned = 0;
    for card in next.cards.iter_mut() {
        let before = card.group_ids.len();
        card.group_ids.retain(|group_id| group_id != id);
        if card.group_ids.len() != before {
            card.updated_at = refreshed(&card.updated_at, now);
            pruned += 1;
        }
    }

    debug!("Deleted group {} and pruned it from {} cards", id, pruned);
    next
}

/// Union by id. Existing entries keep their position and take the incoming
/// fields verbatim; new ids are appended in the order they were imported.
fn merge(state: &AppData, incoming: AppData) -> AppData {
    AppData {
        cards: merge_by_id(&state.cards, incoming.cards, |card| &card.id),
        groups: merge_by_id(&state.groups, incoming.groups, |group| &group.id),
    }
}

fn merge_by_id<T: Clone>(existing: &[T], incoming: Vec<T>, id_of: fn(&T) -> &String) -> Vec<T> {
    let mut merged = existing.to_vec();
    let mut positions: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(index, item)| (id_of(item).clone(), index))
        .collect();

    for item in incoming {
        let position = positions.get(id_of(&item)).copied();
        match position {
            Some(index) => merged[index] = item,
            None => {
                positions.insert(id_of(&item).clone(), merged.len());
                merged.push(item);
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn card(id: &str, title: &str, updated_at: &str) -> Card {
        Card {
            id: id.to_string(),
            title: title.to_string(),
            text: None,
            image_uri: None,
            group_ids: Vec::new(),
            favorite: false,
            created_at: "T0".to_string(),
            updated_at: updated_at.to_string(),
        }
    }

    fn group(id: &str, name: &str) -> Group {
        Group {
            id: id.to_string(),
            name: name.to_string(),
            color: None,
            created_at: "T0".to_string(),
            updated_at: "T0".to_string(),
        }
    }

    #[test]
    fn test_create_then_delete_card() {
        let state = reduce_at(
            &AppData::empty(),
            Action::AddCard(NewCard::titled("Hello")),
            at(0),
        );

        assert_eq!(state.cards.len(), 1);
        let created = &state.cards[0];
        assert_eq!(created.title, "Hello");
        assert!(!created.favorite);
        assert!(created.group_ids.is_empty());
        assert!(!created.id.is_empty());
        assert_eq!(created.created_at, format_timestamp(at(0)));
        assert_eq!(created.created_at, created.updated_at);

        let state = reduce_at(&state, Action::DeleteCard(created.id.clone()), at(1));
        assert!(state.cards.is_empty());
    }

    #[test]
    fn test_add_card_assigns_distinct_ids() {
        let state = reduce(&AppData::empty(), Action::AddCard(NewCard::titled("A")));
        let state = reduce(&state, Action::AddCard(NewCard::titled("A")));
        assert_eq!(state.cards.len(), 2);
        assert_ne!(state.cards[0].id, state.cards[1].id);
    }

    #[test]
    fn test_add_card_with_existing_id_is_ignored() {
        let mut state = AppData::empty();
        state.cards.push(card("c1", "Original", "T1"));

        let draft = NewCard {
            id: Some("c1".to_string()),
            ..NewCard::titled("Impostor")
        };
        let next = reduce_at(&state, Action::AddCard(draft), at(0));
        assert_eq!(next, state);
    }

    #[test]
    fn test_update_preserves_id_and_created_at() {
        let state = reduce_at(
            &AppData::empty(),
            Action::AddCard(NewCard::titled("Before")),
            at(0),
        );
        let original = state.cards[0].clone();

        let mut edited = original.clone();
        edited.title = "After".to_string();
        edited.created_at = "tampered".to_string();
        edited.updated_at = "tampered".to_string();
        edited.favorite = true;

        let state = reduce_at(&state, Action::UpdateCard(edited), at(30));
        let updated = &state.cards[0];
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.title, "After");
        assert!(updated.favorite);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.updated_at, format_timestamp(at(30)));
    }

    #[test]
    fn test_updated_at_never_moves_backwards() {
        let state = reduce_at(
            &AppData::empty(),
            Action::AddGroup(NewGroup::named("Food")),
            at(100),
        );
        let mut timestamps = vec![state.groups[0].updated_at.clone()];
        let created_at = state.groups[0].created_at.clone();

        let mut state = state;
        // Clock jumps back and forth between updates.
        for offset in [50, 200, 150, 300] {
            let mut edited = state.groups[0].clone();
            edited.name = format!("Food {offset}");
            state = reduce_at(&state, Action::UpdateGroup(edited), at(offset));
            assert_eq!(state.groups[0].created_at, created_at);
            timestamps.push(state.groups[0].updated_at.clone());
        }

        assert!(timestamps.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(
            timestamps.last().unwrap().as_str(),
            format_timestamp(at(300))
        );
    }

    #[test]
    fn test_offset_stamps_compare_as_instants() {
        let mut state = AppData::empty();
        // 12:00Z written with a +02:00 offset, so it sorts after "…T13…Z" as text.
        state
            .cards
            .push(card("c1", "A", "2024-05-01T14:00:00.000+02:00"));
        // 14:00Z, genuinely later than the clock below.
        state
            .cards
            .push(card("c2", "B", "2024-05-01T16:00:00.000+02:00"));

        let mut edited = state.cards[0].clone();
        edited.title = "A2".to_string();
        let next = reduce_at(&state, Action::UpdateCard(edited), at(3600));
        assert_eq!(next.cards[0].updated_at, format_timestamp(at(3600)));

        let next = reduce_at(&next, Action::ToggleFavorite("c2".to_string()), at(3600));
        assert!(next.cards[1].favorite);
        assert_eq!(next.cards[1].updated_at, "2024-05-01T16:00:00.000+02:00");
    }

    #[test]
    fn test_unparseable_stamp_is_replaced_on_update() {
        let mut state = AppData::empty();
        state.cards.push(card("c1", "A", "zzz-not-a-date"));

        let next = reduce_at(&state, Action::ToggleFavorite("c1".to_string()), at(7));
        assert_eq!(next.cards[0].updated_at, format_timestamp(at(7)));
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let mut state = AppData::empty();
        state.cards.push(card("c1", "A", "T1"));

        let next = reduce_at(&state, Action::UpdateCard(card("nope", "B", "T2")), at(0));
        assert_eq!(next, state);
        let next = reduce_at(&state, Action::UpdateGroup(group("nope", "G")), at(0));
        assert_eq!(next, state);
    }

    #[test]
    fn test_delete_missing_card_is_noop() {
        let mut state = AppData::empty();
        state.cards.push(card("c1", "A", "T1"));
        assert_eq!(
            reduce_at(&state, Action::DeleteCard("c2".to_string()), at(0)),
            state
        );
    }

    #[test]
    fn test_group_cascade() {
        let mut state = AppData::empty();
        state.groups.push(group("g1", "Food"));
        let mut c1 = card("c1", "Apple", "T1");
        c1.group_ids = vec!["g1".to_string()];
        state.cards.push(c1);

        let next = reduce_at(&state, Action::DeleteGroup("g1".to_string()), at(5));
        assert!(next.groups.is_empty());
        assert_eq!(next.cards.len(), 1);
        assert!(next.cards[0].group_ids.is_empty());
        assert_eq!(next.cards[0].updated_at, format_timestamp(at(5)));
    }

    #[test]
    fn test_group_delete_only_touches_member_cards() {
        let mut state = AppData::empty();
        state.groups.push(group("g1", "Food"));
        state.groups.push(group("g2", "Drinks"));
        let mut member = card("c1", "Apple", "T1");
        member.group_ids = vec!["g2".to_string(), "g1".to_string(), "g1".to_string()];
        let mut bystander = card("c2", "Water", "T1");
        bystander.group_ids = vec!["g2".to_string()];
        state.cards.push(member);
        state.cards.push(bystander);

        let next = reduce_at(&state, Action::DeleteGroup("g1".to_string()), at(5));

        assert_eq!(next.groups.len(), 1);
        assert_eq!(next.groups[0].id, "g2");
        assert_eq!(next.cards[0].group_ids, vec!["g2".to_string()]);
        assert_eq!(next.cards[0].updated_at, format_timestamp(at(5)));
        assert_eq!(next.cards[1], state.cards[1]);
        assert!(next
            .cards
            .iter()
            .all(|card| !card.group_ids.iter().any(|id| id == "g1")));
    }

    #[test]
    fn test_toggle_favorite() {
        let mut state = AppData::empty();
        state.cards.push(card("c1", "A", "T1"));

        let next = reduce_at(&state, Action::ToggleFavorite("c1".to_string()), at(1));
        assert!(next.cards[0].favorite);
        assert_eq!(next.cards[0].created_at, "T0");

        assert_eq!(next.cards[0].updated_at, format_timestamp(at(1)));

        let next = reduce_at(&next, Action::ToggleFavorite("c1".to_string()), at(2));
        assert!(!next.cards[0].favorite);
        assert_eq!(next.cards[0].updated_at, format_timestamp(at(2)));
    }

    #[test]
    fn test_merge_import_overwrites_and_appends() {
        let mut state = AppData::empty();
        state.cards.push(card("c1", "A", "T1"));

        let mut incoming = AppData::empty();
        incoming.cards.push(card("c1", "B", "T2"));
        let mut c2 = card("c2", "C", "T3");
        c2.created_at = String::new();
        incoming.cards.push(c2.clone());

        let next = reduce_at(
            &state,
            Action::Import {
                data: incoming,
                mode: ImportMode::Merge,
            },
            at(0),
        );

        assert_eq!(next.cards.len(), 2);
        assert_eq!(next.cards[0].id, "c1");
        assert_eq!(next.cards[0].title, "B");
        assert_eq!(next.cards[0].updated_at, "T2");
        assert_eq!(next.cards[1], c2);
    }

    #[test]
    fn test_merge_keeps_existing_order_and_appends_in_source_order() {
        let mut state = AppData::empty();
        for id in ["a", "b", "c"] {
            state.groups.push(group(id, id));
        }

        let mut incoming = AppData::empty();
        for id in ["z", "b", "y", "a"] {
            incoming.groups.push(group(id, &id.to_uppercase()));
        }

        let next = reduce_at(
            &state,
            Action::Import {
                data: incoming,
                mode: ImportMode::Merge,
            },
            at(0),
        );

        let ids: Vec<&str> = next.groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "z", "y"]);
        assert_eq!(next.groups[0].name, "A");
        assert_eq!(next.groups[2].name, "c");
    }

    #[test]
    fn test_merge_import_is_idempotent() {
        let mut state = AppData::empty();
        state.cards.push(card("c1", "A", "T1"));
        state.groups.push(group("g1", "Food"));

        let mut incoming = AppData::empty();
        incoming.cards.push(card("c1", "B", "T2"));
        incoming.cards.push(card("c2", "C", "T2"));
        incoming.groups.push(group("g2", "Drinks"));

        let import = Action::Import {
            data: incoming,
            mode: ImportMode::Merge,
        };
        let once = reduce_at(&state, import.clone(), at(0));
        let twice = reduce_at(&once, import, at(10));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_replace_import_is_idempotent() {
        let mut state = AppData::empty();
        state.cards.push(card("old", "Old", "T1"));

        let mut incoming = AppData::empty();
        incoming.cards.push(card("c9", "New", "T9"));
        incoming.groups.push(group("g9", "Fresh"));

        let import = Action::Import {
            data: incoming.clone(),
            mode: ImportMode::Replace,
        };
        let once = reduce_at(&state, import.clone(), at(0));
        let twice = reduce_at(&once, import, at(10));
        assert_eq!(once, incoming);
        assert_eq!(twice, incoming);
    }

    #[test]
    fn test_load_and_reset_replace_wholesale() {
        let mut loaded = AppData::empty();
        loaded.cards.push(card("c1", "A", "stamp-from-disk"));

        let state = reduce_at(&AppData::empty(), Action::Load(loaded.clone()), at(0));
        assert_eq!(state, loaded);

        let state = reduce_at(&state, Action::Reset, at(1));
        assert_eq!(state, AppData::empty());
    }

    #[test]
    fn test_unknown_action_is_noop() {
        let mut state = AppData::empty();
        state.groups.push(group("g1", "Food"));
        assert_eq!(reduce_at(&state, Action::Unknown, at(0)), state);
    }

    #[test]
    fn test_group_color_is_stored_unvalidated() {
        // Color format is checked by the caller; the reducer stores what it is given.
        let draft = NewGroup {
            color: Some("not-a-color".to_string()),
            ..NewGroup::named("Odd")
        };
        let state = reduce_at(&AppData::empty(), Action::AddGroup(draft), at(0));
        assert_eq!(state.groups[0].color.as_deref(), Some("not-a-color"));
    }
}
