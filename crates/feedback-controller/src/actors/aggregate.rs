//! Note redistribution: the collection -> aggregation transform.
//!
//! Authored feedback is keyed "written by room A, about room B". This
//! transform flips it: every note travels to the room it is *about*,
//! split by sentiment into a "Positive" and a "Negative" list, with fresh
//! list and note ids so nothing persisted links a note back to its
//! author.
//!
//! The caller (the session actor) runs this inside a single message
//! handling step and flips the session phase around it, so the whole
//! transition is atomic with respect to every other session operation.

use crate::actors::messages::Rate;
use crate::actors::rooms::{List, Note, RoomRegistry};
use crate::ident;

use std::collections::HashMap;

/// Names of the two post-aggregation lists.
pub const POSITIVE_LIST: &str = "Positive";
pub const NEGATIVE_LIST: &str = "Negative";

/// Counts describing one aggregation run, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOutcome {
    /// Rooms that received their Positive/Negative pair.
    pub rooms: usize,
    /// Pre-aggregation lists destroyed.
    pub removed_lists: usize,
    /// Authored notes consumed (redistributed + dropped).
    pub removed_notes: usize,
    /// Notes that reached a room.
    pub redistributed_notes: usize,
    /// Notes about rooms no longer in the session.
    pub dropped_notes: usize,
}

/// Redistribute every authored note to the room it is about.
///
/// Every room ends with exactly two lists, "Positive" and "Negative",
/// possibly empty, holding fresh-id copies of the notes received from all
/// peers. All pre-aggregation lists and notes are destroyed. Notes about
/// a room that has since been removed have no destination and are
/// dropped.
pub fn aggregate_rooms(registry: &mut RoomRegistry) -> AggregateOutcome {
    // Transpose: gather what each room received, scanning every author's
    // lists by the room the list is about.
    let mut received: HashMap<String, Vec<Note>> = HashMap::new();
    let mut removed_lists = 0usize;
    let mut removed_notes = 0usize;

    for room in registry.iter() {
        for list in &room.lists {
            removed_lists += 1;
            removed_notes += list.notes.len();
            received
                .entry(list.associated_room_id.clone())
                .or_default()
                .extend(list.notes.iter().cloned());
        }
    }

    // Materialize every room's Positive/Negative pair before touching any
    // source list, so the swap below is the only destructive step.
    let mut replacements: HashMap<String, Vec<List>> = HashMap::new();
    let mut redistributed_notes = 0usize;

    for room in registry.iter() {
        let notes = received.remove(&room.id).unwrap_or_default();
        redistributed_notes += notes.len();

        let (positive, negative): (Vec<Note>, Vec<Note>) =
            notes.into_iter().partition(|note| note.rate == Rate::Positive);

        let fresh = |name: &str, notes: Vec<Note>| List {
            id: ident::opaque_token(),
            // Regenerated and disassociated: names no peer.
            associated_room_id: ident::opaque_token(),
            name: name.to_string(),
            notes: notes
                .into_iter()
                .map(|note| Note {
                    id: ident::opaque_token(),
                    content: note.content,
                    rate: note.rate,
                })
                .collect(),
        };

        replacements.insert(
            room.id.clone(),
            vec![fresh(POSITIVE_LIST, positive), fresh(NEGATIVE_LIST, negative)],
        );
    }

    // Whatever is left in `received` was about rooms that no longer
    // exist; those notes have no destination.
    let dropped_notes = received.values().map(Vec::len).sum();

    let mut rooms = 0usize;
    for room in registry.iter_mut() {
        if let Some(lists) = replacements.remove(&room.id) {
            room.lists = lists;
            room.own_notes = true;
            rooms += 1;
        }
    }

    AggregateOutcome {
        rooms,
        removed_lists,
        removed_notes,
        redistributed_notes,
        dropped_notes,
    }
}
