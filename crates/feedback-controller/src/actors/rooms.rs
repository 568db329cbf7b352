//! Room, list and note state owned by a session actor.
//!
//! The registry enforces one room per participant identity and owns the
//! whole room/list/note subgraph, so removing a room (or clearing the
//! registry on session end) cascades by ownership. Phase and lock guards
//! live in the session actor, which evaluates them in the same critical
//! section as the mutations here.
//!
//! Pre-aggregation, a list is created lazily in the *author's* room the
//! first time the author writes about a given peer; `associated_room_id`
//! names the peer the notes are about. Post-aggregation the lists are
//! replaced wholesale by the aggregation transform.

use crate::actors::messages::{ListDetail, ListSummary, NoteDetail, Rate, RoomDetail, RoomView};
use crate::errors::FcError;
use crate::ident;

use std::collections::HashMap;

/// One piece of authored feedback.
#[derive(Debug, Clone)]
pub struct Note {
    pub id: String,
    pub content: String,
    pub rate: Rate,
}

/// A named, ordered bucket of notes.
///
/// `associated_room_id` names the room the notes are *about* before
/// aggregation; afterwards it is a regenerated, meaningless token.
#[derive(Debug, Clone)]
pub struct List {
    pub id: String,
    pub associated_room_id: String,
    pub name: String,
    pub notes: Vec<Note>,
}

/// One participant's feedback slot within a session.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub session_id: String,
    pub name: String,
    pub owner_identity: String,
    pub ready: bool,
    pub own_notes: bool,
    pub lists: Vec<List>,
}

impl Room {
    /// Broadcast-safe read model: list note counts only.
    #[must_use]
    pub fn to_view(&self) -> RoomView {
        RoomView {
            id: self.id.clone(),
            session_id: self.session_id.clone(),
            name: self.name.clone(),
            ready: self.ready,
            own_notes: self.own_notes,
            lists: self
                .lists
                .iter()
                .map(|list| ListSummary {
                    id: list.id.clone(),
                    name: list.name.clone(),
                    note_count: list.notes.len(),
                    associated_room_id: list.associated_room_id.clone(),
                })
                .collect(),
        }
    }

    /// Full read model including note contents.
    #[must_use]
    pub fn to_detail(&self) -> RoomDetail {
        RoomDetail {
            id: self.id.clone(),
            session_id: self.session_id.clone(),
            name: self.name.clone(),
            ready: self.ready,
            own_notes: self.own_notes,
            lists: self
                .lists
                .iter()
                .map(|list| ListDetail {
                    id: list.id.clone(),
                    name: list.name.clone(),
                    associated_room_id: list.associated_room_id.clone(),
                    notes: list
                        .notes
                        .iter()
                        .map(|note| NoteDetail {
                            id: note.id.clone(),
                            content: note.content.clone(),
                            rate: note.rate,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// The set of rooms belonging to one session.
#[derive(Debug)]
pub struct RoomRegistry {
    session_id: String,
    rooms: HashMap<String, Room>,
    /// Participant identity -> room id.
    owner_index: HashMap<String, String>,
}

impl RoomRegistry {
    /// Create an empty registry scoped to one session.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            rooms: HashMap::new(),
            owner_index: HashMap::new(),
        }
    }

    /// Create a room for a participant.
    ///
    /// # Errors
    ///
    /// - [`FcError::RoomConflict`] if the identity already owns a room here
    /// - [`FcError::CapacityExceeded`] if the session is at `max_rooms`
    pub fn create(
        &mut self,
        name: &str,
        owner_identity: &str,
        max_rooms: usize,
    ) -> Result<&Room, FcError> {
        if self.owner_index.contains_key(owner_identity) {
            return Err(FcError::RoomConflict);
        }
        if self.rooms.len() >= max_rooms {
            return Err(FcError::CapacityExceeded(format!(
                "session holds at most {max_rooms} rooms"
            )));
        }

        let id = ident::opaque_token();
        let room = Room {
            id: id.clone(),
            session_id: self.session_id.clone(),
            name: name.to_string(),
            owner_identity: owner_identity.to_string(),
            ready: false,
            own_notes: false,
            lists: Vec::new(),
        };

        self.owner_index
            .insert(owner_identity.to_string(), id.clone());
        self.rooms.insert(id.clone(), room);

        self.rooms
            .get(&id)
            .ok_or_else(|| FcError::Internal("room vanished after insert".to_string()))
    }

    /// Look up a room by id.
    pub fn get(&self, room_id: &str) -> Result<&Room, FcError> {
        self.rooms
            .get(room_id)
            .ok_or_else(|| FcError::RoomNotFound(room_id.to_string()))
    }

    /// Look up the room owned by a participant identity.
    pub fn find_by_owner(&self, owner_identity: &str) -> Result<&Room, FcError> {
        self.owner_index
            .get(owner_identity)
            .and_then(|id| self.rooms.get(id))
            .ok_or_else(|| FcError::RoomNotFound(owner_identity.to_string()))
    }

    /// Remove a room, cascading its lists and notes by ownership.
    pub fn remove(&mut self, room_id: &str) -> Result<Room, FcError> {
        let room = self
            .rooms
            .remove(room_id)
            .ok_or_else(|| FcError::RoomNotFound(room_id.to_string()))?;
        self.owner_index.remove(&room.owner_identity);
        Ok(room)
    }

    /// Set a room's readiness flag.
    pub fn set_ready(&mut self, room_id: &str, ready: bool) -> Result<&Room, FcError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| FcError::RoomNotFound(room_id.to_string()))?;
        room.ready = ready;
        Ok(room)
    }

    /// Insert or edit a note the author writes about a peer room.
    ///
    /// The backing list is created on first use, named after the peer
    /// room. With `note_id` set, the existing note is edited in place.
    ///
    /// Returns the author's room.
    pub fn submit_note(
        &mut self,
        author_identity: &str,
        about_room_id: &str,
        note_id: Option<&str>,
        content: &str,
        rate: Rate,
    ) -> Result<&Room, FcError> {
        let author_room_id = self
            .owner_index
            .get(author_identity)
            .cloned()
            .ok_or_else(|| FcError::RoomNotFound(author_identity.to_string()))?;

        if author_room_id == about_room_id {
            return Err(FcError::PermissionDenied(
                "feedback targets a peer room, not your own".to_string(),
            ));
        }

        let about_name = self
            .rooms
            .get(about_room_id)
            .ok_or_else(|| FcError::RoomNotFound(about_room_id.to_string()))?
            .name
            .clone();

        let room = self
            .rooms
            .get_mut(&author_room_id)
            .ok_or_else(|| FcError::RoomNotFound(author_room_id.clone()))?;

        let list = match room
            .lists
            .iter_mut()
            .find(|list| list.associated_room_id == about_room_id)
        {
            Some(list) => list,
            None => {
                room.lists.push(List {
                    id: ident::opaque_token(),
                    associated_room_id: about_room_id.to_string(),
                    name: about_name,
                    notes: Vec::new(),
                });
                room.lists
                    .last_mut()
                    .ok_or_else(|| FcError::Internal("list vanished after push".to_string()))?
            }
        };

        match note_id {
            Some(note_id) => {
                let note = list
                    .notes
                    .iter_mut()
                    .find(|note| note.id == note_id)
                    .ok_or_else(|| FcError::NoteNotFound(note_id.to_string()))?;
                note.content = content.to_string();
                note.rate = rate;
            }
            None => {
                list.notes.push(Note {
                    id: ident::opaque_token(),
                    content: content.to_string(),
                    rate,
                });
            }
        }

        self.rooms
            .get(&author_room_id)
            .ok_or_else(|| FcError::Internal("room vanished after note submit".to_string()))
    }

    /// Remove a note from one of the author's lists.
    ///
    /// Returns the author's room.
    pub fn remove_note(
        &mut self,
        author_identity: &str,
        list_id: &str,
        note_id: &str,
    ) -> Result<&Room, FcError> {
        let author_room_id = self
            .owner_index
            .get(author_identity)
            .cloned()
            .ok_or_else(|| FcError::RoomNotFound(author_identity.to_string()))?;

        let room = self
            .rooms
            .get_mut(&author_room_id)
            .ok_or_else(|| FcError::RoomNotFound(author_room_id.clone()))?;

        let list = room
            .lists
            .iter_mut()
            .find(|list| list.id == list_id)
            .ok_or_else(|| FcError::ListNotFound(list_id.to_string()))?;

        let index = list
            .notes
            .iter()
            .position(|note| note.id == note_id)
            .ok_or_else(|| FcError::NoteNotFound(note_id.to_string()))?;
        list.notes.remove(index);

        self.rooms
            .get(&author_room_id)
            .ok_or_else(|| FcError::Internal("room vanished after note removal".to_string()))
    }

    /// Iterate over all rooms (arbitrary order).
    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// Mutable iteration, for the aggregation transform.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Room> {
        self.rooms.values_mut()
    }

    /// Number of rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether the registry holds no rooms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Broadcast-safe views of every room.
    #[must_use]
    pub fn views(&self) -> Vec<RoomView> {
        self.rooms.values().map(Room::to_view).collect()
    }

    /// Drop every room with its lists and notes.
    ///
    /// Returns `(rooms, lists, notes)` removal counts for logging.
    pub fn clear(&mut self) -> (usize, usize, usize) {
        let rooms = self.rooms.len();
        let lists = self.rooms.values().map(|room| room.lists.len()).sum();
        let notes = self
            .rooms
            .values()
            .flat_map(|room| room.lists.iter())
            .map(|list| list.notes.len())
            .sum();
        self.rooms.clear();
        self.owner_index.clear();
        (rooms, lists, notes)
    }
}
