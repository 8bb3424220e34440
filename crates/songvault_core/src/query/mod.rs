//! Fetch requests, predicates and sort descriptors.
//!
//! # Responsibility
//! - Describe which entities a fetch or batch delete targets.
//! - Evaluate predicates in memory for cached/pending objects; the repository
//!   layer compiles the same predicates to SQL for stored rows.
//!
//! # Invariants
//! - A key path is valid only for the request's entity kind
//!   (`Owner(..)` paths only for songs, and only into user attributes).

use crate::model::{Attribute, Entity, EntityKind, ObjectId, Value};
use std::cmp::Ordering;

/// Path from the fetched entity to a compared property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPath {
    /// Property of the fetched entity itself.
    Attribute(Attribute),
    /// Property of a song's owning user, e.g. `owner.username`.
    Owner(Attribute),
}

impl KeyPath {
    pub fn is_valid_for(self, kind: EntityKind) -> bool {
        match self {
            Self::Attribute(attribute) => attribute.entity() == kind,
            Self::Owner(attribute) => {
                kind == EntityKind::Song && attribute.entity() == EntityKind::User
            }
        }
    }
}

/// Filter applied by fetch and batch-delete requests.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equals(KeyPath, Value),
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn is(attribute: Attribute, value: impl Into<Value>) -> Self {
        Self::Equals(KeyPath::Attribute(attribute), value.into())
    }

    pub fn owner_is(attribute: Attribute, value: impl Into<Value>) -> Self {
        Self::Equals(KeyPath::Owner(attribute), value.into())
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            single => Self::And(vec![single, other]),
        }
    }

    pub fn is_valid_for(&self, kind: EntityKind) -> bool {
        match self {
            Self::Equals(key_path, _) => key_path.is_valid_for(kind),
            Self::And(parts) => parts.iter().all(|part| part.is_valid_for(kind)),
        }
    }

    /// Whether any part of the predicate reads through the song's owner.
    pub fn references_owner(&self) -> bool {
        match self {
            Self::Equals(KeyPath::Owner(_), _) => true,
            Self::Equals(KeyPath::Attribute(_), _) => false,
            Self::And(parts) => parts.iter().any(Predicate::references_owner),
        }
    }

    /// Evaluates against an in-memory entity.
    ///
    /// `resolve_owner` loads the owning user for `Owner(..)` key paths; an
    /// unresolvable owner never matches.
    pub fn evaluate(
        &self,
        entity: &Entity,
        resolve_owner: &mut dyn FnMut(ObjectId) -> Option<Entity>,
    ) -> bool {
        match self {
            Self::Equals(KeyPath::Attribute(attribute), expected) => entity
                .value(*attribute)
                .is_some_and(|actual| values_equal(&actual, expected)),
            Self::Equals(KeyPath::Owner(attribute), expected) => {
                let Some(song) = entity.as_song() else {
                    return false;
                };
                resolve_owner(song.owner)
                    .and_then(|owner| owner.value(*attribute))
                    .is_some_and(|actual| values_equal(&actual, expected))
            }
            Self::And(parts) => parts
                .iter()
                .all(|part| part.evaluate(entity, resolve_owner)),
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    left == right || left.compare(right) == Some(Ordering::Equal)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortDescriptor {
    pub attribute: Attribute,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn ascending(attribute: Attribute) -> Self {
        Self {
            attribute,
            ascending: true,
        }
    }

    pub fn descending(attribute: Attribute) -> Self {
        Self {
            attribute,
            ascending: false,
        }
    }
}

/// Fetch request for one entity kind.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub entity: EntityKind,
    pub predicate: Option<Predicate>,
    pub sort: Vec<SortDescriptor>,
    pub limit: Option<usize>,
}

impl FetchRequest {
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            predicate: None,
            sort: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn sort_by(mut self, descriptor: SortDescriptor) -> Self {
        self.sort.push(descriptor);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Songs owned by `username`, newest recording first.
    pub fn songs_for_username(username: &str) -> Self {
        Self::new(EntityKind::Song)
            .filter(Predicate::owner_is(Attribute::Username, username))
            .sort_by(SortDescriptor::descending(Attribute::DateRecorded))
    }

    /// Users with exactly this username.
    pub fn user_named(username: &str) -> Self {
        Self::new(EntityKind::User).filter(Predicate::is(Attribute::Username, username))
    }

    pub fn is_valid(&self) -> bool {
        self.predicate
            .as_ref()
            .map_or(true, |predicate| predicate.is_valid_for(self.entity))
            && self
                .sort
                .iter()
                .all(|descriptor| descriptor.attribute.entity() == self.entity)
    }

    /// Orders entities by the sort descriptors, then by object id so equal
    /// keys still produce a deterministic sequence.
    pub fn compare(&self, left: &Entity, right: &Entity) -> Ordering {
        for descriptor in &self.sort {
            let ordering = match (left.value(descriptor.attribute), right.value(descriptor.attribute))
            {
                (Some(left_value), Some(right_value)) => left_value
                    .compare(&right_value)
                    .unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            };
            let ordering = if descriptor.ascending {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        left.object_id().cmp(&right.object_id())
    }
}

/// Store-level delete that never loads instances.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchDeleteRequest {
    pub entity: EntityKind,
    pub predicate: Option<Predicate>,
}

impl BatchDeleteRequest {
    pub fn all(entity: EntityKind) -> Self {
        Self {
            entity,
            predicate: None,
        }
    }

    pub fn matching(entity: EntityKind, predicate: Predicate) -> Self {
        Self {
            entity,
            predicate: Some(predicate),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.predicate
            .as_ref()
            .map_or(true, |predicate| predicate.is_valid_for(self.entity))
    }
}

#[cfg(test)]
mod tests {
    use super::{FetchRequest, KeyPath, Predicate, SortDescriptor};
    use crate::model::{Attribute, Entity, EntityKind, NewSong, Song, User};

    #[test]
    fn owner_key_path_is_only_valid_for_songs() {
        assert!(KeyPath::Owner(Attribute::Username).is_valid_for(EntityKind::Song));
        assert!(!KeyPath::Owner(Attribute::Username).is_valid_for(EntityKind::User));
        assert!(!KeyPath::Owner(Attribute::Title).is_valid_for(EntityKind::Song));
    }

    #[test]
    fn request_with_foreign_sort_key_is_invalid() {
        let request =
            FetchRequest::new(EntityKind::User).sort_by(SortDescriptor::ascending(Attribute::Title));
        assert!(!request.is_valid());
        assert!(FetchRequest::songs_for_username("a").is_valid());
    }

    #[test]
    fn owner_predicate_resolves_through_callback() {
        let user = User::new("MusicLover123");
        let song = Entity::from(Song::new(NewSong::new("a", 1, 1.0), user.object_id));
        let predicate = Predicate::owner_is(Attribute::Username, "MusicLover123");

        let owner = Entity::from(user.clone());
        assert!(predicate.evaluate(&song, &mut |_| Some(owner.clone())));
        assert!(!predicate.evaluate(&song, &mut |_| None));
    }

    #[test]
    fn owner_reference_is_found_inside_conjunctions() {
        assert!(!Predicate::is(Attribute::Title, "a").references_owner());
        assert!(Predicate::is(Attribute::Title, "a")
            .and(Predicate::owner_is(Attribute::Username, "b"))
            .references_owner());
    }

    #[test]
    fn compare_orders_descending_then_by_identity() {
        let owner = User::new("a").object_id;
        let older = Entity::from(Song::new(NewSong::new("old", 10, 1.0), owner));
        let newer = Entity::from(Song::new(NewSong::new("new", 20, 1.0), owner));
        let request = FetchRequest::songs_for_username("a");

        let mut songs = vec![older.clone(), newer.clone()];
        songs.sort_by(|left, right| request.compare(left, right));
        assert_eq!(songs, vec![newer, older]);
    }

    #[test]
    fn and_flattens_nested_conjunctions() {
        let predicate = Predicate::is(Attribute::Title, "a")
            .and(Predicate::is(Attribute::IsFavorite, true))
            .and(Predicate::is(Attribute::Duration, 3.0));
        match predicate {
            Predicate::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected predicate: {other:?}"),
        }
    }
}
