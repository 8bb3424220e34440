//! Entity identity and the attribute/value surface shared by all kinds.
//!
//! # Responsibility
//! - Identify every managed object by `ObjectId` (kind + UUID).
//! - Describe properties as `Attribute` keys with `Value` payloads so that
//!   change sets can carry only the properties that actually changed.
//!
//! # Invariants
//! - An `ObjectId` encodes its entity kind; a user id never names a song.
//! - `Entity::set` rejects writes to immutable attributes.

use crate::model::song::Song;
use crate::model::user::User;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// The two kinds of managed objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Song,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Song => "song",
        }
    }

    /// All attributes that make up a full snapshot of this kind.
    pub fn attributes(self) -> &'static [Attribute] {
        match self {
            Self::User => &[Attribute::UniqueId, Attribute::Username, Attribute::Age],
            Self::Song => &[
                Attribute::Title,
                Attribute::DateRecorded,
                Attribute::Duration,
                Attribute::IsFavorite,
                Attribute::Owner,
            ],
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store identity of one managed object.
///
/// Distinct from `User::unique_id`, which is a domain attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    kind: EntityKind,
    uuid: Uuid,
}

impl ObjectId {
    /// Allocates a fresh identity for a new object of `kind`.
    pub fn new(kind: EntityKind) -> Self {
        Self::from_parts(kind, Uuid::new_v4())
    }

    pub fn from_parts(kind: EntityKind, uuid: Uuid) -> Self {
        Self { kind, uuid }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.uuid)
    }
}

/// Property keys for both entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    UniqueId,
    Username,
    Age,
    Title,
    DateRecorded,
    Duration,
    IsFavorite,
    /// Song -> User relationship (foreign key on the song side).
    Owner,
}

impl Attribute {
    /// Entity kind that declares this attribute.
    pub fn entity(self) -> EntityKind {
        match self {
            Self::UniqueId | Self::Username | Self::Age => EntityKind::User,
            Self::Title | Self::DateRecorded | Self::Duration | Self::IsFavorite | Self::Owner => {
                EntityKind::Song
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::UniqueId => "unique_id",
            Self::Username => "username",
            Self::Age => "age",
            Self::Title => "title",
            Self::DateRecorded => "date_recorded",
            Self::Duration => "duration",
            Self::IsFavorite => "is_favorite",
            Self::Owner => "owner",
        }
    }

    /// Column backing this attribute in its entity table.
    pub fn column(self) -> &'static str {
        match self {
            Self::Owner => "user_id",
            other => other.name(),
        }
    }

    pub fn is_immutable(self) -> bool {
        matches!(self, Self::UniqueId)
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Property payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Uuid(Uuid),
    Reference(ObjectId),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Bool(_) => "bool",
            Self::Uuid(_) => "uuid",
            Self::Reference(_) => "reference",
        }
    }

    /// Orders two values of the same type. Mixed types are unordered.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(left), Self::Text(right)) => Some(left.cmp(right)),
            (Self::Integer(left), Self::Integer(right)) => Some(left.cmp(right)),
            (Self::Real(left), Self::Real(right)) => left.partial_cmp(right),
            (Self::Integer(left), Self::Real(right)) => (*left as f64).partial_cmp(right),
            (Self::Real(left), Self::Integer(right)) => left.partial_cmp(&(*right as f64)),
            (Self::Bool(left), Self::Bool(right)) => Some(left.cmp(right)),
            (Self::Uuid(left), Self::Uuid(right)) => Some(left.cmp(right)),
            (Self::Reference(left), Self::Reference(right)) => Some(left.cmp(right)),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<ObjectId> for Value {
    fn from(value: ObjectId) -> Self {
        Self::Reference(value)
    }
}

/// Model invariant violations.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyUsername,
    InvalidAge(i64),
    InvalidDuration(f64),
    ImmutableAttribute(Attribute),
    AttributeMismatch {
        attribute: Attribute,
        kind: EntityKind,
    },
    TypeMismatch {
        attribute: Attribute,
        expected: &'static str,
        found: &'static str,
    },
    MissingAttribute(Attribute),
    OwnerNotAUser(ObjectId),
    KindMismatch {
        object_id: ObjectId,
        expected: EntityKind,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyUsername => write!(f, "username must not be empty"),
            Self::InvalidAge(age) => write!(f, "age must be non-negative, got {age}"),
            Self::InvalidDuration(duration) => {
                write!(f, "duration must be finite and non-negative, got {duration}")
            }
            Self::ImmutableAttribute(attribute) => {
                write!(f, "attribute `{attribute}` cannot change after creation")
            }
            Self::AttributeMismatch { attribute, kind } => {
                write!(f, "attribute `{attribute}` does not belong to entity `{kind}`")
            }
            Self::TypeMismatch {
                attribute,
                expected,
                found,
            } => write!(
                f,
                "attribute `{attribute}` expects a {expected} value, got {found}"
            ),
            Self::MissingAttribute(attribute) => {
                write!(f, "attribute `{attribute}` is required")
            }
            Self::OwnerNotAUser(object_id) => {
                write!(f, "song owner must reference a user, got {object_id}")
            }
            Self::KindMismatch {
                object_id,
                expected,
            } => write!(f, "object id {object_id} does not name a {expected}"),
        }
    }
}

impl Error for ValidationError {}

/// One managed object of either kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum Entity {
    User(User),
    Song(Song),
}

impl Entity {
    pub fn object_id(&self) -> ObjectId {
        match self {
            Self::User(user) => user.object_id,
            Self::Song(song) => song.object_id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.object_id().kind()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::User(user) => user.validate(),
            Self::Song(song) => song.validate(),
        }
    }

    /// Reads one property. `None` when the attribute belongs to another kind.
    pub fn value(&self, attribute: Attribute) -> Option<Value> {
        match self {
            Self::User(user) => user.value(attribute),
            Self::Song(song) => song.value(attribute),
        }
    }

    /// Writes one property, enforcing kind, type and immutability rules.
    pub fn set(&mut self, attribute: Attribute, value: Value) -> Result<(), ValidationError> {
        if attribute.entity() != self.kind() {
            return Err(ValidationError::AttributeMismatch {
                attribute,
                kind: self.kind(),
            });
        }
        if attribute.is_immutable() {
            if self.value(attribute).as_ref() == Some(&value) {
                return Ok(());
            }
            return Err(ValidationError::ImmutableAttribute(attribute));
        }
        match self {
            Self::User(user) => user.set(attribute, value),
            Self::Song(song) => song.set(attribute, value),
        }
    }

    /// Full property snapshot in declaration order.
    pub fn properties(&self) -> Vec<(Attribute, Value)> {
        self.kind()
            .attributes()
            .iter()
            .filter_map(|attribute| self.value(*attribute).map(|value| (*attribute, value)))
            .collect()
    }

    /// Rebuilds an entity from a full property snapshot.
    pub fn from_properties(
        object_id: ObjectId,
        properties: &[(Attribute, Value)],
    ) -> Result<Self, ValidationError> {
        let entity = match object_id.kind() {
            EntityKind::User => Self::User(User::from_properties(object_id, properties)?),
            EntityKind::Song => Self::Song(Song::from_properties(object_id, properties)?),
        };
        entity.validate()?;
        Ok(entity)
    }

    pub fn as_user(&self) -> Option<&User> {
        match self {
            Self::User(user) => Some(user),
            Self::Song(_) => None,
        }
    }

    pub fn as_song(&self) -> Option<&Song> {
        match self {
            Self::Song(song) => Some(song),
            Self::User(_) => None,
        }
    }

    pub fn into_user(self) -> Option<User> {
        match self {
            Self::User(user) => Some(user),
            Self::Song(_) => None,
        }
    }

    pub fn into_song(self) -> Option<Song> {
        match self {
            Self::Song(song) => Some(song),
            Self::User(_) => None,
        }
    }
}

impl From<User> for Entity {
    fn from(value: User) -> Self {
        Self::User(value)
    }
}

impl From<Song> for Entity {
    fn from(value: Song) -> Self {
        Self::Song(value)
    }
}

pub(crate) fn find_property(
    properties: &[(Attribute, Value)],
    attribute: Attribute,
) -> Result<&Value, ValidationError> {
    properties
        .iter()
        .find(|(candidate, _)| *candidate == attribute)
        .map(|(_, value)| value)
        .ok_or(ValidationError::MissingAttribute(attribute))
}

pub(crate) fn expect_text(attribute: Attribute, value: Value) -> Result<String, ValidationError> {
    match value {
        Value::Text(text) => Ok(text),
        other => Err(type_mismatch(attribute, "text", &other)),
    }
}

pub(crate) fn expect_integer(attribute: Attribute, value: Value) -> Result<i64, ValidationError> {
    match value {
        Value::Integer(number) => Ok(number),
        other => Err(type_mismatch(attribute, "integer", &other)),
    }
}

pub(crate) fn expect_real(attribute: Attribute, value: Value) -> Result<f64, ValidationError> {
    match value {
        Value::Real(number) => Ok(number),
        Value::Integer(number) => Ok(number as f64),
        other => Err(type_mismatch(attribute, "real", &other)),
    }
}

pub(crate) fn expect_bool(attribute: Attribute, value: Value) -> Result<bool, ValidationError> {
    match value {
        Value::Bool(flag) => Ok(flag),
        other => Err(type_mismatch(attribute, "bool", &other)),
    }
}

pub(crate) fn expect_uuid(attribute: Attribute, value: Value) -> Result<Uuid, ValidationError> {
    match value {
        Value::Uuid(uuid) => Ok(uuid),
        other => Err(type_mismatch(attribute, "uuid", &other)),
    }
}

pub(crate) fn expect_reference(
    attribute: Attribute,
    value: Value,
) -> Result<ObjectId, ValidationError> {
    match value {
        Value::Reference(object_id) => Ok(object_id),
        other => Err(type_mismatch(attribute, "reference", &other)),
    }
}

fn type_mismatch(attribute: Attribute, expected: &'static str, found: &Value) -> ValidationError {
    ValidationError::TypeMismatch {
        attribute,
        expected,
        found: found.type_name(),
    }
}
