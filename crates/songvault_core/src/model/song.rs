//! Song entity.
//!
//! # Invariants
//! - `duration` is finite and non-negative.
//! - `owner` always references a user object.

use crate::model::entity::{
    expect_bool, expect_integer, expect_real, expect_reference, expect_text, find_property,
    Attribute, EntityKind, ObjectId, ValidationError, Value,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub object_id: ObjectId,
    pub title: String,
    /// Unix epoch milliseconds.
    pub date_recorded: i64,
    /// Seconds.
    pub duration: f64,
    pub is_favorite: bool,
    pub owner: ObjectId,
}

/// Input for creating a song; the owner is supplied separately.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSong {
    pub title: String,
    pub date_recorded: i64,
    pub duration: f64,
    pub is_favorite: bool,
}

impl NewSong {
    /// Song input with `is_favorite = false`.
    pub fn new(title: impl Into<String>, date_recorded: i64, duration: f64) -> Self {
        Self {
            title: title.into(),
            date_recorded,
            duration,
            is_favorite: false,
        }
    }

    pub fn favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }
}

impl Song {
    /// Creates an unsaved song owned by `owner`.
    pub fn new(input: NewSong, owner: ObjectId) -> Self {
        Self {
            object_id: ObjectId::new(EntityKind::Song),
            title: input.title,
            date_recorded: input.date_recorded,
            duration: input.duration,
            is_favorite: input.is_favorite,
            owner,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.object_id.kind() != EntityKind::Song {
            return Err(ValidationError::KindMismatch {
                object_id: self.object_id,
                expected: EntityKind::Song,
            });
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(ValidationError::InvalidDuration(self.duration));
        }
        if self.owner.kind() != EntityKind::User {
            return Err(ValidationError::OwnerNotAUser(self.owner));
        }
        Ok(())
    }

    pub(crate) fn value(&self, attribute: Attribute) -> Option<Value> {
        match attribute {
            Attribute::Title => Some(Value::Text(self.title.clone())),
            Attribute::DateRecorded => Some(Value::Integer(self.date_recorded)),
            Attribute::Duration => Some(Value::Real(self.duration)),
            Attribute::IsFavorite => Some(Value::Bool(self.is_favorite)),
            Attribute::Owner => Some(Value::Reference(self.owner)),
            _ => None,
        }
    }

    pub(crate) fn set(&mut self, attribute: Attribute, value: Value) -> Result<(), ValidationError> {
        match attribute {
            Attribute::Title => self.title = expect_text(attribute, value)?,
            Attribute::DateRecorded => self.date_recorded = expect_integer(attribute, value)?,
            Attribute::Duration => {
                let duration = expect_real(attribute, value)?;
                if !duration.is_finite() || duration < 0.0 {
                    return Err(ValidationError::InvalidDuration(duration));
                }
                self.duration = duration;
            }
            Attribute::IsFavorite => self.is_favorite = expect_bool(attribute, value)?,
            Attribute::Owner => {
                let owner = expect_reference(attribute, value)?;
                if owner.kind() != EntityKind::User {
                    return Err(ValidationError::OwnerNotAUser(owner));
                }
                self.owner = owner;
            }
            other => {
                return Err(ValidationError::AttributeMismatch {
                    attribute: other,
                    kind: EntityKind::Song,
                })
            }
        }
        Ok(())
    }

    pub(crate) fn from_properties(
        object_id: ObjectId,
        properties: &[(Attribute, Value)],
    ) -> Result<Self, ValidationError> {
        let property = |attribute| find_property(properties, attribute).cloned();

        Ok(Self {
            object_id,
            title: expect_text(Attribute::Title, property(Attribute::Title)?)?,
            date_recorded: expect_integer(
                Attribute::DateRecorded,
                property(Attribute::DateRecorded)?,
            )?,
            duration: expect_real(Attribute::Duration, property(Attribute::Duration)?)?,
            is_favorite: expect_bool(Attribute::IsFavorite, property(Attribute::IsFavorite)?)?,
            owner: expect_reference(Attribute::Owner, property(Attribute::Owner)?)?,
        })
    }
}
