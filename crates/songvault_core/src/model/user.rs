//! User entity.
//!
//! # Invariants
//! - `unique_id` is assigned once at creation and never changes.
//! - `username` is non-blank. Uniqueness is a lookup-before-create
//!   convention, not a store constraint.

use crate::model::entity::{
    expect_integer, expect_text, expect_uuid, find_property, Attribute, EntityKind, ObjectId,
    ValidationError, Value,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Age assigned to every newly created user.
pub const DEFAULT_USER_AGE: i32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub object_id: ObjectId,
    /// Domain identity, stable for the user's lifetime.
    pub unique_id: Uuid,
    pub username: String,
    pub age: i32,
}

impl User {
    /// Creates an unsaved user with a fresh identity and the default age.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            object_id: ObjectId::new(EntityKind::User),
            unique_id: Uuid::new_v4(),
            username: username.into(),
            age: DEFAULT_USER_AGE,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.object_id.kind() != EntityKind::User {
            return Err(ValidationError::KindMismatch {
                object_id: self.object_id,
                expected: EntityKind::User,
            });
        }
        if self.username.trim().is_empty() {
            return Err(ValidationError::EmptyUsername);
        }
        if self.age < 0 {
            return Err(ValidationError::InvalidAge(i64::from(self.age)));
        }
        Ok(())
    }

    pub(crate) fn value(&self, attribute: Attribute) -> Option<Value> {
        match attribute {
            Attribute::UniqueId => Some(Value::Uuid(self.unique_id)),
            Attribute::Username => Some(Value::Text(self.username.clone())),
            Attribute::Age => Some(Value::Integer(i64::from(self.age))),
            _ => None,
        }
    }

    pub(crate) fn set(&mut self, attribute: Attribute, value: Value) -> Result<(), ValidationError> {
        match attribute {
            Attribute::UniqueId => self.unique_id = expect_uuid(attribute, value)?,
            Attribute::Username => self.username = expect_text(attribute, value)?,
            Attribute::Age => self.age = age_from_value(value)?,
            other => {
                return Err(ValidationError::AttributeMismatch {
                    attribute: other,
                    kind: EntityKind::User,
                })
            }
        }
        Ok(())
    }

    pub(crate) fn from_properties(
        object_id: ObjectId,
        properties: &[(Attribute, Value)],
    ) -> Result<Self, ValidationError> {
        let unique_id = expect_uuid(
            Attribute::UniqueId,
            find_property(properties, Attribute::UniqueId)?.clone(),
        )?;
        let username = expect_text(
            Attribute::Username,
            find_property(properties, Attribute::Username)?.clone(),
        )?;
        let age = age_from_value(find_property(properties, Attribute::Age)?.clone())?;

        Ok(Self {
            object_id,
            unique_id,
            username,
            age,
        })
    }
}

fn age_from_value(value: Value) -> Result<i32, ValidationError> {
    let raw = expect_integer(Attribute::Age, value)?;
    i32::try_from(raw)
        .ok()
        .filter(|age| *age >= 0)
        .ok_or(ValidationError::InvalidAge(raw))
}
