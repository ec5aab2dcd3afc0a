use crate::entities;
use crate::errors::PermsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_EXTERNAL_SUBJECT_ID_LEN: usize = 64;
pub const MAX_NAME_LEN: usize = 255;

/// Access level attached to a (subject, resource) pair.
///
/// Variant order is the total order `read < write < own`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Read,
    Write,
    Own,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Read => "read",
            PermissionLevel::Write => "write",
            PermissionLevel::Own => "own",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = PermsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(PermissionLevel::Read),
            "write" => Ok(PermissionLevel::Write),
            "own" => Ok(PermissionLevel::Own),
            other => Err(PermsError::InvalidInput(format!(
                "unknown permission level `{}`",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceType {
    pub id: String,
    pub name: String,
}

impl From<entities::resource_type::Model> for ResourceType {
    fn from(model: entities::resource_type::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Internal identifier
    pub id: String,
    /// Identifier assigned by the external system
    pub subject_id: String,
    pub subject_type: String,
}

impl From<entities::subject::Model> for Subject {
    fn from(model: entities::subject::Model) -> Self {
        Self {
            id: model.id,
            subject_id: model.external_subject_id,
            subject_type: model.subject_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub resource_type: String,
}

/// Stored permission row, keyed by internal identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub subject_id: String,
    pub resource_id: String,
    pub permission_level: PermissionLevel,
}

impl TryFrom<entities::permission::Model> for Permission {
    type Error = PermsError;

    fn try_from(model: entities::permission::Model) -> Result<Self, Self::Error> {
        let permission_level = model.permission_level.parse().map_err(|_| {
            PermsError::ConstraintViolation(format!(
                "permission {} carries unknown level `{}`",
                model.id, model.permission_level
            ))
        })?;
        Ok(Self {
            id: model.id,
            subject_id: model.subject_id,
            resource_id: model.resource_id,
            permission_level,
        })
    }
}

/// Permission joined with its subject, resource and resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionView {
    pub id: String,
    pub subject: Subject,
    pub resource: Resource,
    pub permission_level: PermissionLevel,
}

/// External reference to a subject, as supplied by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectIn {
    pub subject_id: String,
    pub subject_type: String,
}

/// External reference to a resource, as supplied by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIn {
    pub name: String,
    pub resource_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrantRequest {
    pub subject: SubjectIn,
    pub resource: ResourceIn,
    pub permission_level: PermissionLevel,
}

pub fn validate_external_subject_id(value: &str) -> Result<(), PermsError> {
    let len = value.chars().count();
    if len == 0 || len > MAX_EXTERNAL_SUBJECT_ID_LEN {
        return Err(PermsError::InvalidInput(format!(
            "external subject id must be 1 to {} characters long",
            MAX_EXTERNAL_SUBJECT_ID_LEN
        )));
    }
    Ok(())
}

pub fn validate_name(field: &str, value: &str) -> Result<(), PermsError> {
    let len = value.chars().count();
    if value.trim().is_empty() || len > MAX_NAME_LEN {
        return Err(PermsError::InvalidInput(format!(
            "{} must be 1 to {} characters long",
            field, MAX_NAME_LEN
        )));
    }
    Ok(())
}
