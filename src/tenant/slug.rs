//! Workspace slugs and the schema identifiers derived from them.
//!
//! A [`SchemaName`] can only be built from a [`TenantSlug`], and a
//! `TenantSlug` can only be built by passing the creation-time allow-list
//! (`[a-z0-9-]`, 3 to 50 characters). Any SQL that names a tenant schema
//! goes through [`SchemaName::quoted`].

use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

pub const SLUG_MIN_LEN: usize = 3;
pub const SLUG_MAX_LEN: usize = 50;
pub const SCHEMA_PREFIX: &str = "tenant_";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed workspace slug: {0:?}")]
    MalformedSlug(String),
}

/// A slug that passed the workspace allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantSlug(String);

impl TenantSlug {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let len = raw.len();
        let allowed = raw
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        if !(SLUG_MIN_LEN..=SLUG_MAX_LEN).contains(&len) || !allowed {
            return Err(ValidationError::MalformedSlug(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for TenantSlug {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Map a validated slug onto the `[a-z0-9_]` identifier alphabet.
///
/// Pure and total over `TenantSlug`: the only character outside the
/// identifier alphabet is `-`, which becomes `_`.
pub fn sanitize(slug: &TenantSlug) -> String {
    slug.0.replace('-', "_")
}

/// Postgres schema holding one tenant's relational data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaName(String);

impl SchemaName {
    pub fn for_slug(slug: &TenantSlug) -> Self {
        Self(format!("{}{}", SCHEMA_PREFIX, sanitize(slug)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted identifier for interpolation into DDL/DML.
    pub fn quoted(&self) -> String {
        // The alphabet is closed, so there is nothing to escape.
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for SchemaName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
