//! Field declarations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Suffix of the whole-value companion written next to full-text fields.
pub const RAW_SUFFIX: &str = "_raw";

/// How a field is encrypted, which decides the queries it supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Whole value, deterministic: exact equality
    Raw,
    /// Edge n-gram tokens, deterministic: prefix, term and phrase matches,
    /// plus a `<field>_raw` whole-value companion
    FullText,
    /// Day ordinal, order preserving: ranges
    Date,
    /// Seconds of the day, order preserving: ranges
    Time,
    /// Integer, order preserving: ranges
    Integer,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Raw => "raw",
            Self::FullText => "full text",
            Self::Date => "date",
            Self::Time => "time",
            Self::Integer => "integer",
        };
        f.write_str(name)
    }
}

/// A field name with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name
    pub name: String,
    /// Field kind
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Creates a field spec.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), kind }
    }
}

/// Name of the whole-value companion of a full-text field.
#[must_use]
pub fn raw_companion(field: &str) -> String {
    format!("{field}{RAW_SUFFIX}")
}

/// The declared fields of a request.
///
/// Every field name maps to exactly one kind, and no declared name collides
/// with the `_raw` companion of a full-text field.
///
/// # Example
///
/// ```
/// use sifresearch::field::{FieldKind, FieldSpecs};
///
/// let specs = FieldSpecs::builder()
///     .raw(["author"])
///     .full_text(["text"])
///     .date(["date"])
///     .time(["time"])
///     .integer(["value"])
///     .build()
///     .unwrap();
///
/// assert_eq!(specs.kind("text"), Some(FieldKind::FullText));
/// assert_eq!(specs.len(), 5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSpecs {
    fields: BTreeMap<String, FieldKind>,
}

impl FieldSpecs {
    /// Builds the set from individual specs.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateField` if a name is declared twice or equals
    /// the companion name of a full-text field.
    pub fn new(specs: impl IntoIterator<Item = FieldSpec>) -> Result<Self, Error> {
        let mut fields = BTreeMap::new();
        for spec in specs {
            if fields.insert(spec.name.clone(), spec.kind).is_some() {
                return Err(Error::DuplicateField(spec.name));
            }
        }

        for (name, kind) in &fields {
            if *kind == FieldKind::FullText {
                let companion = raw_companion(name);
                if fields.contains_key(&companion) {
                    return Err(Error::DuplicateField(companion));
                }
            }
        }

        Ok(Self { fields })
    }

    /// Starts a builder grouping fields by kind.
    #[must_use]
    pub fn builder() -> FieldSpecsBuilder {
        FieldSpecsBuilder::default()
    }

    /// Kind of `field`, if declared.
    #[must_use]
    pub fn kind(&self, field: &str) -> Option<FieldKind> {
        self.fields.get(field).copied()
    }

    /// Returns true if `field` is declared.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Iterates declared fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldKind)> {
        self.fields.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    /// Number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolves a stored field name, including `_raw` companions.
    ///
    /// A companion resolves to `(FieldKind::Raw, true)`.
    #[must_use]
    pub fn resolve_stored(&self, stored: &str) -> Option<(FieldKind, bool)> {
        if let Some(kind) = self.kind(stored) {
            return Some((kind, false));
        }
        let base = stored.strip_suffix(RAW_SUFFIX)?;
        (self.kind(base) == Some(FieldKind::FullText)).then_some((FieldKind::Raw, true))
    }
}

/// Builder for [`FieldSpecs`], grouping names by kind.
#[derive(Debug, Default)]
pub struct FieldSpecsBuilder {
    specs: Vec<FieldSpec>,
}

impl FieldSpecsBuilder {
    fn add<I, S>(mut self, names: I, kind: FieldKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specs.extend(names.into_iter().map(|name| FieldSpec::new(name, kind)));
        self
    }

    /// Declares raw fields.
    #[must_use]
    pub fn raw<I: IntoIterator<Item = S>, S: Into<String>>(self, names: I) -> Self {
        self.add(names, FieldKind::Raw)
    }

    /// Declares full-text fields.
    #[must_use]
    pub fn full_text<I: IntoIterator<Item = S>, S: Into<String>>(self, names: I) -> Self {
        self.add(names, FieldKind::FullText)
    }

    /// Declares date fields.
    #[must_use]
    pub fn date<I: IntoIterator<Item = S>, S: Into<String>>(self, names: I) -> Self {
        self.add(names, FieldKind::Date)
    }

    /// Declares time fields.
    #[must_use]
    pub fn time<I: IntoIterator<Item = S>, S: Into<String>>(self, names: I) -> Self {
        self.add(names, FieldKind::Time)
    }

    /// Declares integer fields.
    #[must_use]
    pub fn integer<I: IntoIterator<Item = S>, S: Into<String>>(self, names: I) -> Self {
        self.add(names, FieldKind::Integer)
    }

    /// Builds the field set.
    ///
    /// # Errors
    ///
    /// See [`FieldSpecs::new`].
    pub fn build(self) -> Result<FieldSpecs, Error> {
        FieldSpecs::new(self.specs)
    }
}
