//! Plaintext, encrypted and decoded documents.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::field::{FieldKind, FieldSpecs};

/// A plaintext field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer
    Integer(i64),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// Text
    Text(String),
}

impl Value {
    /// Short name of the value type, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Text(_) => "text",
        }
    }

    /// Text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
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

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Self::Time(value)
    }
}

/// A plaintext document: field name to value.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use sifresearch::document::{Document, Value};
///
/// let doc = Document::new()
///     .with("author", "Kim Chong Un")
///     .with("date", NaiveDate::from_ymd_opt(2010, 1, 1).unwrap())
///     .with("value", 1234);
///
/// assert_eq!(doc.get("value"), Some(&Value::Integer(1234)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, builder style.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Value of `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

/// An encrypted field value.
///
/// Serde keeps the variant (`{"token": "..."}`), so a stored document reads
/// back into the same variants. The engine's untagged body is produced by
/// [`EncryptedDocument::to_json`] and read by [`EncryptedDocument::from_json`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptedValue {
    /// Base64 deterministic ciphertext of a whole value
    Token(String),
    /// Order-preserving ciphertext
    Ordinal(u64),
    /// Full-text groups: token ciphertexts joined by `|`, groups by ` `
    Tokens(String),
    /// Undeclared field passed through in plaintext on request
    Plain(Value),
}

/// An encrypted document, ready to hand to the index engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedDocument {
    fields: BTreeMap<String, EncryptedValue>,
}

impl EncryptedDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field.
    pub fn insert(&mut self, field: impl Into<String>, value: EncryptedValue) {
        self.fields.insert(field.into(), value);
    }

    /// Value of `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&EncryptedValue> {
        self.fields.get(field)
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EncryptedValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of stored fields, companions included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON body as submitted to the index engine.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(name, value)| {
                    let json = match value {
                        EncryptedValue::Token(s) | EncryptedValue::Tokens(s) => s.clone().into(),
                        EncryptedValue::Ordinal(n) => (*n).into(),
                        EncryptedValue::Plain(v) => {
                            serde_json::to_value(v).unwrap_or(serde_json::Value::Null)
                        }
                    };
                    (name.clone(), json)
                })
                .collect(),
        )
    }

    /// Reads an engine body back, using `specs` to tell the stored forms apart.
    ///
    /// Fields `specs` does not resolve are read as plaintext passthrough.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionFailed` if `body` is not an object or a
    /// field does not hold the form its kind is stored in.
    pub fn from_json(body: &serde_json::Value, specs: &FieldSpecs) -> Result<Self, Error> {
        let fields = body
            .as_object()
            .ok_or_else(|| Error::DecryptionFailed("document body is not an object".to_string()))?;

        let mut out = Self::new();
        for (name, json) in fields {
            let bad_form = || {
                Error::DecryptionFailed(format!("field `{name}` has an unexpected stored form"))
            };
            let value = match specs.resolve_stored(name) {
                Some((FieldKind::Raw, _)) => {
                    EncryptedValue::Token(json.as_str().ok_or_else(bad_form)?.to_string())
                }
                Some((FieldKind::FullText, _)) => {
                    EncryptedValue::Tokens(json.as_str().ok_or_else(bad_form)?.to_string())
                }
                Some((FieldKind::Integer | FieldKind::Date | FieldKind::Time, _)) => {
                    EncryptedValue::Ordinal(json.as_u64().ok_or_else(bad_form)?)
                }
                None => EncryptedValue::Plain(Value::deserialize(json).map_err(|_| bad_form())?),
            };
            out.insert(name.clone(), value);
        }
        Ok(out)
    }
}

/// A decrypted field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Exact plaintext
    Value(Value),
    /// Full-text token alternatives per group; the original text is not
    /// recoverable from these, use the `_raw` companion for that
    Tokens(Vec<Vec<String>>),
}

/// A decrypted document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedDocument {
    fields: BTreeMap<String, Decoded>,
}

impl DecodedDocument {
    /// Sets a field.
    pub fn insert(&mut self, field: impl Into<String>, value: Decoded) {
        self.fields.insert(field.into(), value);
    }

    /// Value of `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Decoded> {
        self.fields.get(field)
    }

    /// Exact plaintext of `field`, if it decodes to one.
    #[must_use]
    pub fn value(&self, field: &str) -> Option<&Value> {
        match self.fields.get(field)? {
            Decoded::Value(value) => Some(value),
            Decoded::Tokens(_) => None,
        }
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Decoded)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}
