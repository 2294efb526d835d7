//! Per-field-kind encoding on top of the [`CipherSuite`].
//!
//! | Kind       | Encrypted form                                  | Queries          |
//! |------------|-------------------------------------------------|------------------|
//! | `Raw`      | deterministic token of the whole value          | equality         |
//! | `FullText` | groups of deterministic n-gram tokens + `_raw`  | term, phrase     |
//! | `Date`     | order-preserving day ordinal                    | range            |
//! | `Time`     | order-preserving second of the day              | range            |
//! | `Integer`  | order-preserving integer                        | range            |
//!
//! Full-text wire form: tokens of one group are joined with
//! [`TOKEN_SEPARATOR`], groups with [`GROUP_SEPARATOR`]. Neither character
//! occurs in base64, so splitting is unambiguous.

use crate::cipher_suite::CipherSuite;
use crate::document::{Decoded, EncryptedValue, Value};
use crate::error::Error;
use crate::field::FieldKind;
use crate::tokenizer::TokenGroup;

/// Separator between token ciphertexts of one group.
pub const TOKEN_SEPARATOR: char = '|';

/// Separator between groups.
pub const GROUP_SEPARATOR: char = ' ';

/// Field encoder/decoder.
#[derive(Debug, Clone)]
pub struct Codec {
    suite: CipherSuite,
}

impl Codec {
    /// Creates a codec over `suite`.
    #[must_use]
    pub const fn new(suite: CipherSuite) -> Self {
        Self { suite }
    }

    /// The underlying cipher suite.
    #[must_use]
    pub const fn suite(&self) -> &CipherSuite {
        &self.suite
    }

    /// Checks that `value` fits `kind`.
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` if it does not.
    pub fn check_type(field: &str, kind: FieldKind, value: &Value) -> Result<(), Error> {
        let fits = matches!(
            (kind, value),
            (FieldKind::Raw | FieldKind::FullText, Value::Text(_))
                | (FieldKind::Date, Value::Date(_))
                | (FieldKind::Time, Value::Time(_))
                | (FieldKind::Integer, Value::Integer(_))
        );
        if fits {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                field: field.to_string(),
                expected: kind,
                found: value.type_name(),
            })
        }
    }

    /// Text of a full-text value.
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` if `value` is not text.
    pub fn full_text_input<'a>(field: &str, value: &'a Value) -> Result<&'a str, Error> {
        Self::check_type(field, FieldKind::FullText, value)?;
        Ok(value.as_text().unwrap_or_default())
    }

    /// Encodes a value of a non-full-text kind.
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` on a type mismatch, `Error::OutOfRange`
    /// for values outside the integer domain, and `Error::EncryptionFailed`
    /// if called for a full-text field.
    pub fn encode_scalar(
        &self,
        field: &str,
        kind: FieldKind,
        value: &Value,
    ) -> Result<EncryptedValue, Error> {
        Self::check_type(field, kind, value)?;
        match (kind, value) {
            (FieldKind::Raw, Value::Text(text)) => {
                self.suite.encrypt_str(text).map(EncryptedValue::Token)
            }
            (FieldKind::Integer, Value::Integer(n)) => {
                self.suite.encrypt_int(*n).map(EncryptedValue::Ordinal)
            }
            (FieldKind::Date, Value::Date(date)) => {
                self.suite.encrypt_date(*date).map(EncryptedValue::Ordinal)
            }
            (FieldKind::Time, Value::Time(time)) => {
                self.suite.encrypt_time(*time).map(EncryptedValue::Ordinal)
            }
            _ => Err(Error::EncryptionFailed(format!(
                "field `{field}` is {kind} and needs tokenized input"
            ))),
        }
    }

    /// Encodes a full-text value from its token groups.
    ///
    /// Returns the tokens value and the `_raw` companion value.
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` if `value` is not text.
    pub fn encode_full_text(
        &self,
        field: &str,
        value: &Value,
        groups: &[TokenGroup],
    ) -> Result<(EncryptedValue, EncryptedValue), Error> {
        let text = Self::full_text_input(field, value)?;
        let tokens = self.encrypt_groups(groups)?;
        let raw = self.suite.encrypt_str(text)?;
        Ok((EncryptedValue::Tokens(tokens), EncryptedValue::Token(raw)))
    }

    /// Encrypts token groups into the full-text wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt_groups(&self, groups: &[TokenGroup]) -> Result<String, Error> {
        let mut out = String::new();
        for (i, group) in groups.iter().enumerate() {
            if i > 0 {
                out.push(GROUP_SEPARATOR);
            }
            for (j, token) in group.tokens.iter().enumerate() {
                if j > 0 {
                    out.push(TOKEN_SEPARATOR);
                }
                out.push_str(&self.suite.encrypt_str(token)?);
            }
        }
        Ok(out)
    }

    /// Decrypts the full-text wire form into token alternatives per group.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionFailed` if any token fails to decrypt.
    pub fn decrypt_groups(&self, wire: &str) -> Result<Vec<Vec<String>>, Error> {
        wire.split(GROUP_SEPARATOR)
            .filter(|group| !group.is_empty())
            .map(|group| {
                group.split(TOKEN_SEPARATOR).map(|token| self.suite.decrypt_str(token)).collect()
            })
            .collect()
    }

    /// Decodes a stored value of `kind`.
    ///
    /// Full-text values decode to [`Decoded::Tokens`]; everything else to an
    /// exact [`Decoded::Value`].
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionFailed` if decryption fails or the stored
    /// form does not belong to `kind`.
    pub fn decode(
        &self,
        field: &str,
        kind: FieldKind,
        value: &EncryptedValue,
    ) -> Result<Decoded, Error> {
        let decoded = match (kind, value) {
            (FieldKind::Raw, EncryptedValue::Token(ct)) => {
                Decoded::Value(Value::Text(self.suite.decrypt_str(ct)?))
            }
            (FieldKind::FullText, EncryptedValue::Tokens(wire)) => {
                Decoded::Tokens(self.decrypt_groups(wire)?)
            }
            (FieldKind::Integer, EncryptedValue::Ordinal(ct)) => {
                Decoded::Value(Value::Integer(self.suite.decrypt_int(*ct)?))
            }
            (FieldKind::Date, EncryptedValue::Ordinal(ct)) => {
                Decoded::Value(Value::Date(self.suite.decrypt_date(*ct)?))
            }
            (FieldKind::Time, EncryptedValue::Ordinal(ct)) => {
                Decoded::Value(Value::Time(self.suite.decrypt_time(*ct)?))
            }
            _ => {
                return Err(Error::DecryptionFailed(format!(
                    "field `{field}` holds a value that is not {kind} ciphertext"
                )))
            }
        };
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalyzerConfig, SuiteConfig};
    use crate::tokenizer::EdgeNgramTokenizer;
    use chrono::{NaiveDate, NaiveTime};
    use secrecy::SecretVec;

    fn codec() -> Codec {
        let key = SecretVec::new(b"key goes here!!!".to_vec());
        let suite = CipherSuite::new(key, SuiteConfig::default()).unwrap();
        Codec::new(suite)
    }

    fn groups(text: &str) -> Vec<TokenGroup> {
        EdgeNgramTokenizer::new(AnalyzerConfig::default()).unwrap().tokenize_local(text)
    }

    #[test]
    fn test_scalar_round_trips() {
        let codec = codec();
        let cases = [
            (FieldKind::Raw, Value::from("Kim Chong Un")),
            (FieldKind::Integer, Value::from(1234)),
            (FieldKind::Date, Value::Date(NaiveDate::from_ymd_opt(2010, 1, 1).unwrap())),
            (FieldKind::Time, Value::Time(NaiveTime::from_hms_opt(11, 12, 13).unwrap())),
        ];

        for (kind, value) in cases {
            let encoded = codec.encode_scalar("f", kind, &value).unwrap();
            assert_eq!(codec.decode("f", kind, &encoded).unwrap(), Decoded::Value(value));
        }
    }

    #[test]
    fn test_full_text_wire_form() {
        let codec = codec();
        let value = Value::from("Foo BAR!");
        let (tokens, raw) = codec.encode_full_text("text", &value, &groups("Foo BAR!")).unwrap();

        let EncryptedValue::Tokens(wire) = &tokens else { panic!("expected tokens") };
        let groups: Vec<&str> = wire.split(GROUP_SEPARATOR).collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].split(TOKEN_SEPARATOR).count(), 2);

        let suite = codec.suite();
        let fo = suite.encrypt_str("Fo").unwrap();
        let foo = suite.encrypt_str("Foo").unwrap();
        assert_eq!(groups[0], format!("{fo}|{foo}"));

        assert_eq!(raw, EncryptedValue::Token(suite.encrypt_str("Foo BAR!").unwrap()));
    }

    #[test]
    fn test_full_text_decodes_to_alternatives() {
        let codec = codec();
        let value = Value::from("Foo BAR!");
        let (tokens, raw) = codec.encode_full_text("text", &value, &groups("Foo BAR!")).unwrap();

        let decoded = codec.decode("text", FieldKind::FullText, &tokens).unwrap();
        assert_eq!(
            decoded,
            Decoded::Tokens(vec![
                vec!["Fo".to_string(), "Foo".to_string()],
                vec!["BA".to_string(), "BAR".to_string()],
            ])
        );
        assert_eq!(codec.decode("text_raw", FieldKind::Raw, &raw).unwrap(), Decoded::Value(value));
    }

    #[test]
    fn test_empty_full_text() {
        let codec = codec();
        let (tokens, _) = codec.encode_full_text("text", &Value::from("!!"), &[]).unwrap();
        assert_eq!(tokens, EncryptedValue::Tokens(String::new()));
        let decoded = codec.decode("text", FieldKind::FullText, &tokens).unwrap();
        assert_eq!(decoded, Decoded::Tokens(Vec::new()));
    }

    #[test]
    fn test_type_mismatch() {
        let codec = codec();
        let err =
            codec.encode_scalar("value", FieldKind::Integer, &Value::from("1234")).unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch { ref field, expected: FieldKind::Integer, found: "text" }
                if field == "value"
        ));

        let err = codec.encode_full_text("text", &Value::from(5), &[]).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { expected: FieldKind::FullText, .. }));
    }

    #[test]
    fn test_full_text_needs_tokens() {
        let codec = codec();
        let result = codec.encode_scalar("text", FieldKind::FullText, &Value::from("abc"));
        assert!(matches!(result, Err(Error::EncryptionFailed(_))));
    }

    #[test]
    fn test_out_of_range_integer() {
        let codec = codec();
        let result = codec.encode_scalar("value", FieldKind::Integer, &Value::from(-5));
        assert!(matches!(result, Err(Error::OutOfRange { value: -5, .. })));
    }

    #[test]
    fn test_decode_rejects_wrong_form() {
        let codec = codec();
        let stored = EncryptedValue::Token("QQ==".to_string());
        let result = codec.decode("value", FieldKind::Integer, &stored);
        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }
}
