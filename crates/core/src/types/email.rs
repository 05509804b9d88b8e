//! Email address, the natural key of an account.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Why a string was rejected as an [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email cannot be empty")]
    Empty,
    #[error("email must be at most {max} characters")]
    TooLong { max: usize },
    #[error("email must contain an @ symbol")]
    MissingAtSymbol,
    #[error("email must contain only one @ symbol")]
    MultipleAtSymbols,
    #[error("email local part cannot be empty")]
    EmptyLocalPart,
    #[error("email domain cannot be empty")]
    EmptyDomain,
}

/// A normalized email address.
///
/// Accounts are keyed by email in both the identity cache and the identity
/// store, so two spellings of one address must compare equal. Parsing trims
/// surrounding whitespace and lower-cases the whole address; deserializing
/// goes through the same parser.
///
/// ```
/// use callready_core::Email;
///
/// let email = Email::parse(" Rep@Acme.io ").unwrap();
/// assert_eq!(email.as_str(), "rep@acme.io");
/// assert_eq!(email.local_part(), "rep");
///
/// assert!(Email::parse("no-at-symbol").is_err());
/// assert!(Email::parse("a@b@c").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse and normalize an email.
    ///
    /// # Errors
    ///
    /// Returns an `EmailError` if the trimmed input is empty, longer than
    /// [`Email::MAX_LENGTH`], or not of the form `local@domain` with exactly
    /// one `@` and both sides non-empty.
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        let s = s.trim();

        if s.is_empty() {
            return Err(EmailError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        let (local, domain) = s.split_once('@').ok_or(EmailError::MissingAtSymbol)?;
        if domain.contains('@') {
            return Err(EmailError::MultipleAtSymbols);
        }
        if local.is_empty() {
            return Err(EmailError::EmptyLocalPart);
        }
        if domain.is_empty() {
            return Err(EmailError::EmptyDomain);
        }

        Ok(Self(s.to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// The part before the `@`, used as a default display name.
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.split_once('@').map_or(&self.0, |(local, _)| local)
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Email {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Email {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        // The column has a lower-case CHECK, so stored values are already normalized.
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Email {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_common_shapes() {
        for input in [
            "rep@acme.io",
            "sales.lead+q3@callready.ai",
            "ops@eu.west.example.co.uk",
            "a@b.c",
        ] {
            assert!(Email::parse(input).is_ok(), "{input}");
        }
    }

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let email = Email::parse("  Sales.Lead@CallReady.AI\n").unwrap();
        assert_eq!(email.as_str(), "sales.lead@callready.ai");
        assert_eq!(email, Email::parse("sales.lead@callready.ai").unwrap());
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
        assert_eq!(Email::parse("no-at-symbol"), Err(EmailError::MissingAtSymbol));
        assert_eq!(Email::parse("a@b@c.io"), Err(EmailError::MultipleAtSymbols));
        assert_eq!(Email::parse("@acme.io"), Err(EmailError::EmptyLocalPart));
        assert_eq!(Email::parse("rep@"), Err(EmailError::EmptyDomain));

        let long = format!("{}@acme.io", "a".repeat(250));
        assert_eq!(Email::parse(&long), Err(EmailError::TooLong { max: 254 }));
    }

    #[test]
    fn test_local_part() {
        assert_eq!(Email::parse("Jordan@acme.io").unwrap().local_part(), "jordan");
    }

    #[test]
    fn test_serde_normalizes_and_validates() {
        let email: Email = serde_json::from_str("\"Rep@Acme.io\"").unwrap();
        assert_eq!(email.as_str(), "rep@acme.io");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"rep@acme.io\"");

        assert!(serde_json::from_str::<Email>("\"not-an-email\"").is_err());
    }

    #[test]
    fn test_display_and_from_str() {
        let email: Email = "rep@acme.io".parse().unwrap();
        assert_eq!(email.to_string(), "rep@acme.io");
    }
}
