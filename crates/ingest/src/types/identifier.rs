//! Compound client identifier codec.
//!
//! Clients identify themselves with `name@version@sessionId[@walletTag]`:
//!
//! | Segment | Format |
//! |---------|--------|
//! | `name` | 2–50 ASCII alphanumerics or hyphens |
//! | `version` | `MAJOR.MINOR.PATCH` with an optional `-prerelease` suffix |
//! | `sessionId` | canonical lowercase hyphenated UUID (36 chars) |
//! | `walletTag` | optional 8-char alphanumeric tag (truncated wallet address) |
//!
//! # Examples
//!
//! ```
//! use sonar_ingest::types::ClientIdentifier;
//!
//! let id = ClientIdentifier::parse("web@1.0.0@11111111-1111-1111-1111-111111111111").unwrap();
//! assert_eq!(id.name(), "web");
//! assert_eq!(id.session_id(), "11111111-1111-1111-1111-111111111111");
//! assert!(id.wallet_tag().is_none());
//!
//! // Lenient extraction only looks at the third segment.
//! assert_eq!(
//!     ClientIdentifier::extract_session_id("!!@?@abc"),
//!     Some("abc")
//! );
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::IdentifierError;

/// Separator between identifier segments.
pub const SEGMENT_SEPARATOR: char = '@';

/// Length of the truncated wallet tag.
pub const WALLET_TAG_LEN: usize = 8;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]{2,50}$").expect("static pattern"));

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)(-[0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*)?$")
        .expect("static pattern")
});

static SESSION_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("static pattern")
});

static WALLET_TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{8}$").expect("static pattern"));

/// A validated client identifier.
///
/// Constructed only through [`ClientIdentifier::parse`] or
/// [`ClientIdentifier::new`], both of which validate every segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentifier {
    name: String,
    version: String,
    session_id: String,
    wallet_tag: Option<String>,
}

impl ClientIdentifier {
    /// Builds an identifier from its parts, validating each one.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        session_id: impl Into<String>,
        wallet_tag: Option<String>,
    ) -> Result<Self, IdentifierError> {
        let id = Self {
            name: name.into(),
            version: version.into(),
            session_id: session_id.into(),
            wallet_tag,
        };
        id.validate()?;
        Ok(id)
    }

    /// Parses and fully validates a raw identifier.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let segments: Vec<&str> = raw.split(SEGMENT_SEPARATOR).collect();
        match segments.as_slice() {
            [name, version, session_id] => Self::new(*name, *version, *session_id, None),
            [name, version, session_id, tag] => {
                Self::new(*name, *version, *session_id, Some((*tag).to_string()))
            }
            _ => Err(invalid(format!(
                "expected 3 or 4 '@'-separated segments, found {}",
                segments.len()
            ))),
        }
    }

    /// Returns the third segment of a raw identifier without validating anything.
    ///
    /// Returns `None` when the identifier has fewer than three segments.
    pub fn extract_session_id(raw: &str) -> Option<&str> {
        raw.split(SEGMENT_SEPARATOR).nth(2)
    }

    /// Checks that `session_id` is a canonical lowercase hyphenated UUID.
    pub fn check_session_id(session_id: &str) -> Result<(), IdentifierError> {
        if SESSION_ID_PATTERN.is_match(session_id) {
            Ok(())
        } else {
            Err(invalid(format!("malformed session id '{}'", session_id)))
        }
    }

    fn validate(&self) -> Result<(), IdentifierError> {
        if !NAME_PATTERN.is_match(&self.name) {
            return Err(invalid(format!("malformed name '{}'", self.name)));
        }
        if !VERSION_PATTERN.is_match(&self.version) {
            return Err(invalid(format!("malformed version '{}'", self.version)));
        }
        Self::check_session_id(&self.session_id)?;
        if let Some(tag) = &self.wallet_tag
            && !WALLET_TAG_PATTERN.is_match(tag)
        {
            return Err(invalid(format!("malformed wallet tag '{}'", tag)));
        }
        Ok(())
    }

    /// Application name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Application version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Truncated wallet tag, if a wallet was associated.
    pub fn wallet_tag(&self) -> Option<&str> {
        self.wallet_tag.as_deref()
    }
}

fn invalid(reason: String) -> IdentifierError {
    IdentifierError::InvalidFormat { reason }
}

/// Truncates a wallet address to the tag carried in client identifiers.
///
/// Returns `None` when the address is shorter than [`WALLET_TAG_LEN`].
pub fn wallet_tag(address: &str) -> Option<String> {
    let tag: String = address.chars().take(WALLET_TAG_LEN).collect();
    (tag.chars().count() == WALLET_TAG_LEN).then_some(tag)
}

impl fmt::Display for ClientIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}@{}", self.name, self.version, self.session_id)?;
        if let Some(tag) = &self.wallet_tag {
            write!(f, "@{}", tag)?;
        }
        Ok(())
    }
}

impl FromStr for ClientIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
