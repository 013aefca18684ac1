use anyhow::Result;
use russh::keys::PublicKey;
use tracing::warn;

/// Parse an OpenSSH authorized_keys line (`<algo> <base64> [comment]`) into a PublicKey
pub fn parse_authorized_key(line: &str) -> Result<PublicKey> {
    let key = russh::keys::parse_public_key_base64(
        line.split_whitespace()
            .nth(1)
            .ok_or_else(|| anyhow::anyhow!("invalid authorized_key format: {}", line))?,
    )
    .map_err(|e| anyhow::anyhow!("failed to parse public key: {}", e))?;
    Ok(key)
}

/// One line of a published key listing.
#[derive(Debug, Clone)]
pub enum AuthorizedKey {
    Parsed(PublicKey),
    /// A line that could not be parsed. Kept so the failure stays visible;
    /// it never matches a presented key.
    Unparsable { line: String, reason: String },
}

impl AuthorizedKey {
    pub fn from_line(line: &str) -> Self {
        match parse_authorized_key(line) {
            Ok(key) => AuthorizedKey::Parsed(key),
            Err(e) => AuthorizedKey::Unparsable {
                line: line.to_string(),
                reason: e.to_string(),
            },
        }
    }

    pub fn as_parsed(&self) -> Option<&PublicKey> {
        match self {
            AuthorizedKey::Parsed(key) => Some(key),
            AuthorizedKey::Unparsable { .. } => None,
        }
    }

    pub fn matches(&self, presented: &PublicKey) -> bool {
        self.as_parsed().is_some_and(|k| keys_equal(presented, k))
    }
}

/// Compare key material only; comments never take part in the decision.
pub fn keys_equal(a: &PublicKey, b: &PublicKey) -> bool {
    a.key_data() == b.key_data()
}

/// Ordered, immutable set of keys published for one account.
#[derive(Debug, Clone, Default)]
pub struct AuthorizedKeySet {
    entries: Vec<AuthorizedKey>,
}

impl AuthorizedKeySet {
    pub fn new(entries: Vec<AuthorizedKey>) -> Self {
        Self { entries }
    }

    /// Parse a newline-separated listing. Blank lines are not entries;
    /// malformed lines are kept as `Unparsable` and logged.
    pub fn parse_listing(body: &str) -> Self {
        let entries = body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let entry = AuthorizedKey::from_line(line);
                if let AuthorizedKey::Unparsable { reason, .. } = &entry {
                    warn!(error = %reason, key_line = %line, "Failed to parse published key");
                }
                entry
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[AuthorizedKey] {
        &self.entries
    }

    pub fn parsed(&self) -> impl Iterator<Item = &PublicKey> {
        self.entries.iter().filter_map(AuthorizedKey::as_parsed)
    }

    pub fn parsed_count(&self) -> usize {
        self.parsed().count()
    }

    pub fn unparsable_count(&self) -> usize {
        self.entries.len() - self.parsed_count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequential scan, first match wins.
    pub fn contains(&self, presented: &PublicKey) -> bool {
        self.entries.iter().any(|entry| entry.matches(presented))
    }
}
