//! Credential records and their plaintext line format.
//!
//! The decrypted store is UTF-8 text with one record per line:
//!
//! ```text
//! service:username:secret
//! ```
//!
//! Only the first two separators split fields, so a secret may itself contain
//! `:`. Service and username may not, and no field may contain a line break.
//! Those rules are enforced when a record is built, so anything that reaches
//! [`serialize`] parses back to the same record.

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

/// Field separator in the plaintext format.
pub const SEPARATOR: char = ':';

/// One stored credential.
#[derive(Debug)]
pub struct CredentialRecord {
    service: String,
    username: String,
    secret: SecretString,
}

impl CredentialRecord {
    /// Build a record, rejecting values the line format cannot represent.
    pub fn new(
        service: impl Into<String>,
        username: impl Into<String>,
        secret: SecretString,
    ) -> Result<Self> {
        let service = service.into();
        let username = username.into();

        Self::check_fields(&service, &username)?;
        if has_line_break(secret.expose_secret()) {
            return Err(VaultError::InvalidRecord(
                "secret must not contain line breaks".to_string(),
            ));
        }

        Ok(Self {
            service,
            username,
            secret,
        })
    }

    /// Validate service and username on their own, e.g. before prompting
    /// for a secret.
    pub fn check_fields(service: &str, username: &str) -> Result<()> {
        validate_key_field("service", service)?;
        validate_key_field("username", username)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    fn encoded_len(&self) -> usize {
        self.service.len() + self.username.len() + self.secret.expose_secret().len() + 3
    }
}

impl Clone for CredentialRecord {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            username: self.username.clone(),
            secret: SecretString::from(self.secret.expose_secret().to_owned()),
        }
    }
}

impl PartialEq for CredentialRecord {
    fn eq(&self, other: &Self) -> bool {
        self.service == other.service
            && self.username == other.username
            && self.secret.expose_secret() == other.secret.expose_secret()
    }
}

impl Eq for CredentialRecord {}

fn has_line_break(value: &str) -> bool {
    value.contains(['\n', '\r'])
}

fn validate_key_field(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(VaultError::InvalidRecord(format!("{name} must not be empty")));
    }
    if value.contains(SEPARATOR) {
        return Err(VaultError::InvalidRecord(format!(
            "{name} '{value}' must not contain '{SEPARATOR}'"
        )));
    }
    if has_line_break(value) {
        return Err(VaultError::InvalidRecord(format!(
            "{name} must not contain line breaks"
        )));
    }
    Ok(())
}

/// The full decrypted content of the store file, in stored order.
///
/// Several records may share a service. Lookups return the first match and
/// removals drop every match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialStore {
    records: Vec<CredentialRecord>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<CredentialRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[CredentialRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record after all existing ones.
    pub fn push(&mut self, record: CredentialRecord) {
        self.records.push(record);
    }

    /// First record whose service matches exactly.
    pub fn find(&self, service: &str) -> Option<&CredentialRecord> {
        self.records.iter().find(|r| r.service == service)
    }

    /// Remove every record for `service`, returning how many were dropped.
    pub fn remove_service(&mut self, service: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.service != service);
        before - self.records.len()
    }

    /// Distinct service names in the order they first appear.
    pub fn services(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.service.as_str()))
            .map(|r| r.service.clone())
            .collect()
    }
}

/// Encode the store as plaintext.
///
/// The buffer is sized up front so no partially-filled copy is left behind by
/// a reallocation, and it is wiped when dropped.
pub fn serialize(store: &CredentialStore) -> Zeroizing<Vec<u8>> {
    let capacity = store.records.iter().map(|r| r.encoded_len()).sum();
    let mut out = Zeroizing::new(Vec::with_capacity(capacity));

    for record in &store.records {
        out.extend_from_slice(record.service.as_bytes());
        out.push(SEPARATOR as u8);
        out.extend_from_slice(record.username.as_bytes());
        out.push(SEPARATOR as u8);
        out.extend_from_slice(record.secret.expose_secret().as_bytes());
        out.push(b'\n');
    }

    out
}

/// Decode plaintext produced by [`serialize`].
///
/// Blank lines are skipped. Any other line that is not a valid record fails
/// the whole decode with [`VaultError::CorruptStore`].
pub fn deserialize(plaintext: &[u8]) -> Result<CredentialStore> {
    let mut records = Vec::new();

    for (idx, raw) in plaintext.split(|b| *b == b'\n').enumerate() {
        let line_no = idx + 1;
        if raw.is_empty() {
            continue;
        }

        let line = std::str::from_utf8(raw).map_err(|_| VaultError::CorruptStore {
            line: line_no,
            reason: "not valid UTF-8".to_string(),
        })?;

        let mut fields = line.splitn(3, SEPARATOR);
        let (Some(service), Some(username), Some(secret)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(VaultError::CorruptStore {
                line: line_no,
                reason: "expected service:username:secret".to_string(),
            });
        };

        let record = CredentialRecord::new(
            service,
            username,
            SecretString::from(secret.to_owned()),
        )
        .map_err(|e| VaultError::CorruptStore {
            line: line_no,
            reason: e.to_string(),
        })?;
        records.push(record);
    }

    Ok(CredentialStore { records })
}
