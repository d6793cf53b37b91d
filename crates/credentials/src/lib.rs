use brokergate_core::{Credential, DataError};
use std::fs;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

/// Broker credentials kept in a single JSON file.
///
/// The file holds an array of [`Credential`] entries; the entry flagged
/// `selected` is the one the backend acts on behalf of. The file is re-read
/// on every operation, since the active token can change between requests
/// and knowing sandbox vs. production is critical.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// All stored credentials. A missing file reads as an empty list.
    pub fn list(&self) -> Result<Vec<Credential>, DataError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                DataError::ParseError(format!(
                    "Credential file {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(DataError::IoError(e)),
        }
    }

    /// The currently selected credential, if any.
    pub fn selected(&self) -> Result<Option<Credential>, DataError> {
        Ok(self.list()?.into_iter().find(|c| c.selected))
    }

    /// Store a new token. The first credential ever added becomes the
    /// selected one; adding a token that already exists changes nothing.
    pub fn add(&self, token: &str, is_sandbox: bool) -> Result<Credential, DataError> {
        let mut credentials = self.list()?;
        if let Some(existing) = credentials.iter().find(|c| c.token == token) {
            return Ok(existing.clone());
        }

        let mut credential = Credential::new(token, is_sandbox);
        if credentials.is_empty() {
            credential.selected = true;
        }
        credentials.push(credential.clone());
        self.write_all(&credentials)?;
        debug!(is_sandbox, "Credential added");
        Ok(credential)
    }

    /// Delete a token.
    pub fn remove(&self, token: &str) -> Result<(), DataError> {
        let mut credentials = self.list()?;
        let before = credentials.len();
        credentials.retain(|c| c.token != token);
        if credentials.len() == before {
            return Err(DataError::NotFound("credential not found".into()));
        }
        self.write_all(&credentials)?;
        debug!("Credential removed");
        Ok(())
    }

    /// Mark a token as the selected one, clearing the flag everywhere else.
    pub fn select(&self, token: &str) -> Result<(), DataError> {
        let mut credentials = self.list()?;
        if !credentials.iter().any(|c| c.token == token) {
            return Err(DataError::NotFound("credential not found".into()));
        }
        for credential in credentials.iter_mut() {
            credential.selected = credential.token == token;
        }
        self.write_all(&credentials)?;
        debug!("Credential selected");
        Ok(())
    }

    /// Attach an account id to a token.
    pub fn set_account(&self, token: &str, account_id: &str) -> Result<Credential, DataError> {
        let mut credentials = self.list()?;
        let credential = credentials
            .iter_mut()
            .find(|c| c.token == token)
            .ok_or_else(|| DataError::NotFound("credential not found".into()))?;
        credential.account_id = Some(account_id.to_string());
        let updated = credential.clone();
        self.write_all(&credentials)?;
        Ok(updated)
    }

    /// Rewrite the whole file. Writes go to a temp file in the same
    /// directory and are renamed into place so a concurrent reader never
    /// observes a half-written list.
    fn write_all(&self, credentials: &[Credential]) -> Result<(), DataError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string(credentials)
            .map_err(|e| DataError::ParseError(format!("Serialize credentials: {}", e)))?;
        let tmp = self.path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
