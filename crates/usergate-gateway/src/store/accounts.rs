//! Account model and storage.

use std::cmp::Ordering;
use std::path::Path;

use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use usergate_core::{AccountStatus, Identity, PageRequest, Role, SortDirection, SortField};

/// Length of generated account IDs.
pub const ID_LENGTH: usize = 21;

const INDEX_PREFIX: &[u8] = b"idx:";
const MODIFY_ATTEMPTS: usize = 64;

/// Account storage errors.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Email or personal email is already taken.
    #[error("An account already uses {0}")]
    Conflict(String),

    /// No account matches.
    #[error("Account not found: {0}")]
    NotFound(String),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(String),
}

fn storage(context: &str, e: impl std::fmt::Display) -> AccountError {
    AccountError::Storage(format!("{context}: {e}"))
}

/// Whether lookups see disabled accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Only active accounts.
    ActiveOnly,
    /// Active and disabled accounts.
    IncludeDisabled,
}

impl Visibility {
    const fn admits(self, account: &Account) -> bool {
        match self {
            Self::ActiveOnly => account.status.is_active(),
            Self::IncludeDisabled => true,
        }
    }
}

/// Stored account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Unique account ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Login email, unique.
    pub email: String,
    /// Secondary email, unique when present.
    pub personal_email: Option<String>,
    /// Argon2 PHC string. Never exposed through the API.
    pub password_hash: String,
    /// Stored image file name.
    pub image: String,
    /// Role.
    pub role: Role,
    /// Active or disabled.
    pub status: AccountStatus,
    /// When the account was disabled.
    pub disabled_at: Option<DateTime<Utc>>,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// Last modification.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create an active account with a fresh ID.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role: Role,
        image: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            name: name.into(),
            email: email.into(),
            personal_email: None,
            password_hash: password_hash.into(),
            image: image.into(),
            role,
            status: AccountStatus::Active,
            disabled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the personal email.
    #[must_use]
    pub fn with_personal_email(mut self, email: Option<String>) -> Self {
        self.personal_email = email;
        self
    }

    /// Identity carried in this account's session credentials.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(self.id.clone(), self.role)
    }

    /// Check if the account may log in.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Safe version for API responses (no password hash).
    #[must_use]
    pub fn to_public(&self) -> PublicAccount {
        PublicAccount {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            personal_email: self.personal_email.clone(),
            image: self.image.clone(),
            role: self.role,
            status: self.status,
            disabled_at: self.disabled_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Public account representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccount {
    /// Account ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Secondary email.
    pub personal_email: Option<String>,
    /// Image file name.
    pub image: String,
    /// Role.
    pub role: Role,
    /// Active or disabled.
    pub status: AccountStatus,
    /// When disabled.
    pub disabled_at: Option<DateTime<Utc>>,
    /// When created.
    pub created_at: DateTime<Utc>,
    /// Last modification.
    pub updated_at: DateTime<Utc>,
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountPage {
    /// Total accounts, across all pages.
    pub count: usize,
    /// Accounts on this page.
    pub users: Vec<PublicAccount>,
}

/// Generate a random alphanumeric account ID.
#[must_use]
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}

fn email_index(email: &str) -> String {
    format!("idx:email:{email}")
}

fn personal_index(email: &str) -> String {
    format!("idx:personal:{email}")
}

/// Account store backed by sled.
#[derive(Clone)]
pub struct AccountStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl AccountStore {
    /// Open or create an account store under `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, AccountError> {
        let db = sled::open(path.join("accounts"))
            .map_err(|e| storage("Failed to open account database", e))?;
        Self::with_db(db)
    }

    /// Create a store over an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if the tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, AccountError> {
        let tree = db
            .open_tree("accounts")
            .map_err(|e| storage("Failed to open accounts tree", e))?;
        Ok(Self { db, tree })
    }

    /// Get the underlying sled database.
    #[must_use]
    pub const fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Check if any accounts exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Count accounts, disabled ones included.
    #[must_use]
    pub fn count(&self) -> usize {
        self.tree
            .iter()
            .filter(|r| {
                r.as_ref()
                    .map(|(k, _)| !k.starts_with(INDEX_PREFIX))
                    .unwrap_or(false)
            })
            .count()
    }

    /// Point `key` at `id` unless another account holds it.
    fn claim(&self, key: &str, id: &str) -> Result<bool, AccountError> {
        match self
            .tree
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(id.as_bytes()))
        {
            Ok(Ok(())) => Ok(true),
            Ok(Err(cas)) => Ok(cas.current.as_deref() == Some(id.as_bytes())),
            Err(e) => Err(storage("Index error", e)),
        }
    }

    fn release(&self, key: &str) -> Result<(), AccountError> {
        self.tree
            .remove(key.as_bytes())
            .map_err(|e| storage("Index error", e))?;
        Ok(())
    }

    fn write(&self, account: &Account) -> Result<(), AccountError> {
        let value =
            serde_json::to_vec(account).map_err(|e| storage("Serialization error", e))?;
        self.tree
            .insert(account.id.as_bytes(), value)
            .map_err(|e| storage("Insert error", e))?;
        self.tree.flush().map_err(|e| storage("Flush error", e))?;
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Option<Account>, AccountError> {
        if id.as_bytes().starts_with(INDEX_PREFIX) {
            return Ok(None);
        }
        match self.tree.get(id.as_bytes()) {
            Ok(Some(value)) => serde_json::from_slice(&value)
                .map(Some)
                .map_err(|e| storage("Deserialization error", e)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage("Get error", e)),
        }
    }

    /// Create a new account.
    ///
    /// Email uniqueness is enforced atomically on the index keys.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::Conflict` if an email is taken.
    pub fn create(&self, account: &Account) -> Result<(), AccountError> {
        let email_key = email_index(&account.email);
        if !self.claim(&email_key, &account.id)? {
            return Err(AccountError::Conflict(account.email.clone()));
        }

        if let Some(personal) = &account.personal_email {
            if !self.claim(&personal_index(personal), &account.id)? {
                self.release(&email_key)?;
                return Err(AccountError::Conflict(personal.clone()));
            }
        }

        self.write(account)?;
        tracing::debug!(account_id = %account.id, "Account created");
        Ok(())
    }

    /// Get an account by ID.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn find_by_id(
        &self,
        id: &str,
        visibility: Visibility,
    ) -> Result<Option<Account>, AccountError> {
        Ok(self.read(id)?.filter(|a| visibility.admits(a)))
    }

    /// Get an account by login email.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn find_by_email(
        &self,
        email: &str,
        visibility: Visibility,
    ) -> Result<Option<Account>, AccountError> {
        match self.tree.get(email_index(email).as_bytes()) {
            Ok(Some(id)) => self.find_by_id(&String::from_utf8_lossy(&id), visibility),
            Ok(None) => Ok(None),
            Err(e) => Err(storage("Index lookup error", e)),
        }
    }

    /// Apply the profile fields of `account` (name, email, personal email)
    /// to the stored record, moving email indexes as needed.
    ///
    /// Status, role, password, and image are taken from the stored record,
    /// never from the caller's copy.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::NotFound` if the account does not exist, or
    /// `AccountError::Conflict` if a new email is taken.
    pub fn update(&self, account: &Account) -> Result<(), AccountError> {
        let existing = self
            .read(&account.id)?
            .ok_or_else(|| AccountError::NotFound(account.id.clone()))?;

        let email_changed = existing.email != account.email;
        if email_changed && !self.claim(&email_index(&account.email), &account.id)? {
            return Err(AccountError::Conflict(account.email.clone()));
        }

        let personal_changed = existing.personal_email != account.personal_email;
        if personal_changed {
            if let Some(personal) = &account.personal_email {
                if !self.claim(&personal_index(personal), &account.id)? {
                    if email_changed {
                        self.release(&email_index(&account.email))?;
                    }
                    return Err(AccountError::Conflict(personal.clone()));
                }
            }
        }

        let replaced = self.modify(&account.id, |current| {
            current.name.clone_from(&account.name);
            current.email.clone_from(&account.email);
            current.personal_email.clone_from(&account.personal_email);
        });
        let (before, _) = match replaced {
            Ok(pair) => pair,
            Err(e) => {
                if email_changed {
                    self.release(&email_index(&account.email))?;
                }
                if personal_changed {
                    if let Some(personal) = &account.personal_email {
                        self.release(&personal_index(personal))?;
                    }
                }
                return Err(e);
            }
        };

        if before.email != account.email {
            self.release(&email_index(&before.email))?;
        }
        if before.personal_email != account.personal_email {
            if let Some(old) = &before.personal_email {
                self.release(&personal_index(old))?;
            }
        }

        Ok(())
    }

    /// Read-modify-write one record with compare-and-swap against the bytes
    /// read, retrying when a concurrent write lands in between. Returns the
    /// record before and after the change.
    fn modify(
        &self,
        id: &str,
        mut change: impl FnMut(&mut Account),
    ) -> Result<(Account, Account), AccountError> {
        if id.as_bytes().starts_with(INDEX_PREFIX) {
            return Err(AccountError::NotFound(id.to_string()));
        }

        for _ in 0..MODIFY_ATTEMPTS {
            let current = self
                .tree
                .get(id.as_bytes())
                .map_err(|e| storage("Get error", e))?
                .ok_or_else(|| AccountError::NotFound(id.to_string()))?;
            let before: Account = serde_json::from_slice(&current)
                .map_err(|e| storage("Deserialization error", e))?;

            let mut after = before.clone();
            change(&mut after);
            after.updated_at = Utc::now();
            let value =
                serde_json::to_vec(&after).map_err(|e| storage("Serialization error", e))?;

            match self
                .tree
                .compare_and_swap(id.as_bytes(), Some(&current), Some(value))
            {
                Ok(Ok(())) => {
                    self.tree.flush().map_err(|e| storage("Flush error", e))?;
                    return Ok((before, after));
                }
                Ok(Err(_)) => {
                    tracing::debug!(account_id = %id, "Concurrent account write, retrying");
                }
                Err(e) => return Err(storage("Compare-and-swap error", e)),
            }
        }

        Err(AccountError::Storage(format!(
            "Account {id} kept changing under {MODIFY_ATTEMPTS} write attempts"
        )))
    }

    /// Replace the password hash.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::NotFound` if the account does not exist.
    pub fn set_password(&self, id: &str, password_hash: String) -> Result<(), AccountError> {
        self.modify(id, |a| a.password_hash.clone_from(&password_hash))?;
        Ok(())
    }

    /// Replace the image file name.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::NotFound` if the account does not exist.
    pub fn set_image(&self, id: &str, image: String) -> Result<Account, AccountError> {
        self.modify(id, |a| a.image.clone_from(&image))
            .map(|(_, after)| after)
    }

    /// Activate or disable an account, maintaining `disabled_at`.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::NotFound` if the account does not exist.
    pub fn set_status(&self, id: &str, status: AccountStatus) -> Result<Account, AccountError> {
        let (_, account) = self.modify(id, |a| {
            a.status = status;
            a.disabled_at = match status {
                AccountStatus::Active => None,
                AccountStatus::Disabled => Some(Utc::now()),
            };
        })?;
        tracing::info!(account_id = %id, status = %status, "Account status changed");
        Ok(account)
    }

    /// List all accounts, disabled ones included.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn list(&self) -> Result<Vec<Account>, AccountError> {
        let mut accounts = Vec::new();
        for result in self.tree.iter() {
            let (key, value) = result.map_err(|e| storage("Iteration error", e))?;
            if key.starts_with(INDEX_PREFIX) {
                continue;
            }
            let account: Account =
                serde_json::from_slice(&value).map_err(|e| storage("Deserialization error", e))?;
            accounts.push(account);
        }
        Ok(accounts)
    }

    /// One sorted page of accounts, disabled ones included.
    ///
    /// A page past the end is returned empty; callers check bounds against
    /// `count`.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn list_page(&self, request: &PageRequest) -> Result<AccountPage, AccountError> {
        let mut accounts = self.list()?;
        accounts.sort_by(|a, b| {
            let ordering = match request.order_by {
                SortField::Name => compare_folded(&a.name, &b.name),
                SortField::Email => a.email.cmp(&b.email),
            }
            .then_with(|| a.id.cmp(&b.id));
            match request.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let count = accounts.len();
        let users = accounts
            .iter()
            .skip(request.offset())
            .take(request.per_page as usize)
            .map(Account::to_public)
            .collect();

        Ok(AccountPage { count, users })
    }
}

fn compare_folded(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

impl std::fmt::Debug for AccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountStore")
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}
