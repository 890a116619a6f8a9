use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::model::{Account, Role};

/// Where credentials and account profiles live. Password storage and hashing
/// belong to the implementation.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Option<Account>;
    async fn lookup(&self, username: &str) -> Option<Account>;
    /// Open a client account. Usernames are unique.
    async fn register(
        &self,
        username: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<Account, AccountError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    UsernameTaken(String),
}

impl std::fmt::Display for AccountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountError::UsernameTaken(name) => write!(f, "username {name:?} already exists"),
        }
    }
}

impl std::error::Error for AccountError {}

/// In-process accounts with plaintext passwords. For tests and local runs.
#[derive(Default)]
pub struct StaticAccounts {
    accounts: DashMap<String, (String, Account)>,
}

impl StaticAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: Account, password: &str) {
        self.accounts
            .insert(account.username.clone(), (password.to_string(), account));
    }

    pub fn with_client(self, username: &str, password: &str, first: &str, last: &str, email: &str) -> Self {
        self.insert(account(username, first, last, email, Role::Client), password);
        self
    }

    pub fn with_admin(self, username: &str, password: &str, email: &str) -> Self {
        self.insert(account(username, "Admin", "", email, Role::Admin), password);
        self
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

fn account(username: &str, first: &str, last: &str, email: &str, role: Role) -> Account {
    Account {
        username: username.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: email.to_string(),
        role,
    }
}

#[async_trait]
impl AccountDirectory for StaticAccounts {
    async fn authenticate(&self, username: &str, password: &str) -> Option<Account> {
        let entry = self.accounts.get(username)?;
        let (stored, account) = entry.value();
        (stored == password).then(|| account.clone())
    }

    async fn lookup(&self, username: &str) -> Option<Account> {
        self.accounts.get(username).map(|e| e.value().1.clone())
    }

    async fn register(
        &self,
        username: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<Account, AccountError> {
        match self.accounts.entry(username.to_string()) {
            Entry::Occupied(_) => Err(AccountError::UsernameTaken(username.to_string())),
            Entry::Vacant(slot) => {
                let created = account(username, first_name, last_name, email, Role::Client);
                slot.insert((password.to_string(), created.clone()));
                Ok(created)
            }
        }
    }
}
