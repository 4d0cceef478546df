//! Local account state: login flag and token ledger

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use lumen_ask::{AuthGate, Error, Result, UsageReceipt, UsageReporter};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AccountState {
    logged_in: bool,
    used_tokens: u64,
    remaining_tokens: Option<u64>,
}

/// File-backed account implementing the auth and billing ports.
pub struct FileAccount {
    path: PathBuf,
    state: Mutex<AccountState>,
}

impl FileAccount {
    /// Get the default account file path
    pub fn account_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lumen")
            .join("account.json")
    }

    /// Load the account from the default path
    pub fn load() -> Self {
        Self::load_from(Self::account_path())
    }

    /// Load the account from a specific path
    pub fn load_from(path: PathBuf) -> Self {
        let state = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Mark the account as logged in
    pub fn login(&self) -> std::io::Result<()> {
        let mut state = self.state.lock();
        state.logged_in = true;
        self.persist(&state)
    }

    /// Mark the account as logged out
    pub fn logout(&self) -> std::io::Result<()> {
        let mut state = self.state.lock();
        state.logged_in = false;
        self.persist(&state)
    }

    fn persist(&self, state: &AccountState) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(state)?)
    }
}

impl AuthGate for FileAccount {
    fn is_authenticated(&self) -> bool {
        self.state.lock().logged_in
    }
}

#[async_trait]
impl UsageReporter for FileAccount {
    async fn report_tokens_used(&self, total_tokens: u32) -> Result<UsageReceipt> {
        let mut state = self.state.lock();
        state.used_tokens += u64::from(total_tokens);
        if let Some(remaining) = state.remaining_tokens.as_mut() {
            *remaining = remaining.saturating_sub(u64::from(total_tokens));
        }
        let remaining = state.remaining_tokens;

        self.persist(&state)
            .map_err(|e| Error::UsageReport(e.to_string()))?;

        Ok(UsageReceipt {
            success: true,
            remaining,
        })
    }
}
