//! Account configuration commands.

use crate::context::DataDir;
use crate::error::{CliError, CliResult};
use crate::http::UreqClient;
use crate::output::{emit, Format};
use feedsync_api::{Capability, Credentials};
use feedsync_engine::{AccountConfig, AccountValidator, Validation};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Account as shown to the user. The password is never printed.
#[derive(Debug, Serialize)]
pub struct AccountView {
    /// Server base URL.
    pub server_url: String,
    /// User name.
    pub username: String,
    /// Local store id.
    pub account_id: String,
    /// Server version from the last validation.
    pub server_version: Option<String>,
    /// Optional API features the server supports.
    pub features: Vec<Capability>,
    /// The server's update job is misconfigured.
    pub cron_warning: bool,
}

impl From<&AccountConfig> for AccountView {
    fn from(account: &AccountConfig) -> Self {
        let caps = account.capabilities.as_ref();
        Self {
            server_url: account.server_url.clone(),
            username: account.credentials.username.clone(),
            account_id: account.account_id().to_string(),
            server_version: caps.map(|c| c.version.to_string()),
            features: caps
                .map(|c| c.features.iter().copied().collect())
                .unwrap_or_default(),
            cron_warning: caps.is_some_and(|c| c.cron_warning),
        }
    }
}

fn print(account: &AccountConfig, format: Format) -> CliResult<()> {
    emit(format, &AccountView::from(account), |view| {
        println!("Server:    {}", view.server_url);
        println!("User:      {}", view.username);
        println!("Store:     {}", view.account_id);
        match &view.server_version {
            Some(version) => println!("Version:   {version}"),
            None => println!("Version:   (not validated)"),
        }
        if !view.features.is_empty() {
            let features: Vec<String> = view.features.iter().map(|f| format!("{f:?}")).collect();
            println!("Features:  {}", features.join(", "));
        }
        if view.cron_warning {
            println!("Warning:   the server's update job is not running correctly");
        }
    })?;
    Ok(())
}

fn probe(candidate: &AccountConfig) -> CliResult<AccountConfig> {
    match AccountValidator::new(UreqClient::new()).probe(candidate) {
        Validation::Valid(caps) => Ok(candidate.clone().with_capabilities(caps)),
        rejected => Err(CliError::Rejected(rejected.to_string())),
    }
}

/// Stores a new account, validating it unless `validate` is false.
pub fn set(
    dir: &Path,
    server: &str,
    user: &str,
    password: &str,
    validate: bool,
    format: Format,
) -> CliResult<()> {
    let candidate = AccountConfig::new(server, Credentials::new(user, password));
    let account = if validate {
        probe(&candidate)?
    } else {
        candidate
    };

    let data = DataDir::new(dir);
    data.save_account(&account)?;
    info!(account = %account.account_id(), "account configured");
    print(&account, format)
}

/// Shows the configured account.
pub fn show(dir: &Path, format: Format) -> CliResult<()> {
    let account = DataDir::new(dir).load_account()?;
    print(&account, format)
}

/// Validates the configured account and records the server's capabilities.
pub fn validate(dir: &Path, format: Format) -> CliResult<()> {
    let data = DataDir::new(dir);
    let current = data.load_account()?;
    let validated = probe(&current)?;
    if validated != current {
        data.save_account(&validated)?;
    }
    print(&validated, format)
}
