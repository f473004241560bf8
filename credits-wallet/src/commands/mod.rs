//! CLI Commands
//!
//! Implementation of all wallet CLI commands.

pub mod balance;
pub mod check;
pub mod history;
pub mod receive;
pub mod send;

use anyhow::Result;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use zeroize::Zeroizing;

use credits_wallet::{
    CreationDiagnostics, FileStore, HistoryLedger, HttpIssuer, ProofStore,
    ReconciliationService, WalletConfig, WalletCore,
};

/// Environment variable consulted before prompting for the password
pub const PASSWORD_ENV: &str = "CREDITS_WALLET_PASSWORD";

/// Resolved command-line settings shared by all commands
pub struct Context {
    pub config: WalletConfig,
    pub wallet_path: PathBuf,
}

/// Prompt for password input (hidden)
pub fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(Zeroizing::new(password));
    }

    print!("{}", prompt);
    io::stdout().flush()?;

    let password = rpassword::read_password()?;
    Ok(Zeroizing::new(password))
}

/// Prompt for confirmation
pub fn prompt_confirm(message: &str) -> Result<bool> {
    print!("{} [y/N]: ", message);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y") || input.trim().eq_ignore_ascii_case("yes"))
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("\x1b[31mError:\x1b[0m {}", message);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("\x1b[32m{}\x1b[0m", message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("\x1b[33mWarning:\x1b[0m {}", message);
}

/// Print the details attached to a failed token creation
pub fn print_diagnostics(diag: &CreationDiagnostics) {
    println!();
    println!("  Requested:  {}", diag.requested_amount);
    println!("  Available:  {}", diag.available_balance);
    if !diag.denominations.is_empty() {
        let held: Vec<String> = diag
            .denominations
            .iter()
            .map(|(amount, count)| format!("{}x{}", count, amount))
            .collect();
        println!("  Held:       {}", held.join(", "));
    }
    if !diag.partial_selection.is_empty() {
        println!("  Selected:   {:?}", diag.partial_selection);
    }
    println!();
    println!("Suggestion: {}", diag.suggestion);
}

/// Open the proof file, wire up history and reconciliation, and load
pub async fn open_wallet(ctx: &Context) -> Result<WalletCore> {
    let password = prompt_password("Enter wallet password: ")?;
    let file_store = FileStore::open(&ctx.wallet_path, &password).await?;
    let key = file_store.sealing_key().clone();
    let store: Arc<dyn ProofStore> = Arc::new(file_store);

    let issuer = HttpIssuer::with_timeout(&ctx.config.issuer_url, ctx.config.request_timeout())?;
    let reconciler = ReconciliationService::new(Arc::new(issuer));
    let history = HistoryLedger::new(store.clone(), key);

    let wallet = ctx
        .config
        .build_wallet(store)
        .with_reconciler(Arc::new(reconciler))
        .with_history(Arc::new(history));
    wallet.load().await?;
    Ok(wallet)
}
