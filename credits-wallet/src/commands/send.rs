//! Send command: turn part of the balance into a token

use anyhow::{anyhow, Result};

use super::{open_wallet, print_diagnostics, print_error, print_success, print_warning, prompt_confirm, Context};

/// Run the send command
pub async fn run(ctx: &Context, amount: u64, memo: Option<String>, skip_confirm: bool) -> Result<()> {
    if amount == 0 {
        return Err(anyhow!("Amount must be greater than 0"));
    }

    let wallet = open_wallet(ctx).await?;
    let unit = wallet.settings().unit.clone();
    let balance = wallet.balance().await;

    println!();
    println!("Balance: {} {}", balance, unit);

    if !skip_confirm {
        print_warning("Tokens are bearer instruments: anyone holding the token can spend it.");
        if !prompt_confirm(&format!("Create a token for {} {}?", amount, unit))? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let created = match wallet.create_token(amount).await {
        Ok(created) => created,
        Err(e) => {
            print_error(&e.to_string());
            if let Some(diag) = e.diagnostics() {
                print_diagnostics(diag);
            }
            return Err(e.into());
        }
    };

    let token = match memo {
        Some(memo) => created.token.clone().with_memo(memo),
        None => created.token.clone(),
    };
    let encoded = token.encode()?;

    println!();
    print_success(&format!("Token for {} {}:", created.amount(), unit));
    println!();
    println!("{}", encoded);
    println!();
    if !created.change.is_empty() {
        println!(
            "Swap returned {} change proofs.",
            created.change.len()
        );
    }
    println!("Remaining balance: {} {}", wallet.balance().await, unit);

    Ok(())
}
