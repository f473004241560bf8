//! Proof state check command

use anyhow::Result;
use credits_wallet::proof::total_amount;

use super::{open_wallet, print_success, print_warning, Context};

/// Run the check command
pub async fn run(ctx: &Context, prune: bool) -> Result<()> {
    let wallet = open_wallet(ctx).await?;
    let unit = wallet.settings().unit.clone();

    println!();
    println!("Checking proofs at {}...", wallet.settings().issuer_url);

    if prune {
        let removed = wallet.prune_spent().await?;
        if removed.is_empty() {
            print_success("No spent proofs found.");
        } else {
            print_warning(&format!(
                "Removed {} spent proofs worth {} {}",
                removed.len(),
                total_amount(&removed),
                unit
            ));
        }
        println!("Balance: {} {}", wallet.balance().await, unit);
        return Ok(());
    }

    let removable = wallet.check_proofs().await?.spent;
    if removable.is_empty() {
        print_success("All held proofs are redeemable.");
    } else {
        print_warning(&format!(
            "{} proofs worth {} {} are no longer redeemable.",
            removable.len(),
            total_amount(&removable),
            unit
        ));
        println!("Run 'credits-wallet check --prune' to remove them.");
    }

    Ok(())
}
