//! Balance check command

use anyhow::Result;
use credits_wallet::proof::denomination_histogram;

use super::{open_wallet, print_success, Context};

/// Run the balance command
pub async fn run(ctx: &Context, detailed: bool) -> Result<()> {
    let wallet = open_wallet(ctx).await?;
    let proofs = wallet.proofs().await;
    let unit = &wallet.settings().unit;

    println!();
    print_success(&format!("Balance: {} {}", wallet.balance().await, unit));
    println!("Issuer:  {}", wallet.settings().issuer_url);

    if detailed && !proofs.is_empty() {
        println!();
        println!("Proofs ({}):", proofs.len());
        println!("{:<12} {:<8}", "Amount", "Count");
        println!("{}", "-".repeat(20));
        for (amount, count) in denomination_histogram(&proofs) {
            println!("{:<12} {:<8}", amount, count);
        }
    }

    Ok(())
}
