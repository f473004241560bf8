//! Spending history command

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};

use super::{open_wallet, print_warning, Context};

/// Run the history command
pub async fn run(ctx: &Context, limit: usize) -> Result<()> {
    let wallet = open_wallet(ctx).await?;
    let ledger = wallet
        .history()
        .ok_or_else(|| anyhow!("History is not enabled for this wallet"))?;

    let readout = ledger.read().await?;

    if readout.records.is_empty() {
        println!();
        println!("No transactions found.");
    } else {
        println!();
        println!(
            "{:<18} {:<5} {:>12} {:<6}",
            "Time", "Dir", "Amount", "Unit"
        );
        println!("{}", "-".repeat(44));

        for record in readout.records.iter().take(limit) {
            let time = Utc
                .timestamp_opt(record.timestamp as i64, 0)
                .single()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            let sign = match record.direction {
                credits_wallet::Direction::In => "+",
                credits_wallet::Direction::Out => "-",
            };
            println!(
                "{:<18} {:<5} {:>12} {:<6}",
                time,
                record.direction,
                format!("{}{}", sign, record.amount),
                record.unit
            );
        }

        if readout.records.len() > limit {
            println!();
            println!(
                "Showing {} of {} entries. Use --limit to see more.",
                limit,
                readout.records.len()
            );
        }
    }

    if !readout.skipped.is_empty() {
        println!();
        print_warning(&format!(
            "{} history entries could not be read and were skipped.",
            readout.skipped.len()
        ));
    }
    println!();

    Ok(())
}
