//! Receive command

use anyhow::Result;
use credits_wallet::Token;

use super::{open_wallet, print_error, print_success, Context};

/// Run the receive command
pub async fn run(ctx: &Context, encoded: &str) -> Result<()> {
    // Decode before asking for the password
    let token = match Token::decode(encoded) {
        Ok(token) => token,
        Err(e) => {
            print_error(&e.to_string());
            return Err(e.into());
        }
    };

    let wallet = open_wallet(ctx).await?;
    let received = wallet.receive_token(&token).await?;

    println!();
    if let Some(memo) = &token.memo {
        println!("Memo: {}", memo);
    }
    print_success(&format!("Received {} {}", received, token.unit));
    println!("Balance: {} {}", wallet.balance().await, token.unit);

    Ok(())
}
