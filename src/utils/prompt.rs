//! Yes/no prompts for destructive commands

use anyhow::Result;
use std::io::{self, Write};

/// Ask a yes/no question on the terminal
///
/// Empty input picks `default`.
pub fn confirm(message: &str, default: bool) -> Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    print!("{} {} ", message, hint);
    io::stdout().flush()?;

    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(parse_answer(&response, default))
}

fn parse_answer(response: &str, default: bool) -> bool {
    match response.trim().to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}
