//! Classify command implementation.

use super::{CommandResult, CommandStatus};
use fieldseal_core::crypto::classify;
use std::io::Read;

/// Prints the format of one stored value.
pub fn run(value: &str) -> CommandResult {
    let value = if value == "-" {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        input.trim_end_matches(['\r', '\n']).to_string()
    } else {
        value.to_string()
    };

    println!("{}", classify(&value));
    Ok(CommandStatus::Success)
}
