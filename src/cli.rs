//! Command-line interface
//!
//! `serve` runs the console. The other commands work offline against a cipher
//! table and print their result.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::error::{ConsoleError, Result};
use crate::kohd::{self, Burst, CipherTable};

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the API and the shared-state synchronizer
    Serve,

    /// Encode a message into a datastream burst
    Encode(EncodeArgs),

    /// Inspect or generate cipher tables
    #[command(subcommand)]
    Cipher(CipherCommands),
}

#[derive(Debug, Args)]
pub struct EncodeArgs {
    /// Message to encode
    pub message: String,

    /// Total noise characters around the payload
    #[arg(short, long, default_value = "20")]
    pub noise: usize,

    /// Send the message as plain text inside the wrapper
    #[arg(long)]
    pub decoded: bool,

    /// Cipher table as JSON (defaults to the built-in table)
    #[arg(long)]
    pub cipher: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum CipherCommands {
    /// Print the reverse-lookup grid of a table
    Show {
        /// Cipher table as JSON (defaults to the built-in table)
        #[arg(long)]
        cipher: Option<PathBuf>,
    },

    /// Generate a fresh random table and print it as JSON
    Generate,
}

/// Run an offline command and return what should be printed.
pub fn execute_command(command: Commands) -> Result<String> {
    match command {
        Commands::Serve => Err(ConsoleError::Config(
            "serve runs the console and has no offline output".to_string(),
        )),

        Commands::Encode(args) => {
            let payload = if args.decoded {
                args.message.clone()
            } else {
                let table = load_table(args.cipher.as_ref())?;
                kohd::encode(&args.message, &table)
            };
            Ok(Burst::Datastream(payload).to_wire(args.noise))
        }

        Commands::Cipher(CipherCommands::Show { cipher }) => {
            let table = load_table(cipher.as_ref())?;
            Ok(table.to_string())
        }

        Commands::Cipher(CipherCommands::Generate) => {
            let table = CipherTable::generate();
            Ok(serde_json::to_string_pretty(&table)?)
        }
    }
}

fn load_table(path: Option<&PathBuf>) -> Result<CipherTable> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        }
        None => Ok(CipherTable::default_table()),
    }
}
