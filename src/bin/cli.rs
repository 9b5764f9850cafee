//! OptiKV CLI Client
//!
//! Command-line interface for interacting with OptiKV.

use clap::{Parser, Subcommand};
use optikv::network::Client;
use optikv::KvError;

/// OptiKV CLI
#[derive(Parser, Debug)]
#[command(name = "optikv-cli")]
#[command(about = "CLI for the OptiKV versioned key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7379")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get the latest value of a key, or one exact version
    Get {
        /// The key to get
        key: String,

        /// Version to read instead of the latest
        #[arg(long, allow_negative_numbers = true)]
        version: Option<i64>,
    },

    /// Set a key at whatever version is current
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Set a key only if its current version matches
    Write {
        /// The key to write
        key: String,

        /// The value to write
        value: String,

        /// Version last observed (0 for a new key)
        #[arg(short, long)]
        expected: u64,
    },

    /// Delete a key and all its versions
    Del {
        /// The key to delete
        key: String,
    },

    /// Hand pending changes to the commit log
    Commit,

    /// Ping the server
    Ping,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        match e {
            KvError::VersionConflict { expected, actual, .. } => {
                eprintln!("(conflict) expected version {}, found {}", expected, actual);
            }
            other => eprintln!("(error) {}", other),
        }
        std::process::exit(1);
    }
}

fn run(args: Args) -> optikv::Result<()> {
    let mut client = Client::connect(&args.server)?;

    match args.command {
        Commands::Get { key, version } => {
            let value = match version {
                Some(version) => client.get_version(key.as_bytes(), version)?,
                None => client.get(key.as_bytes())?,
            };
            match value {
                Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                None => println!("(nil)"),
            }
        }
        Commands::Set { key, value } => {
            let version = client.put(key.as_bytes(), value.as_bytes())?;
            println!("OK (version {})", version);
        }
        Commands::Write {
            key,
            value,
            expected,
        } => {
            let version = client.write(key.as_bytes(), value.as_bytes(), expected)?;
            println!("OK (version {})", version);
        }
        Commands::Del { key } => {
            client.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Commit => match client.commit()? {
            Some(id) => println!("OK (commit {})", id),
            None => println!("OK (nothing to commit)"),
        },
        Commands::Ping => {
            client.ping()?;
            println!("PONG");
        }
    }

    Ok(())
}
