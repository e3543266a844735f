use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Trove CLI - file and table access to configured storage locations
#[derive(Parser, Debug)]
#[command(name = "trove")]
#[command(version)]
#[command(about = "Run file and table operations against a configured storage", long_about = None)]
pub struct Cli {
    /// System configuration file (JSON)
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,

    /// Storage key from the configuration
    pub storage: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the direct children of a directory
    Ls {
        #[arg(default_value = "")]
        path: String,
    },

    /// Show file metadata
    Stat { path: String },

    /// Print file content to stdout
    Cat { path: String },

    /// Copy a local file into storage
    Put {
        /// Local file to upload
        local: PathBuf,
        /// Destination path in storage
        path: String,
        /// Replace the destination if it exists
        #[arg(long = "overwrite")]
        overwrite: bool,
    },

    /// Create a directory
    Mkdir {
        path: String,
        /// Create missing parent directories
        #[arg(short = 'p', long = "parents")]
        parents: bool,
        /// Succeed if the directory already exists
        #[arg(long = "exists-ok")]
        exists_ok: bool,
    },

    /// Remove a file or directory
    Rm {
        path: String,
        /// Remove directories and their contents
        #[arg(short = 'r', long = "recursive")]
        recursive: bool,
    },

    /// Read a table and print it
    TableCat {
        path: String,
        /// Table format (csv, parquet)
        #[arg(short = 'f', long = "format", default_value = "csv")]
        format: String,
        /// Column to read, as NAME or NAME:TYPE (repeatable; default all columns)
        #[arg(long = "field")]
        fields: Vec<String>,
        /// Format option as KEY=VALUE (repeatable)
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,
    },
}
