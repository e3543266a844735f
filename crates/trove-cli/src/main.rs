//! Trove CLI - command-line access to configured storage locations.
//!
//! # Usage
//!
//! ```bash
//! trove --config trove.json primary ls data
//! trove --config trove.json primary put ./local.csv data/people.csv --overwrite
//! trove --config trove.json primary table-cat data/people.csv --field id:int64
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides the default `info` level.

use std::io::Write;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trove_core::config::SystemConfig;
use trove_core::types::{FieldDef, FileStat, FormatOptions, TableSchema};
use trove_storage::{register_builtin_storage_types, StorageManager};

mod args;

use args::{Cli, Command};

const CAT_CHUNK_SIZE: usize = 64 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    register_builtin_storage_types();
    let config = SystemConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    let manager = StorageManager::new(&config).context("Failed to initialise storage")?;

    run(&manager, &cli.storage, cli.command).await
}

async fn run(manager: &StorageManager, storage: &str, command: Command) -> Result<()> {
    let files = manager.get_file_storage(storage)?;

    match command {
        Command::Ls { path } => {
            for child in files.ls(&path).await? {
                println!("{child}");
            }
        }

        Command::Stat { path } => {
            let stat = files.stat(&path).await?;
            print!("{}", format_stat(&path, &stat));
        }

        Command::Cat { path } => {
            let mut stream = files.read_byte_stream(&path).await?;
            let mut buf = vec![0u8; CAT_CHUNK_SIZE];
            loop {
                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                std::io::stdout()
                    .write_all(&buf[..n])
                    .context("Failed to write to stdout")?;
            }
            std::io::stdout().flush()?;
        }

        Command::Put {
            local,
            path,
            overwrite,
        } => {
            let data = tokio::fs::read(&local)
                .await
                .with_context(|| format!("Failed to read {}", local.display()))?;
            let len = data.len();
            files.write_bytes(&path, Bytes::from(data), overwrite).await?;
            info!(bytes = len, path = %path, "Uploaded {}", local.display());
        }

        Command::Mkdir {
            path,
            parents,
            exists_ok,
        } => {
            files.mkdir(&path, parents, exists_ok).await?;
        }

        Command::Rm { path, recursive } => {
            files.rm(&path, recursive).await?;
        }

        Command::TableCat {
            path,
            format,
            fields,
            options,
        } => {
            let tables = manager.get_data_storage(storage)?;
            let schema = parse_fields(&fields)?;
            let options = parse_options(&options)?;
            let batch = tables.read_table(&schema, &path, &format, &options).await?;
            let rendered = arrow::util::pretty::pretty_format_batches(&[batch])
                .context("Failed to render table")?;
            println!("{rendered}");
        }
    }

    Ok(())
}

/// Parse `NAME` or `NAME:TYPE` field arguments; no fields means all columns.
fn parse_fields(fields: &[String]) -> Result<TableSchema> {
    let defs = fields
        .iter()
        .map(|field| match field.split_once(':') {
            Some((name, _)) if name.is_empty() => bail!("Field [{field}] has no name"),
            Some((name, data_type)) => Ok(FieldDef::new(name, data_type)),
            None if field.is_empty() => bail!("Empty field name"),
            None => Ok(FieldDef::new(field.as_str(), "string")),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(TableSchema::new(defs))
}

/// Parse `KEY=VALUE` format options.
fn parse_options(options: &[String]) -> Result<FormatOptions> {
    options
        .iter()
        .map(|option| match option.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => bail!("Format option [{option}] must be KEY=VALUE"),
        })
        .collect()
}

fn format_stat(path: &str, stat: &FileStat) -> String {
    fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
        value.map_or_else(|| "-".to_string(), |v| v.to_string())
    }

    let mut out = String::new();
    out.push_str(&format!("path:  {path}\n"));
    out.push_str(&format!("type:  {}\n", or_dash(stat.file_type)));
    out.push_str(&format!("size:  {}\n", stat.size));
    out.push_str(&format!("mtime: {}\n", or_dash(stat.mtime)));
    out.push_str(&format!("atime: {}\n", or_dash(stat.atime)));
    out.push_str(&format!("ctime: {}\n", or_dash(stat.ctime)));
    out.push_str(&format!("uid:   {}\n", or_dash(stat.uid)));
    out.push_str(&format!("gid:   {}\n", or_dash(stat.gid)));
    out.push_str(&format!(
        "mode:  {}\n",
        or_dash(stat.mode.map(|m| format!("{m:o}")))
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use trove_core::types::FileType;

    #[test]
    fn test_parse_fields() {
        let schema = parse_fields(&["id:int64".into(), "name".into()]).unwrap();
        assert_eq!(schema.field_names(), Some(vec!["id", "name"]));
        assert_eq!(schema.field("id").unwrap().data_type, "int64");
        assert_eq!(schema.field("name").unwrap().data_type, "string");

        assert!(!parse_fields(&[]).unwrap().has_fields());
        assert!(parse_fields(&[":int64".into()]).is_err());
    }

    #[test]
    fn test_parse_options() {
        let options = parse_options(&["delimiter=;".into(), "header=false".into()]).unwrap();
        assert_eq!(options.get("delimiter").map(String::as_str), Some(";"));
        assert_eq!(options.get("header").map(String::as_str), Some("false"));
        assert!(parse_options(&["novalue".into()]).is_err());
        assert!(parse_options(&["=x".into()]).is_err());
    }

    #[test]
    fn test_format_stat() {
        let mut stat = FileStat::new(Some(FileType::File), 42);
        stat.mode = Some(0o100644);
        let out = format_stat("a.txt", &stat);
        assert!(out.contains("type:  FILE\n"));
        assert!(out.contains("size:  42\n"));
        assert!(out.contains("mode:  100644\n"));
        assert!(out.contains("uid:   -\n"));
    }

    #[test]
    fn test_cli_parses_table_cat() {
        let cli = Cli::try_parse_from([
            "trove",
            "--config",
            "trove.json",
            "primary",
            "table-cat",
            "t.csv",
            "--field",
            "id:int64",
            "-o",
            "delimiter=;",
        ])
        .unwrap();
        assert_eq!(cli.storage, "primary");
        match cli.command {
            Command::TableCat {
                path,
                format,
                fields,
                options,
            } => {
                assert_eq!(path, "t.csv");
                assert_eq!(format, "csv");
                assert_eq!(fields, vec!["id:int64"]);
                assert_eq!(options, vec!["delimiter=;"]);
            }
            other => panic!("Unexpected command {other:?}"),
        }
    }
}
