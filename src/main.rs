use clap::{Parser, Subcommand};
use multiblob::entry::{EntryIter, EntryType};
use multiblob::{Blob, Decoder, FieldValue, HmacSha256, MultipartBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "multiblob", about = "Pack and unpack multipart JSON/binary blobs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack JSON documents and binary files into one multipart blob
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// KEY=FILE; FILE must hold a JSON document
        #[arg(short, long = "json", value_parser = parse_field)]
        json: Vec<(String, PathBuf)>,
        /// KEY=FILE; FILE is stored verbatim
        #[arg(short, long = "blob", value_parser = parse_field)]
        blob: Vec<(String, PathBuf)>,
        /// Sign the JSON fields with HMAC-SHA256 under this secret
        #[arg(short, long)]
        secret: Option<String>,
    },
    /// Write every field of a multipart blob to KEY.json / KEY.bin
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Fail unless the HMAC-SHA256 signature matches this secret
        #[arg(short, long)]
        secret: Option<String>,
    },
    /// List the raw entries of a multipart blob
    List {
        input: PathBuf,
        /// Print a JSON manifest instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct EntrySummary<'a> {
    offset: usize,
    key:    &'a str,
    #[serde(rename = "type")]
    kind:   EntryType,
    size:   usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("multiblob=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, json, blob, secret } => {
            let mut builder = MultipartBuilder::new();
            for (key, path) in &json {
                let value: serde_json::Value = serde_json::from_slice(&std::fs::read(path)?)?;
                builder.add_json(key, &value)?;
                println!("  json    {key:<24} {}", path.display());
            }
            for (key, path) in &blob {
                let data = Blob::from(std::fs::read(path)?);
                builder.add_binary(key, &data)?;
                println!("  binary  {key:<24} {}", path.display());
            }
            if let Some(secret) = &secret {
                builder.sign(&HmacSha256, secret.as_bytes())?;
                println!("  signed");
            }
            std::fs::write(&output, builder.build())?;
            println!("Created: {} ({} B)", output.display(), builder.byte_len());
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir, secret } => {
            let bytes = std::fs::read(&input)?;
            let decoded = match &secret {
                Some(s) => Decoder::verified(&HmacSha256, s.as_bytes()).decode(&bytes)?,
                None    => Decoder::new().decode(&bytes)?,
            };
            if !output_dir.exists() { std::fs::create_dir_all(&output_dir)?; }

            for (key, value) in decoded.iter() {
                if !is_safe_file_stem(key) {
                    tracing::warn!(key = key.as_str(), "key is not usable as a file name; skipped");
                    continue;
                }
                let path = match value {
                    FieldValue::Json(v) => {
                        let path = output_dir.join(format!("{key}.json"));
                        std::fs::write(&path, serde_json::to_vec_pretty(v)?)?;
                        path
                    }
                    FieldValue::Binary(b) => {
                        let path = output_dir.join(format!("{key}.bin"));
                        std::fs::write(&path, b.as_bytes())?;
                        path
                    }
                };
                println!("  {:<7} {}", value.kind(), path.display());
            }
            for rejected in decoded.rejected() {
                eprintln!("  skipped {rejected}");
            }
            println!("Unpacked to: {}", output_dir.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let bytes = std::fs::read(&input)?;
            let entries = EntryIter::new(&bytes)
                .map(|item| item.map(|(offset, e)| EntrySummary {
                    offset,
                    key:  e.key,
                    kind: e.kind,
                    size: e.payload.len(),
                }))
                .collect::<Result<Vec<_>, _>>()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("Multipart: {} ({} B)", input.display(), bytes.len());
                println!("{:>10}  {:<7} {:>12}  Key", "Offset", "Type", "Size");
                for e in &entries {
                    println!("{:>10}  {:<7} {:>12}  {}", e.offset, e.kind, e.size, e.key);
                }
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_field(s: &str) -> Result<(String, PathBuf), String> {
    let (key, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=FILE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_owned(), PathBuf::from(path)))
}

fn is_safe_file_stem(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && key != ".."
        && Path::new(key).components().count() == 1
        && !key.contains(['/', '\\'])
}
