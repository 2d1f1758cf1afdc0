use clap::{Parser, Subcommand};
use resource_core::attribute::{self, Attributes};
use resource_core::{File, Format, Instance};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rsrc", about = "Inspect and convert resource files (classic, extended, rez)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every resource in a file
    List {
        input: PathBuf,
        /// Print a JSON document instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show the detected format and totals
    Info {
        input: PathBuf,
    },
    /// Hex dump the start of one resource payload
    Dump {
        input: PathBuf,
        code:  String,
        id:    i64,
        #[arg(short, long)]
        namespace: Option<String>,
        /// Number of bytes to show
        #[arg(short, long, default_value = "256")]
        length: usize,
    },
    /// Write one resource payload to disk
    Extract {
        input: PathBuf,
        code:  String,
        id:    i64,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Re-encode a file in another format
    Convert {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Target format: classic, extended, rez
        #[arg(short, long)]
        format: String,
    },
}

#[derive(Serialize)]
struct ListEntry<'a> {
    code:       &'a str,
    attributes: &'a Attributes,
    id:         i64,
    size:       usize,
    name:       &'a str,
}

#[derive(Serialize)]
struct Listing<'a> {
    path:      String,
    format:    Format,
    resources: Vec<ListEntry<'a>>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let file = File::open(&input)?;
            let resources: Vec<ListEntry> = file
                .types()
                .iter()
                .flat_map(|ty| {
                    ty.instances().iter().map(move |i| ListEntry {
                        code:       ty.code(),
                        attributes: ty.attributes(),
                        id:         i.id(),
                        size:       i.size(),
                        name:       i.name(),
                    })
                })
                .collect();

            if json {
                let listing = Listing {
                    path: input.display().to_string(),
                    format: file.format(),
                    resources,
                };
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                println!("File: {} ({})", input.display(), file.format());
                println!("{:<6} {:<24} {:>8} {:>10}  Name", "Type", "Attributes", "ID", "Size");
                for r in &resources {
                    println!("{:<6} {:<24} {:>8} {:>10}  {}",
                        format!("'{}'", r.code), attribute::canonical_string(r.attributes),
                        r.id, r.size, r.name);
                }
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let file = File::open(&input)?;
            let payload: usize = file
                .types()
                .iter()
                .flat_map(|t| t.instances())
                .map(Instance::size)
                .sum();

            println!("── Resource file ────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Format         {}", file.format());
            println!("  File size      {} B", file.backing().map_or(0, |b| b.size()));
            println!("  Types          {}", file.types().len());
            println!("  Type codes     {}", file.type_codes().join(", "));
            println!("  Resources      {}", file.instance_count());
            println!("  Payload        {} B", payload);
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, code, id, namespace, length } => {
            let file = File::open(&input)?;
            let instance = lookup(&file, &code, id, namespace.as_deref())?;
            let bytes = instance.data().to_vec();
            println!("'{}' #{} \"{}\"  {} B", code, id, instance.name(), bytes.len());
            for (row, chunk) in bytes[..bytes.len().min(length)].chunks(16).enumerate() {
                let ascii: String = chunk
                    .iter()
                    .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                    .collect();
                println!("{:08x}  {:<32}  {}", row * 16, hex::encode(chunk), ascii);
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, code, id, output, namespace } => {
            let file = File::open(&input)?;
            let instance = lookup(&file, &code, id, namespace.as_deref())?;
            instance.data().save(&output)?;
            println!("Extracted '{}' #{} → {}", code, id, output.display());
        }

        // ── Convert ──────────────────────────────────────────────────────────
        Commands::Convert { input, output, format } => {
            let target = Format::from_name(&format)
                .ok_or_else(|| format!("unknown format '{format}' (expected classic, extended or rez)"))?;
            let file = File::open(&input)?;
            file.write(&output, Some(target))?;
            println!("Converted {} ({}) → {} ({})",
                input.display(), file.format(), output.display(), target);
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn lookup<'a>(
    file:      &'a File,
    code:      &str,
    id:        i64,
    namespace: Option<&str>,
) -> Result<&'a Instance, Box<dyn std::error::Error>> {
    let attributes = namespace.map(attribute::namespace).unwrap_or_default();
    file.type_for(code, &attributes)
        .and_then(|ty| ty.resource_with_id(id))
        .ok_or_else(|| format!("no resource '{code}' #{id}").into())
}
