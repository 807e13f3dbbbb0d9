use clap::{Parser, Subcommand};
use codeshard::shard::{explode, merge, Shard};
use codeshard::ShardError;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "codeshard", about = "Offline shard transforms and inspection", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Combine shards into one compound shard
    Merge {
        /// Input .shard files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
        /// Build id recorded in the compound shard
        #[arg(long)]
        build_id: Option<String>,
        /// Build timestamp (unix seconds) recorded in the compound shard
        #[arg(long)]
        build_timestamp: Option<u64>,
    },
    /// Split a compound shard back into single-repository shards
    Explode {
        input: PathBuf,
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print shard metadata without scanning content
    Stat {
        shard: PathBuf,
        /// Emit machine-readable JSON instead of the text summary
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(cli: Cli) -> Result<(), ShardError> {
    match cli.command {
        Command::Merge {
            inputs,
            output,
            build_id,
            build_timestamp,
        } => {
            let timestamp = build_timestamp.unwrap_or_else(unix_now);
            let build_id = build_id.unwrap_or_else(|| format!("merge-{timestamp}"));
            let out = merge(&inputs, &output, &build_id, timestamp)?;
            println!("{}", out.display());
            Ok(())
        }
        Command::Explode { input, output } => {
            for out in explode(&input, &output)? {
                println!("{}", out.display());
            }
            Ok(())
        }
        Command::Stat { shard, json } => {
            let meta = Shard::read_metadata(&shard)?;
            if json {
                let value = serde_json::json!({
                    "format_version": meta.version,
                    "build_id": meta.metadata.build_id,
                    "build_timestamp": meta.metadata.build_timestamp,
                    "latest_commit_date": meta.metadata.latest_commit_date,
                    "repos": meta.repos,
                });
                println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
                return Ok(());
            }
            println!("format version:     {}", meta.version);
            println!("build id:           {}", meta.metadata.build_id);
            println!("build timestamp:    {}", meta.metadata.build_timestamp);
            println!("latest commit date: {}", meta.metadata.latest_commit_date);
            println!("repositories:       {}", meta.repos.len());
            for repo in &meta.repos {
                let branches: Vec<&str> =
                    repo.branches.iter().map(|b| b.name.as_str()).collect();
                println!(
                    "  [{}] {} priority={} branches={:?}",
                    repo.id, repo.name, repo.priority, branches
                );
            }
            Ok(())
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
