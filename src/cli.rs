use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::history::model::ChatType;
use crate::history::render::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "chatlog", version, about = "Retrieve complete GroupMe chat histories")]
pub struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List group and direct chats visible to the token.
    Chats {
        #[arg(long)]
        token: Option<String>,
    },
    /// Walk one chat's full history into a document.
    Retrieve(RetrieveArgs),
    /// Resume an interrupted document and merge the continuation into it.
    Repair(RepairArgs),
    /// Show resolved configuration and paths.
    Status,
}

#[derive(Debug, Args)]
struct RetrieveArgs {
    /// `group` or `direct`.
    #[arg(long = "type")]
    chat_type: ChatType,
    /// Group id, or the other user's id for a direct chat.
    #[arg(long)]
    id: String,
    /// `html` or `markdown`; defaults to the configured format.
    #[arg(long)]
    format: Option<OutputFormat>,
    #[arg(long)]
    out_dir: Option<PathBuf>,
    #[arg(long)]
    token: Option<String>,
}

#[derive(Debug, Args)]
struct RepairArgs {
    /// Interrupted document to repair.
    #[arg(long)]
    file: PathBuf,
    /// Delete the interrupted document after a successful merge.
    #[arg(long)]
    remove_original: bool,
    #[arg(long)]
    token: Option<String>,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let status = if report.ok { "ok" } else { "issues" };
    println!("{}: {status}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let report = match cli.command {
        Command::Chats { token } => commands::chats::run(token.as_deref())?,
        Command::Retrieve(args) => commands::retrieve::run(&commands::retrieve::RetrieveOptions {
            chat_type: args.chat_type,
            chat_id: args.id,
            format: args.format,
            out_dir: args.out_dir,
            token: args.token,
        })?,
        Command::Repair(args) => commands::repair::run(&commands::repair::RepairOptions {
            file: args.file,
            remove_original: args.remove_original,
            token: args.token,
        })?,
        Command::Status => commands::status::run()?,
    };
    print_report(&report, cli.json)?;
    if !report.ok {
        std::process::exit(2);
    }
    Ok(())
}
