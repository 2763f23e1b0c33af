use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use precision_builder::chat::{ChatHandle, ChatMessage, Notification, NotificationKind, SendPolicy};
use precision_builder::client::HttpBackend;
use precision_builder::requirements::{Requirements, Section};
use precision_builder::telemetry;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "builder-chat")]
#[command(about = "Describe an application and watch its requirements take shape")]
struct Cli {
    /// Extraction endpoint URL
    #[arg(
        short,
        long,
        env = "PARSE_REQUIREMENTS_URL",
        default_value = "http://localhost:8787/parse-requirements"
    )]
    server: String,

    /// Request timeout in seconds
    #[arg(short, long, default_value = "60")]
    timeout: u64,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

const HELP: &str = "\
Type a description of your application, or one of:
  /show                     print the current requirements
  /remove <section> <index> delete an item (sections: users, pages, models, workflows, features)
  /confirm                  confirm the requirements
  /reset                    start over
  /quit                     exit";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_quiet(cli.verbose);

    let backend = HttpBackend::new(cli.server).with_timeout(Duration::from_secs(cli.timeout));
    println!("Talking to {}", backend.url());
    println!("{HELP}\n");

    let chat = ChatHandle::spawn(Arc::new(backend), SendPolicy::QueueSerially);
    let mut notifications = chat.subscribe();

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match run_line(&chat, line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("error: {e}"),
        }
        print_notifications(&mut notifications);
    }

    Ok(())
}

/// Returns `false` once the user asked to quit.
async fn run_line(chat: &ChatHandle, line: &str) -> Result<bool> {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("/quit") | Some("/exit") => return Ok(false),
        Some("/help") => println!("{HELP}"),
        Some("/show") => {
            let state = chat.state().await?;
            match &state.requirements {
                Some(r) => print!("{}", render_requirements(r, state.is_confirmed)),
                None => println!("No requirements yet."),
            }
        }
        Some("/confirm") => chat.confirm_requirements().await?,
        Some("/reset") => {
            chat.reset_chat().await?;
            println!("Chat cleared.");
        }
        Some("/remove") => {
            let section: Section = words
                .next()
                .ok_or_else(|| anyhow!("usage: /remove <section> <index>"))?
                .parse()?;
            let index: usize = words
                .next()
                .ok_or_else(|| anyhow!("usage: /remove <section> <index>"))?
                .parse()
                .map_err(|e| anyhow!("invalid index: {e}"))?;
            let requirements = chat.remove_item(section, index).await?;
            print!("{}", render_requirements(&requirements, false));
        }
        Some(cmd) if cmd.starts_with('/') => println!("Unknown command {cmd}. Try /help."),
        _ => {
            let reply = chat.send_message(line).await?;
            print!("{}", render_reply(&reply));
        }
    }
    Ok(true)
}

fn print_notifications(rx: &mut broadcast::Receiver<Notification>) {
    while let Ok(n) = rx.try_recv() {
        let tag = match n.kind {
            NotificationKind::Info => "info",
            NotificationKind::Error => "error",
        };
        eprintln!("[{tag}] {}: {}", n.title, n.description);
    }
}

fn render_reply(message: &ChatMessage) -> String {
    let mut out = format!("\n> {}\n", message.content);
    if let Some(questions) = message.clarifications.as_ref().filter(|q| !q.is_empty()) {
        for q in questions {
            let _ = writeln!(out, "  ? {q}");
        }
    }
    if let Some(changes) = message.changes.as_ref().filter(|c| !c.is_empty()) {
        out.push_str("  Changes:\n");
        for c in changes {
            let _ = writeln!(out, "  + {c}");
        }
    }
    out.push('\n');
    out
}

fn render_requirements(r: &Requirements, confirmed: bool) -> String {
    let mut out = String::new();
    let badge = if confirmed { " [confirmed]" } else { "" };
    let _ = writeln!(out, "\n{}{badge}", r.display_name());
    if let Some(description) = &r.description {
        let _ = writeln!(out, "{description}");
    }

    for section in Section::ALL {
        let _ = writeln!(out, "\n{} ({})", section.title(), r.len(section));
        let items: Vec<String> = match section {
            Section::Users => r
                .users
                .iter()
                .map(|u| format!("{} - {} [{}]", u.role, u.description, u.permissions.join(", ")))
                .collect(),
            Section::Pages => r
                .pages
                .iter()
                .map(|p| format!("{} {} - {}", p.name, p.path, p.description))
                .collect(),
            Section::DataModels => r
                .data_models
                .iter()
                .map(|m| {
                    let fields: Vec<String> = m
                        .fields
                        .iter()
                        .map(|f| {
                            let marker = if f.required { "" } else { "?" };
                            format!("{}{marker}: {}", f.name, f.ty)
                        })
                        .collect();
                    format!("{} {{ {} }}", m.name, fields.join(", "))
                })
                .collect(),
            Section::Workflows => r
                .workflows
                .iter()
                .map(|w| format!("{} (on {}): {}", w.name, w.trigger, w.steps.join(" -> ")))
                .collect(),
            Section::Features => r
                .features
                .iter()
                .map(|f| format!("{} [{}] - {}", f.name, f.priority, f.description))
                .collect(),
        };
        for (i, item) in items.iter().enumerate() {
            let _ = writeln!(out, "  {i}. {item}");
        }
    }
    out.push('\n');
    out
}
