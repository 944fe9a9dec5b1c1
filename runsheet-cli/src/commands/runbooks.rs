use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use runsheet_core::{ApiClient, NewRunbook, Runbook, RunbookUpdate, StepTemplate};
use uuid::Uuid;

use super::{resolve_id, short_id};
use crate::config::CliConfig;

#[derive(Subcommand)]
pub enum RunbooksCommand {
    #[command(about = "List runbooks, newest first")]
    List {
        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Show a runbook and its steps")]
    Show {
        #[arg(help = "Runbook id or unique prefix")]
        id: String,

        #[arg(short, long, default_value = "text")]
        format: String,
    },

    #[command(about = "Create a runbook")]
    Create {
        #[arg(help = "Runbook title")]
        title: Option<String>,

        #[arg(short, long, help = "Free-form description")]
        description: Option<String>,

        #[arg(
            short,
            long = "step",
            help = "Step as 'text', 'text|link' or 'text|link|image' (repeatable, in order)"
        )]
        steps: Vec<String>,

        #[arg(long, help = "Read the runbook from a JSON file instead")]
        from_file: Option<PathBuf>,
    },

    #[command(about = "Edit a runbook; --step replaces the whole step list")]
    Edit {
        #[arg(help = "Runbook id or unique prefix")]
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long = "step")]
        steps: Vec<String>,
    },

    #[command(about = "Delete a runbook; existing executions are kept")]
    Delete {
        #[arg(help = "Runbook id or unique prefix")]
        id: String,
    },
}

pub async fn handle_runbooks_command(
    config: &CliConfig,
    cmd: Option<RunbooksCommand>,
) -> anyhow::Result<()> {
    let client = config.api_client()?;

    match cmd.unwrap_or(RunbooksCommand::List {
        format: "text".to_string(),
    }) {
        RunbooksCommand::List { format } => cmd_runbooks_list(&client, &format).await,
        RunbooksCommand::Show { id, format } => cmd_runbooks_show(&client, &id, &format).await,
        RunbooksCommand::Create {
            title,
            description,
            steps,
            from_file,
        } => cmd_runbooks_create(&client, title, description, &steps, from_file).await,
        RunbooksCommand::Edit {
            id,
            title,
            description,
            steps,
        } => cmd_runbooks_edit(&client, &id, title, description, &steps).await,
        RunbooksCommand::Delete { id } => cmd_runbooks_delete(&client, &id).await,
    }
}

/// Splits `text|link|image`; empty segments are treated as absent.
pub fn parse_step_arg(raw: &str) -> StepTemplate {
    let mut parts = raw.splitn(3, '|').map(str::trim);
    let mut step = StepTemplate::new(parts.next().unwrap_or_default());
    if let Some(link) = parts.next().filter(|s| !s.is_empty()) {
        step = step.with_link(link);
    }
    if let Some(image) = parts.next().filter(|s| !s.is_empty()) {
        step = step.with_image(image);
    }
    step
}

pub async fn resolve_runbook_id(client: &ApiClient, input: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }
    let ids: Vec<Uuid> = client.list_runbooks().await?.iter().map(|r| r.id).collect();
    resolve_id(input, &ids, "runbook")
}

async fn cmd_runbooks_list(client: &ApiClient, format: &str) -> anyhow::Result<()> {
    let runbooks = client.list_runbooks().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&runbooks)?);
        return Ok(());
    }

    if runbooks.is_empty() {
        println!("{}", "No runbooks yet.".yellow());
        println!(
            "{}",
            "Run 'runsheet runbooks create <title> --step <text>' to add one.".dimmed()
        );
        return Ok(());
    }

    println!("{}", "Runbooks".cyan().bold());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("ID").fg(Color::White),
            Cell::new("Title").fg(Color::White),
            Cell::new("Steps").fg(Color::White),
            Cell::new("Description").fg(Color::White),
            Cell::new("Created").fg(Color::White),
        ]);

    for runbook in &runbooks {
        table.add_row(vec![
            Cell::new(short_id(&runbook.id)).fg(Color::DarkGrey),
            Cell::new(&runbook.title).fg(Color::Cyan),
            Cell::new(runbook.steps.len()),
            Cell::new(truncate(&runbook.description, 40)),
            Cell::new(runbook.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!("{table}");
    println!();
    println!("  Total: {} runbooks", runbooks.len());

    Ok(())
}

async fn cmd_runbooks_show(client: &ApiClient, id: &str, format: &str) -> anyhow::Result<()> {
    let id = resolve_runbook_id(client, id).await?;
    let runbook = client.get_runbook(id).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&runbook)?);
        return Ok(());
    }

    print_runbook(&runbook);
    Ok(())
}

async fn cmd_runbooks_create(
    client: &ApiClient,
    title: Option<String>,
    description: Option<String>,
    steps: &[String],
    from_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let request = match from_file {
        Some(path) => {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<NewRunbook>(&raw)
                .with_context(|| format!("{} is not a valid runbook", path.display()))?
        }
        None => {
            let Some(title) = title else {
                bail!("A title is required (or use --from-file)");
            };
            let mut request = NewRunbook::new(title);
            if let Some(description) = description {
                request = request.with_description(description);
            }
            for raw in steps {
                request = request.with_step(parse_step_arg(raw));
            }
            request
        }
    };

    let runbook = client.create_runbook(&request).await?;

    println!(
        "{} Created runbook {} ({})",
        "✓".green().bold(),
        runbook.title.cyan(),
        short_id(&runbook.id).dimmed()
    );
    println!();
    print_runbook(&runbook);
    Ok(())
}

async fn cmd_runbooks_edit(
    client: &ApiClient,
    id: &str,
    title: Option<String>,
    description: Option<String>,
    steps: &[String],
) -> anyhow::Result<()> {
    let id = resolve_runbook_id(client, id).await?;
    let update = RunbookUpdate {
        title,
        description,
        steps: if steps.is_empty() {
            None
        } else {
            Some(steps.iter().map(|s| parse_step_arg(s)).collect())
        },
    };

    if update.is_empty() {
        bail!("Nothing to change: pass --title, --description or --step");
    }

    let runbook = client.update_runbook(id, &update).await?;
    println!("{} Updated runbook {}", "✓".green().bold(), runbook.title.cyan());
    println!();
    print_runbook(&runbook);
    Ok(())
}

async fn cmd_runbooks_delete(client: &ApiClient, id: &str) -> anyhow::Result<()> {
    let id = resolve_runbook_id(client, id).await?;
    client.delete_runbook(id).await?;
    println!("{} Deleted runbook {}", "✓".green().bold(), short_id(&id));
    Ok(())
}

fn print_runbook(runbook: &Runbook) {
    println!("{}", runbook.title.cyan().bold());
    if !runbook.description.is_empty() {
        println!("{}", runbook.description);
    }
    println!(
        "{}",
        format!(
            "id {} · created {}",
            runbook.id,
            runbook.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
        .dimmed()
    );
    println!();

    if runbook.steps.is_empty() {
        println!("  {}", "(no steps)".dimmed());
        return;
    }

    for (idx, step) in runbook.steps.iter().enumerate() {
        println!("  {:>2}. {}", idx + 1, step.text);
        if let Some(link) = &step.link {
            println!("      {} {}", "link:".dimmed(), link.blue().underline());
        }
        if let Some(image) = &step.image {
            println!("      {} {}", "image:".dimmed(), image);
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
