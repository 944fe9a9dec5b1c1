use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::{Duration, Utc};
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use runsheet_core::{
    ApiClient, CoordinatorEvent, Execution, ExecutionApi, ExecutionStatus, ExecutionUpdate,
    NewExecution, Priority, StepUpdateCoordinator,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use super::runbooks::resolve_runbook_id;
use super::{resolve_id, short_id, step_index};
use crate::config::CliConfig;

#[derive(Subcommand)]
pub enum ExecCommand {
    #[command(about = "Start an execution of a runbook")]
    Start {
        #[arg(help = "Runbook id or unique prefix")]
        runbook: String,

        #[arg(short, long, default_value = "", help = "Incident this run belongs to")]
        incident: String,

        #[arg(short, long, default_value = "", help = "Who is running it")]
        operator: String,

        #[arg(short, long, default_value = "medium", help = "high, medium or low")]
        priority: Priority,

        #[arg(short, long, default_value = "text")]
        format: String,
    },

    #[command(about = "List executions, newest first")]
    List {
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    #[command(about = "Show an execution and its steps")]
    Show {
        #[arg(help = "Execution id or unique prefix")]
        id: String,

        #[arg(short, long, default_value = "text")]
        format: String,
    },

    #[command(about = "Mark a step as done (steps are numbered from 1)")]
    Check { id: String, step: usize },

    #[command(about = "Mark a step as not done")]
    Uncheck { id: String, step: usize },

    #[command(about = "Set the remark text of a step")]
    Remark { id: String, step: usize, text: String },

    #[command(about = "Attach an image to a step remark; local files are uploaded first")]
    Image {
        id: String,
        step: usize,
        #[arg(help = "Local file or an existing image URL")]
        image: String,
    },

    #[command(about = "Work through an execution interactively")]
    Work {
        #[arg(help = "Execution id or unique prefix")]
        id: String,
    },

    #[command(about = "Mark an execution finished now")]
    Finish { id: String },

    #[command(about = "Delete an execution")]
    Delete { id: String },
}

pub async fn handle_exec_command(
    config: &CliConfig,
    cmd: Option<ExecCommand>,
) -> anyhow::Result<()> {
    let client = config.api_client()?;

    match cmd.unwrap_or(ExecCommand::List {
        format: "text".to_string(),
    }) {
        ExecCommand::Start {
            runbook,
            incident,
            operator,
            priority,
            format,
        } => cmd_exec_start(&client, &runbook, incident, operator, priority, &format).await,
        ExecCommand::List { format } => cmd_exec_list(&client, &format).await,
        ExecCommand::Show { id, format } => cmd_exec_show(&client, &id, &format).await,
        ExecCommand::Check { id, step } => cmd_exec_check(config, client, &id, step, true).await,
        ExecCommand::Uncheck { id, step } => {
            cmd_exec_check(config, client, &id, step, false).await
        }
        ExecCommand::Remark { id, step, text } => {
            cmd_exec_remark(config, client, &id, step, text).await
        }
        ExecCommand::Image { id, step, image } => {
            cmd_exec_image(config, client, &id, step, &image).await
        }
        ExecCommand::Work { id } => cmd_exec_work(config, client, &id).await,
        ExecCommand::Finish { id } => cmd_exec_finish(&client, &id).await,
        ExecCommand::Delete { id } => cmd_exec_delete(&client, &id).await,
    }
}

async fn resolve_execution_id(client: &ApiClient, input: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }
    let ids: Vec<Uuid> = client
        .list_executions()
        .await?
        .iter()
        .map(|e| e.id)
        .collect();
    resolve_id(input, &ids, "execution")
}

async fn open_coordinator(
    config: &CliConfig,
    client: ApiClient,
    input: &str,
) -> anyhow::Result<(StepUpdateCoordinator, UnboundedReceiver<CoordinatorEvent>)> {
    let id = resolve_execution_id(&client, input).await?;
    let api: Arc<dyn ExecutionApi> = Arc::new(client);
    Ok(StepUpdateCoordinator::open(api, id, config.debounce()).await?)
}

async fn cmd_exec_start(
    client: &ApiClient,
    runbook: &str,
    incident: String,
    operator: String,
    priority: Priority,
    format: &str,
) -> anyhow::Result<()> {
    let runbook_id = resolve_runbook_id(client, runbook).await?;
    let request = NewExecution::new(runbook_id, incident, operator).with_priority(priority);
    let execution = client.start_execution(&request).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&execution)?);
        return Ok(());
    }

    println!(
        "{} Started {} ({})",
        "✓".green().bold(),
        execution.runbook_title.cyan(),
        short_id(&execution.id).dimmed()
    );
    println!();
    print_execution(&execution);
    Ok(())
}

async fn cmd_exec_list(client: &ApiClient, format: &str) -> anyhow::Result<()> {
    let executions = client.list_executions().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&executions)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!("{}", "No executions yet.".yellow());
        println!(
            "{}",
            "Run 'runsheet exec start <runbook>' to start one.".dimmed()
        );
        return Ok(());
    }

    println!("{}", "Executions".cyan().bold());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("ID").fg(Color::White),
            Cell::new("Runbook").fg(Color::White),
            Cell::new("Incident").fg(Color::White),
            Cell::new("Operator").fg(Color::White),
            Cell::new("Priority").fg(Color::White),
            Cell::new("Progress").fg(Color::White),
            Cell::new("Status").fg(Color::White),
            Cell::new("Started").fg(Color::White),
        ]);

    for execution in &executions {
        let (status, status_color) = status_cell(execution);
        table.add_row(vec![
            Cell::new(short_id(&execution.id)).fg(Color::DarkGrey),
            Cell::new(&execution.runbook_title).fg(Color::Cyan),
            Cell::new(&execution.incident_id),
            Cell::new(&execution.operator),
            Cell::new(execution.priority).fg(priority_color(execution.priority)),
            Cell::new(format!(
                "{}/{}",
                execution.checked_count(),
                execution.steps.len()
            )),
            Cell::new(status).fg(status_color),
            Cell::new(execution.started_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!("{table}");
    println!();
    println!("  Total: {} executions", executions.len());

    Ok(())
}

async fn cmd_exec_show(client: &ApiClient, id: &str, format: &str) -> anyhow::Result<()> {
    let id = resolve_execution_id(client, id).await?;
    let execution = client.get_execution(id).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&execution)?);
        return Ok(());
    }

    print_execution(&execution);
    Ok(())
}

async fn cmd_exec_check(
    config: &CliConfig,
    client: ApiClient,
    id: &str,
    step: usize,
    checked: bool,
) -> anyhow::Result<()> {
    let idx = step_index(step)?;
    let (coordinator, _events) = open_coordinator(config, client, id).await?;
    let execution = coordinator.set_checked(idx, checked).await?;

    let verb = if checked { "Checked" } else { "Unchecked" };
    println!("{} {} step {}", "✓".green().bold(), verb, step);
    if execution.is_finished() {
        println!(
            "{} All steps done, execution finished in {}",
            "✓".green().bold(),
            format_duration(execution.duration().unwrap_or_else(Duration::zero))
        );
    }
    println!();
    print_execution(&execution);
    Ok(())
}

async fn cmd_exec_remark(
    config: &CliConfig,
    client: ApiClient,
    id: &str,
    step: usize,
    text: String,
) -> anyhow::Result<()> {
    let idx = step_index(step)?;
    let (coordinator, mut events) = open_coordinator(config, client, id).await?;
    coordinator.edit_remark_text(idx, text);
    let execution = flush_or_fail(&coordinator, &mut events).await?;

    println!("{} Saved remark on step {}", "✓".green().bold(), step);
    println!();
    print_execution(&execution);
    Ok(())
}

async fn cmd_exec_image(
    config: &CliConfig,
    client: ApiClient,
    id: &str,
    step: usize,
    image: &str,
) -> anyhow::Result<()> {
    let idx = step_index(step)?;
    let url = image_url(&client, image).await?;
    let (coordinator, mut events) = open_coordinator(config, client, id).await?;
    coordinator.edit_remark_image(idx, &url);
    let execution = flush_or_fail(&coordinator, &mut events).await?;

    println!(
        "{} Attached {} to step {}",
        "✓".green().bold(),
        url.cyan(),
        step
    );
    println!();
    print_execution(&execution);
    Ok(())
}

async fn cmd_exec_finish(client: &ApiClient, id: &str) -> anyhow::Result<()> {
    let id = resolve_execution_id(client, id).await?;
    let execution = client
        .update_execution(id, &ExecutionUpdate::finish(Utc::now()))
        .await?;

    println!(
        "{} Finished {} in {}",
        "✓".green().bold(),
        execution.runbook_title.cyan(),
        format_duration(execution.duration().unwrap_or_else(Duration::zero))
    );
    Ok(())
}

async fn cmd_exec_delete(client: &ApiClient, id: &str) -> anyhow::Result<()> {
    let id = resolve_execution_id(client, id).await?;
    client.delete_execution(id).await?;
    println!("{} Deleted execution {}", "✓".green().bold(), short_id(&id));
    Ok(())
}

async fn cmd_exec_work(config: &CliConfig, client: ApiClient, id: &str) -> anyhow::Result<()> {
    let uploader = client.clone();
    let (coordinator, mut events) = open_coordinator(config, client, id).await?;

    print_execution(&coordinator.execution());
    print_work_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                match parse_work_input(&line) {
                    Ok(WorkInput::Check(idx, checked)) => {
                        match coordinator.set_checked(idx, checked).await {
                            Ok(execution) => print_execution(&execution),
                            Err(e) => eprintln!("{} {}", "✗".red(), e),
                        }
                    }
                    Ok(WorkInput::Remark(idx, text)) => {
                        coordinator.edit_remark_text(idx, text);
                        println!("  {}", "queued".dimmed());
                    }
                    Ok(WorkInput::Image(idx, image)) => match image_url(&uploader, &image).await {
                        Ok(url) => {
                            coordinator.edit_remark_image(idx, url);
                            println!("  {}", "queued".dimmed());
                        }
                        Err(e) => eprintln!("{} {}", "✗".red(), e),
                    },
                    Ok(WorkInput::Show) => print_execution(&coordinator.execution()),
                    Ok(WorkInput::Flush) => {
                        if coordinator.pending().is_empty() {
                            println!("  {}", "nothing queued".dimmed());
                        } else {
                            coordinator.flush_now().await;
                        }
                    }
                    Ok(WorkInput::Help) => print_work_help(),
                    Ok(WorkInput::Quit) => break,
                    Ok(WorkInput::Empty) => {}
                    Err(e) => eprintln!("{} {}", "✗".red(), e),
                }
            }
            Some(event) = events.recv() => match event {
                CoordinatorEvent::Updated(_) => println!("  {}", "saved".dimmed()),
                CoordinatorEvent::Completed(execution) => {
                    println!(
                        "{} All steps done, execution finished in {}",
                        "✓".green().bold(),
                        format_duration(execution.duration().unwrap_or_else(Duration::zero))
                    );
                }
                CoordinatorEvent::FlushFailed { dropped, error, .. } => {
                    eprintln!(
                        "{} {} queued update(s) were not saved: {}",
                        "✗".red(),
                        dropped.len(),
                        error
                    );
                }
            },
        }
    }

    // Leaving the session sends whatever is still queued.
    coordinator.flush_now().await;
    coordinator.close();
    Ok(())
}

#[derive(Debug, PartialEq)]
enum WorkInput {
    Check(usize, bool),
    Remark(usize, String),
    Image(usize, String),
    Show,
    Flush,
    Help,
    Quit,
    Empty,
}

fn parse_work_input(line: &str) -> anyhow::Result<WorkInput> {
    let line = line.trim();
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let step_and_arg = |rest: &str| -> anyhow::Result<(usize, String)> {
        let (step, arg) = rest.split_once(' ').unwrap_or((rest, ""));
        let step: usize = step
            .parse()
            .map_err(|_| anyhow!("Expected a step number, got '{}'", step))?;
        Ok((step_index(step)?, arg.trim().to_string()))
    };

    match cmd {
        "" => Ok(WorkInput::Empty),
        "c" | "check" => Ok(WorkInput::Check(step_and_arg(rest)?.0, true)),
        "u" | "uncheck" => Ok(WorkInput::Check(step_and_arg(rest)?.0, false)),
        "r" | "remark" => {
            let (idx, text) = step_and_arg(rest)?;
            Ok(WorkInput::Remark(idx, text))
        }
        "i" | "image" => {
            let (idx, image) = step_and_arg(rest)?;
            if image.is_empty() {
                bail!("Usage: i <step> <file or url>");
            }
            Ok(WorkInput::Image(idx, image))
        }
        "s" | "show" => Ok(WorkInput::Show),
        "f" | "flush" => Ok(WorkInput::Flush),
        "h" | "help" | "?" => Ok(WorkInput::Help),
        "q" | "quit" | "exit" => Ok(WorkInput::Quit),
        other => bail!("Unknown command '{}', type h for help", other),
    }
}

fn print_work_help() {
    println!();
    println!("  {}", "Commands".bold());
    println!("    c <step>          check a step");
    println!("    u <step>          uncheck a step");
    println!("    r <step> <text>   set the remark text");
    println!("    i <step> <image>  attach an image file or URL");
    println!("    s                 show the execution");
    println!("    f                 save queued remarks now");
    println!("    q                 save and quit");
    println!();
}

/// Uploads `image` when it names a local file, otherwise uses it as a URL.
async fn image_url(client: &ApiClient, image: &str) -> anyhow::Result<String> {
    let path = Path::new(image);
    if path.is_file() {
        let url = client
            .upload_file(path)
            .await
            .with_context(|| format!("Failed to upload {}", path.display()))?;
        Ok(url)
    } else {
        Ok(image.to_string())
    }
}

async fn flush_or_fail(
    coordinator: &StepUpdateCoordinator,
    events: &mut UnboundedReceiver<CoordinatorEvent>,
) -> anyhow::Result<Execution> {
    if let Some(execution) = coordinator.flush_now().await {
        return Ok(execution);
    }

    while let Ok(event) = events.try_recv() {
        if let CoordinatorEvent::FlushFailed { error, .. } = event {
            bail!("Update was not saved: {}", error);
        }
    }
    Ok(coordinator.execution())
}

fn print_execution(execution: &Execution) {
    let (status, _) = status_cell(execution);
    println!(
        "{} {}",
        execution.runbook_title.cyan().bold(),
        format!("({})", short_id(&execution.id)).dimmed()
    );
    println!(
        "  {:<10} {}",
        "Incident:".bold(),
        or_dash(&execution.incident_id)
    );
    println!(
        "  {:<10} {}",
        "Operator:".bold(),
        or_dash(&execution.operator)
    );
    println!("  {:<10} {}", "Priority:".bold(), execution.priority);
    println!("  {:<10} {}", "Status:".bold(), status);
    println!(
        "  {:<10} {}",
        "Started:".bold(),
        execution.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    match execution.finished_at {
        Some(finished) => {
            println!(
                "  {:<10} {}",
                "Finished:".bold(),
                finished.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!(
                "  {:<10} {}",
                "Duration:".bold(),
                format_duration(finished - execution.started_at)
            );
        }
        None => println!(
            "  {:<10} {}",
            "Elapsed:".bold(),
            format_duration(Utc::now() - execution.started_at)
        ),
    }
    println!();

    if execution.steps.is_empty() {
        println!("  {}", "(no steps)".dimmed());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("#").fg(Color::White),
            Cell::new("").fg(Color::White),
            Cell::new("Step").fg(Color::White),
            Cell::new("Done at").fg(Color::White),
            Cell::new("Remark").fg(Color::White),
        ]);

    for (idx, step) in execution.steps.iter().enumerate() {
        let mark = if step.checked {
            Cell::new("✓").fg(Color::Green)
        } else {
            Cell::new("○").fg(Color::DarkGrey)
        };
        let mut text = step.text.clone();
        if let Some(link) = &step.link {
            text.push('\n');
            text.push_str(link);
        }
        let mut remark = step.remark_text.clone().unwrap_or_default();
        if let Some(image) = &step.remark_image {
            if !remark.is_empty() {
                remark.push('\n');
            }
            remark.push_str(image);
        }
        table.add_row(vec![
            Cell::new(idx + 1),
            mark,
            Cell::new(text),
            Cell::new(
                step.executed_at
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_default(),
            ),
            Cell::new(remark),
        ]);
    }

    println!("{table}");
    println!(
        "  {}/{} steps done",
        execution.checked_count(),
        execution.steps.len()
    );
}

fn status_cell(execution: &Execution) -> (String, Color) {
    match execution.status {
        ExecutionStatus::Completed => ("completed".to_string(), Color::Green),
        ExecutionStatus::InProgress if execution.is_finished() => {
            ("finished".to_string(), Color::Green)
        }
        ExecutionStatus::InProgress => ("in progress".to_string(), Color::Yellow),
    }
}

fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::High => Color::Red,
        Priority::Medium => Color::Yellow,
        Priority::Low => Color::Green,
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

/// `42s` below a minute, `3m 07s` above.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}
