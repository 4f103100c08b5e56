//! complaintbox - file and browse complaints from AI agents
//!
//! Agents record what was missing or confusing about a task; humans (or other
//! agents) list, search, and resolve them later.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Complaints: $XDG_DATA_HOME/complaintbox/complaints/ (overridable in config)
//! - Config: $XDG_CONFIG_HOME/complaintbox/config.toml
//! - Logs: $XDG_STATE_HOME/complaintbox/

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use complaintbox_core::docs::render_markdown;
use complaintbox_core::{
    AgentId, CancelToken, Complaint, ComplaintId, Config, NewComplaint, ProjectId, Repository,
    SessionId, Severity, MAX_LIMIT,
};
use std::collections::BTreeMap;

#[derive(Parser)]
#[command(name = "complaintbox")]
#[command(about = "File and browse complaints from AI agents about their tasks")]
#[command(version)]
struct Args {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Write debug logs to the XDG state directory
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// File a new complaint
    File {
        /// Agent filing the complaint
        #[arg(short, long)]
        agent: String,

        /// What the agent was asked to do
        #[arg(short, long)]
        task: String,

        /// low, medium, high, or critical
        #[arg(short, long, default_value = "medium")]
        severity: String,

        #[arg(long, default_value = "")]
        session: String,

        #[arg(long, default_value = "")]
        project: String,

        /// Background the agent had
        #[arg(long, default_value = "")]
        context: String,

        /// Information the agent needed but did not get
        #[arg(long, default_value = "")]
        missing: String,

        /// What was confusing
        #[arg(long, default_value = "")]
        confused: String,

        /// What would help next time
        #[arg(long, default_value = "")]
        wishes: String,
    },

    /// Show one complaint in full
    Show { id: String },

    /// List complaints, oldest first
    List {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        #[arg(short, long, default_value_t = 0)]
        offset: usize,
    },

    /// Case-insensitive text search
    Search {
        query: String,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// List complaints nobody has resolved yet
    Unresolved {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// List complaints with the given severity
    Severity {
        severity: String,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// List complaints from one session
    Session { id: String },

    /// List complaints for one project
    Project { id: String },

    /// List complaints filed by one agent
    Agent { id: String },

    /// Mark a complaint resolved
    Resolve {
        id: String,

        /// Agent doing the resolving
        #[arg(long = "by")]
        resolver: String,
    },

    /// Delete a complaint and its mirrors
    Delete { id: String },

    /// Summary counts and cache statistics
    Stats,

    /// Show where config, records, and logs live
    Paths,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = if args.verbose {
        Some(complaintbox_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    if let Command::Paths = args.command {
        return cmd_paths(&config, args.json);
    }

    let repo = Repository::from_config(&config).context("failed to open complaint store")?;
    let cancel = CancelToken::new();
    let out = Output { json: args.json };

    match args.command {
        Command::File {
            agent,
            task,
            severity,
            session,
            project,
            context,
            missing,
            confused,
            wishes,
        } => {
            let mut draft = NewComplaint::new(
                AgentId::new(agent)?,
                task,
                severity.parse::<Severity>()?,
            );
            draft.session_id = SessionId::new(session)?;
            draft.project_id = ProjectId::new(project)?;
            draft.context_info = context;
            draft.missing_info = missing;
            draft.confused_by = confused;
            draft.future_wishes = wishes;

            let complaint = Complaint::file(draft).context("invalid complaint")?;
            let path = repo
                .save(&cancel, &complaint)
                .context("failed to save complaint")?;
            if out.json {
                print_json(serde_json::json!({
                    "id": complaint.id(),
                    "path": path,
                }))
            } else {
                println!("Filed complaint {}", complaint.id());
                println!("  {}", path.display());
                Ok(())
            }
        }
        Command::Show { id } => {
            let id = parse_id(&id)?;
            let complaint = repo.find_by_id(&cancel, &id).context("failed to load complaint")?;
            out.detail(&complaint)
        }
        Command::List { limit, offset } => {
            let complaints = repo
                .find_all(&cancel, limit, offset)
                .context("failed to list complaints")?;
            out.list(&complaints)
        }
        Command::Search { query, limit } => {
            let complaints = repo.search(&cancel, &query, limit).context("search failed")?;
            out.list(&complaints)
        }
        Command::Unresolved { limit } => {
            let complaints = repo
                .find_unresolved(&cancel, limit)
                .context("failed to list unresolved complaints")?;
            out.list(&complaints)
        }
        Command::Severity { severity, limit } => {
            let severity: Severity = severity.parse()?;
            let complaints = repo
                .find_by_severity(&cancel, severity, limit)
                .context("failed to list complaints by severity")?;
            out.list(&complaints)
        }
        Command::Session { id } => {
            let complaints = repo
                .find_by_session(&cancel, &SessionId::new(id)?)
                .context("failed to list session complaints")?;
            out.list(&complaints)
        }
        Command::Project { id } => {
            let complaints = repo
                .find_by_project(&cancel, &ProjectId::new(id)?)
                .context("failed to list project complaints")?;
            out.list(&complaints)
        }
        Command::Agent { id } => {
            let complaints = repo
                .find_by_agent(&cancel, &AgentId::new(id)?)
                .context("failed to list agent complaints")?;
            out.list(&complaints)
        }
        Command::Resolve { id, resolver } => {
            let id = parse_id(&id)?;
            let complaint = repo
                .resolve(&cancel, &id, &AgentId::new(resolver)?)
                .context("failed to resolve complaint")?;
            if out.json {
                return out.detail(&complaint);
            }
            if let Some(resolution) = complaint.resolution() {
                println!(
                    "Resolved {} (by {} at {})",
                    complaint.id(),
                    resolution.resolved_by(),
                    resolution.resolved_at().format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            Ok(())
        }
        Command::Delete { id } => {
            let id = parse_id(&id)?;
            repo.delete(&cancel, &id).context("failed to delete complaint")?;
            if out.json {
                print_json(serde_json::json!({ "deleted": id }))
            } else {
                println!("Deleted complaint {}", id);
                Ok(())
            }
        }
        Command::Stats => cmd_stats(&repo, &cancel, out.json),
        Command::Paths => cmd_paths(&config, out.json),
    }
}

fn parse_id(raw: &str) -> Result<ComplaintId> {
    ComplaintId::new(raw).with_context(|| format!("'{}' is not a complaint ID", raw))
}

fn print_json(value: serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

struct Output {
    json: bool,
}

impl Output {
    fn list(&self, complaints: &[Complaint]) -> Result<()> {
        if self.json {
            return print_json(serde_json::to_value(complaints)?);
        }
        if complaints.is_empty() {
            println!("No complaints found.");
            return Ok(());
        }
        for complaint in complaints {
            println!("{}", summary_line(complaint));
        }
        Ok(())
    }

    fn detail(&self, complaint: &Complaint) -> Result<()> {
        if self.json {
            return print_json(serde_json::to_value(complaint)?);
        }
        print!("{}", render_markdown(complaint));
        Ok(())
    }
}

/// `550e8400  high      open      2h ago  agent-1  Fix login bug`
fn summary_line(complaint: &Complaint) -> String {
    let task = complaint.task_description().lines().next().unwrap_or_default();
    format!(
        "{}  {:<8}  {:<8}  {:>8}  {}  {}",
        complaint.id().short(),
        complaint.severity(),
        complaint.state().as_str(),
        format_age(complaint),
        complaint.agent_id(),
        truncate(task, 60)
    )
}

fn format_age(complaint: &Complaint) -> String {
    let age = Utc::now().signed_duration_since(complaint.timestamp());
    if age.num_days() > 0 {
        format!("{}d ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{}h ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{}m ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut)
}

fn cmd_stats(repo: &Repository, cancel: &CancelToken, json: bool) -> Result<()> {
    let loaded = repo.warm_cache(cancel).context("failed to load complaints")?;

    let mut complaints = Vec::with_capacity(loaded);
    loop {
        let page = repo
            .find_all(cancel, MAX_LIMIT, complaints.len())
            .context("failed to list complaints")?;
        let done = page.len() < MAX_LIMIT;
        complaints.extend(page);
        if done {
            break;
        }
    }

    let open = complaints.iter().filter(|c| !c.is_resolved()).count();
    let mut by_severity: BTreeMap<&'static str, usize> =
        Severity::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for complaint in &complaints {
        *by_severity.entry(complaint.severity().as_str()).or_default() += 1;
    }
    let cache = repo.cache_stats();

    if json {
        return print_json(serde_json::json!({
            "total": complaints.len(),
            "open": open,
            "resolved": complaints.len() - open,
            "by_severity": by_severity,
            "cache": cache,
        }));
    }

    println!("Complaints");
    println!("==========");
    println!("Total:           {}", complaints.len());
    println!("Open:            {}", open);
    println!("Resolved:        {}", complaints.len() - open);
    for severity in Severity::ALL {
        println!(
            "  {:<15}{}",
            format!("{}:", severity),
            by_severity.get(severity.as_str()).copied().unwrap_or_default()
        );
    }
    println!();
    println!("Cache");
    println!("=====");
    println!("Size:            {}/{}", cache.size, cache.max_size);
    println!("Hits:            {}", cache.hits);
    println!("Misses:          {}", cache.misses);
    println!("Evictions:       {}", cache.evictions);
    println!("Hit rate:        {:.1}%", cache.hit_rate);
    Ok(())
}

fn cmd_paths(config: &Config, json: bool) -> Result<()> {
    let storage = &config.storage;
    if json {
        return print_json(serde_json::json!({
            "config": Config::config_path(),
            "base_dir": storage.base_dir,
            "global_dir": storage.global_dir,
            "docs_dir": storage.docs_dir,
            "logs": Config::state_dir(),
        }));
    }

    println!("Config:     {}", Config::config_path().display());
    println!("Complaints: {}", storage.base_dir.display());
    if let Some(global) = &storage.global_dir {
        println!("Global:     {}", global.display());
    }
    if let Some(docs) = &storage.docs_dir {
        println!("Docs:       {}", docs.display());
    }
    println!("Logs:       {}", Config::state_dir().display());
    Ok(())
}
