//! Markdown rendering for the human-browsable docs mirror.
//!
//! The mirror is keyed by timestamp and session so a directory listing reads
//! chronologically. It is never read back.

use crate::complaint::Complaint;

/// File name for a complaint in the docs mirror,
/// e.g. `2024-11-09_12-18-30-dev-session-550e8400.md`.
pub fn docs_file_name(complaint: &Complaint) -> String {
    let label = if complaint.session_id().is_empty() {
        complaint.agent_id().as_str()
    } else {
        complaint.session_id().as_str()
    };
    format!(
        "{}-{}-{}.md",
        complaint.timestamp().format("%Y-%m-%d_%H-%M-%S"),
        slug(label),
        complaint.id().short()
    )
}

/// Lowercase, whitespace and dots folded to `-`.
pub(crate) fn slug(label: &str) -> String {
    let slug: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

/// Render a complaint as a Markdown document.
pub fn render_markdown(complaint: &Complaint) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Complaint: {}\n\n", first_line(complaint.task_description())));

    out.push_str(&format!("- **ID:** `{}`\n", complaint.id()));
    out.push_str(&format!("- **Agent:** {}\n", complaint.agent_id()));
    if !complaint.session_id().is_empty() {
        out.push_str(&format!("- **Session:** {}\n", complaint.session_id()));
    }
    if !complaint.project_id().is_empty() {
        out.push_str(&format!("- **Project:** {}\n", complaint.project_id()));
    }
    out.push_str(&format!("- **Severity:** {}\n", complaint.severity()));
    out.push_str(&format!(
        "- **Filed:** {}\n",
        complaint.timestamp().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    match complaint.resolution() {
        Some(resolution) => out.push_str(&format!(
            "- **Status:** resolved by {} at {}\n",
            resolution.resolved_by(),
            resolution.resolved_at().format("%Y-%m-%d %H:%M:%S UTC")
        )),
        None => out.push_str("- **Status:** open\n"),
    }

    section(&mut out, "Task", complaint.task_description());
    section(&mut out, "Context", complaint.context_info());
    section(&mut out, "Missing Information", complaint.missing_info());
    section(&mut out, "Confused By", complaint.confused_by());
    section(&mut out, "Future Wishes", complaint.future_wishes());
    out
}

fn section(out: &mut String, title: &str, body: &str) {
    if body.trim().is_empty() {
        return;
    }
    out.push_str(&format!("\n## {}\n\n{}\n", title, body.trim_end()));
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim()
}
