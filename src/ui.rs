use anyhow::Result;
use colored::{ColoredString, Colorize};
use declarative::{
    Action, ConvergeReport, ExecuteSummary, Mode, NodeStatus, Plan, ProgressCallback, ResourceId,
    ResourceKind,
};
use indicatif::{ProgressBar, ProgressStyle};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Confirm with user
pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?;

    Ok(confirmed)
}

fn kind_heading(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Warehouse => "Warehouses",
        ResourceKind::Database => "Databases",
        ResourceKind::Schema => "Schemas",
        ResourceKind::Role => "Roles",
        ResourceKind::Grant => "Grants",
        ResourceKind::User => "Users",
    }
}

fn colored_symbol(action: &Action) -> ColoredString {
    match action {
        Action::Create => "+".green(),
        Action::Update { .. } => "~".yellow(),
        Action::Delete => "-".red(),
        Action::NoOp => "=".dimmed(),
        Action::Conflict { .. } => "!".red().bold(),
    }
}

/// Short description of what an action does, for the plan box
pub fn describe_action(action: &Action) -> String {
    match action {
        Action::Create => "(will create)".to_string(),
        Action::Update { change } => change.to_string(),
        Action::Delete => "(will delete)".to_string(),
        Action::NoOp => String::new(),
        Action::Conflict {
            field,
            desired,
            observed,
        } => format!("immutable {field}: {observed} -> {desired}"),
    }
}

/// Display a plan grouped by resource kind
pub fn display_plan(plan: &Plan, show_unchanged: bool) {
    let summary = plan.summary();

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        format!("{} plan", plan.mode()).bold()
    );
    println!("│");

    for kind in ResourceKind::ALL {
        let entries: Vec<_> = plan
            .of_kind(kind)
            .filter(|e| show_unchanged || e.action != Action::NoOp)
            .collect();
        if entries.is_empty() {
            continue;
        }

        println!("│ {}", kind_heading(kind).bold());
        for entry in entries {
            println!(
                "│   {} {:<40} {}",
                colored_symbol(&entry.action),
                entry.id.name,
                describe_action(&entry.action).dimmed()
            );
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} to delete, {} unchanged{}",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.delete.to_string().red(),
        summary.no_op,
        if summary.conflict > 0 {
            format!(", {} conflicting", summary.conflict.to_string().red().bold())
        } else {
            String::new()
        }
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn status_symbol(status: &NodeStatus) -> ColoredString {
    match status {
        NodeStatus::Created | NodeStatus::Updated | NodeStatus::Deleted => "✓".green(),
        NodeStatus::NoOp => "○".dimmed(),
        NodeStatus::Failed { .. } => "✗".red(),
        NodeStatus::Skipped { .. } | NodeStatus::Pending => "⊘".yellow(),
    }
}

fn status_detail(status: &NodeStatus) -> String {
    match status {
        NodeStatus::Failed { reason } | NodeStatus::Skipped { reason } => reason.clone(),
        other => other.label().to_string(),
    }
}

/// Per-node outcomes of a pass, failures and skips last
pub fn display_report(report: &ConvergeReport) {
    let mutated: Vec<_> = report.mutated().collect();
    let failed: Vec<_> = report.failed().collect();
    let skipped: Vec<_> = report.skipped().collect();

    if !mutated.is_empty() {
        header("Changed");
        for outcome in mutated {
            println!(
                "  {} {:<40} {}",
                status_symbol(&outcome.status),
                outcome.id.to_string(),
                status_detail(&outcome.status).dimmed()
            );
        }
    }

    if !failed.is_empty() {
        header("Failed");
        for outcome in failed {
            println!(
                "  {} {:<40} {}",
                status_symbol(&outcome.status),
                outcome.id.to_string(),
                status_detail(&outcome.status).red()
            );
        }
    }

    if !skipped.is_empty() {
        header("Skipped");
        for outcome in skipped {
            println!(
                "  {} {:<40} {}",
                status_symbol(&outcome.status),
                outcome.id.to_string(),
                status_detail(&outcome.status).dimmed()
            );
        }
    }

    if report.cancelled {
        println!();
        warn("Pass cancelled before every node finished");
    }

    print_summary(&report.summary);
}

/// Print execution summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();

    if summary.is_success() {
        println!(
            "  {} Applied: {} created, {} updated, {} deleted, {} unchanged",
            "✓".green(),
            summary.created,
            summary.updated,
            summary.deleted,
            summary.no_op
        );
    } else {
        println!(
            "  {} Partial: {} created, {} updated, {} deleted, {} failed, {} skipped",
            "⚠".yellow(),
            summary.created,
            summary.updated,
            summary.deleted,
            summary.failed.to_string().red(),
            summary.skipped
        );
    }
}

/// Progress bar driven by engine callbacks
pub struct BarProgress {
    bar: ProgressBar,
    verbose: bool,
}

impl BarProgress {
    pub fn new(verbose: bool) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            verbose,
        }
    }
}

impl ProgressCallback for BarProgress {
    fn on_pass_start(&mut self, total: usize, mode: Mode) {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_message(format!("{mode}..."));
        self.bar = bar;
    }

    fn on_node_start(&mut self, id: &ResourceId, action: &Action) {
        self.bar.set_message(format!("{} {id}", action.label()));
    }

    fn on_node_complete(&mut self, id: &ResourceId, status: &NodeStatus) {
        if self.verbose || matches!(status, NodeStatus::Failed { .. }) {
            self.bar
                .println(format!("  {} {id} {}", status_symbol(status), status_detail(status).dimmed()));
        }
        self.bar.inc(1);
    }

    fn on_pass_complete(&mut self, _summary: &ExecuteSummary) {
        self.bar.finish_and_clear();
    }
}
