use colored::*;
use jiff::Timestamp;

use taskboard_sync::models::{Invitation, Member, Project, ProjectDetail, Role, Task};

/// Get the terminal width, defaulting to 80 if unavailable
fn get_terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}

/// Print `left` with `right` dimmed against the right edge of the terminal
fn print_aligned(styled_left: ColoredString, left_visible_len: usize, right: &str) {
    if right.is_empty() {
        println!("{}", styled_left);
        return;
    }

    let terminal_width = get_terminal_width();
    let total_content = left_visible_len + right.chars().count();

    if total_content + 4 < terminal_width {
        let padding = terminal_width - total_content - 2;
        println!("{}{}{}", styled_left, " ".repeat(padding), right.dimmed());
    } else {
        // Not enough space for right alignment, just print normally
        println!("{}", styled_left);
    }
}

/// Glyph shown in front of a project: filled star when pinned
pub fn get_pin_glyph(project: &Project) -> ColoredString {
    if project.is_pinned {
        "★".yellow()
    } else {
        "○".normal()
    }
}

/// Render a project line with key, glyph, name, and right-aligned url
pub fn render_project_line(project: &Project) {
    let key_str = format!("{:>6}", project.key);
    let glyph = get_pin_glyph(project);
    let left_section = format!("  {}  {}  {}", key_str, glyph, project.name);
    let left_visible_len = format!("  {}  {}  {}", key_str, " ", project.name)
        .chars()
        .count();

    print_aligned(left_section.bold(), left_visible_len, &project.url);
}

/// Render a single task line with ID, title, and right-aligned status
pub fn render_task_line(task: &Task) {
    let id_str = format!("{:>8}", task.id);
    let left_section = format!("  {}  {}  {}", id_str, "○", task.name);
    let left_visible_len = left_section.chars().count();

    let status = task.status.clone().unwrap_or_default();
    print_aligned(left_section.normal(), left_visible_len, &status);

    if let Some(notes) = task.notes.as_deref().filter(|n| !n.is_empty()) {
        println!("              {}", notes.dimmed());
    }
}

/// Render every column of a project with its tasks
pub fn render_board(detail: &ProjectDetail) {
    render_view_header(&detail.project.name, detail.tasks.len(), "task");

    for board in detail.ordered_boards() {
        let tasks: Vec<&Task> = detail.tasks_in(&board.id).collect();
        render_section_header(&format!("{} ({})", board.title, tasks.len()));
        if tasks.is_empty() {
            println!("  {}", "empty".dimmed());
        }
        for task in tasks {
            render_task_line(task);
        }
    }
}

fn role_label(role: Role) -> ColoredString {
    let padded = format!("{:<8}", role.to_string());
    match role {
        Role::Owner => padded.magenta(),
        Role::Editor => padded.blue(),
        Role::User => padded.normal(),
    }
}

/// Render the member list with roles and right-aligned join date
pub fn render_members(members: &[Member]) {
    render_section_header(&format!("Members ({})", members.len()));
    for member in members {
        let name = member.display_name.as_deref().unwrap_or(&member.user_id);
        let label = role_label(member.role);
        let left_section = format!("  {}  {}", label, name);
        let left_visible_len = format!("  {:<8}  {}", member.role.to_string(), name)
            .chars()
            .count();

        print_aligned(
            left_section.normal(),
            left_visible_len,
            &format_date(member.joined_at),
        );
    }
}

pub fn render_invitation(invitation: &Invitation) {
    println!(
        "\n  {} invited {} to {}",
        invitation.inviter_name.bold(),
        invitation.invitee_email,
        invitation
            .project_url
            .as_deref()
            .unwrap_or(&invitation.project_id)
            .cyan()
    );
    println!("  Status: {:?}\n", invitation.status);
}

/// Format a timestamp for display (e.g., "Feb 15", "Today", "Yesterday")
fn format_date(timestamp: Timestamp) -> String {
    let zoned = jiff::Zoned::new(timestamp, jiff::tz::TimeZone::system());
    let date = zoned.date();
    let today = jiff::Zoned::now().date();

    if date == today {
        "Today".to_string()
    } else if today.yesterday().ok() == Some(date) {
        "Yesterday".to_string()
    } else {
        // Format as "Feb 15"
        date.strftime("%b %d").to_string()
    }
}

/// Render a view header with title and count
pub fn render_view_header(title: &str, count: usize, noun: &str) {
    let plural = if count == 1 { "" } else { "s" };
    println!("\n  {} ({} {}{})\n", title.cyan().bold(), count, noun, plural);
}

/// Render a section header (e.g., "To Do (3)")
pub fn render_section_header(title: &str) {
    println!("\n  ─── {} ───\n", title.bold());
}
