//! Plain-text display for the terminal client.

use std::io::{self, Write};

use civic_core::{FieldUpdate, IssueBoard, IssueId, IssueView, Notice, Severity};
use civic_live::{ConnectionStatus, DisplaySurface};

/// Writes every display call as a line of text.
pub struct TerminalSurface<W: Write + Send + 'static> {
    out: W,
}

impl TerminalSurface<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send + 'static> TerminalSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}") {
            log::warn!("Terminal write failed: {e}");
        }
    }
}

fn issue_line(issue: &IssueView) -> String {
    let marker = if issue.votes.user_has_voted { "*" } else { " " };
    format!(
        "{:>6} [{:<11}] {:>4}{} {}",
        issue.id.to_string(),
        issue.status,
        issue.votes.count,
        marker,
        issue.title
    )
}

fn field_line(issue: IssueId, update: &FieldUpdate) -> String {
    match update {
        FieldUpdate::Status(status) => format!("  {issue} status -> {status}"),
        FieldUpdate::Votes(votes) if votes.user_has_voted => {
            format!("  {issue} votes -> {} (voted)", votes.count)
        }
        FieldUpdate::Votes(votes) => format!("  {issue} votes -> {}", votes.count),
    }
}

fn notice_line(notice: &Notice) -> String {
    let tag = match notice.severity {
        Severity::Success => "ok",
        Severity::Info => "info",
        Severity::Warning => "warn",
        Severity::Error => "error",
    };
    format!("[{tag}] {}", notice.text)
}

fn status_line(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Disconnected => "-- live updates off",
        ConnectionStatus::Connecting => "-- connecting...",
        ConnectionStatus::Connected => "-- live",
        ConnectionStatus::Abandoned => "-- live updates unavailable (type `connect` to retry)",
    }
}

impl<W: Write + Send + 'static> DisplaySurface for TerminalSurface<W> {
    fn render_listing(&mut self, board: &IssueBoard) {
        if board.is_empty() {
            self.line("(no issues)");
            return;
        }
        self.line(&format!(
            "page {}/{}",
            board.current_page(),
            board.total_pages()
        ));
        for issue in board.items() {
            let text = issue_line(issue);
            self.line(&text);
        }
    }

    fn update_field(&mut self, issue: IssueId, update: &FieldUpdate) {
        self.line(&field_line(issue, update));
    }

    fn show_notice(&mut self, notice: &Notice) {
        self.line(&notice_line(notice));
    }

    fn set_notification_badge(&mut self, unread: u32) {
        self.line(&format!("({unread} unread)"));
    }

    fn connection_changed(&mut self, status: ConnectionStatus) {
        self.line(status_line(status));
    }
}
