//! The set of issues currently on screen.
//!
//! `IssueBoard` mirrors exactly what the display renders, so "is issue 42
//! displayed?" can be answered without reading the page itself. Every
//! mutation returns the [`FieldUpdate`] the display must apply, or `None`
//! when the target is not displayed (off-screen, other page, removed).

use crate::issue::{IssueId, IssueView, VoteState};
use crate::listing::ListingPage;

/// A single displayed field change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    Status(String),
    Votes(VoteState),
}

/// Displayed issues, in display order.
#[derive(Debug, Clone, Default)]
pub struct IssueBoard {
    items: Vec<IssueView>,
    current_page: u32,
    total_pages: u32,
}

impl IssueBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the board with a freshly fetched listing page.
    pub fn replace(&mut self, page: ListingPage) {
        self.current_page = page.current_page;
        self.total_pages = page.pages;
        self.items = page.issues.into_iter().map(IssueView::from).collect();
        log::debug!(
            "Board replaced: {} issues (page {}/{})",
            self.items.len(),
            self.current_page,
            self.total_pages
        );
    }

    /// Show a single issue (detail view).
    pub fn show_single(&mut self, issue: IssueView) {
        self.current_page = 1;
        self.total_pages = 1;
        self.items = vec![issue];
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.current_page = 0;
        self.total_pages = 0;
    }

    /// Locate a displayed item by id.
    pub fn get(&self, id: IssueId) -> Option<&IssueView> {
        self.items.iter().find(|item| item.id == id)
    }

    fn get_mut(&mut self, id: IssueId) -> Option<&mut IssueView> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    pub fn contains(&self, id: IssueId) -> bool {
        self.get(id).is_some()
    }

    /// Set the status of a displayed issue.
    pub fn set_status(&mut self, id: IssueId, status: &str) -> Option<FieldUpdate> {
        let item = self.get_mut(id)?;
        item.status = status.to_string();
        Some(FieldUpdate::Status(item.status.clone()))
    }

    /// Overwrite the full vote state of a displayed issue.
    pub fn set_votes(&mut self, id: IssueId, votes: VoteState) -> Option<FieldUpdate> {
        let item = self.get_mut(id)?;
        item.votes = votes;
        Some(FieldUpdate::Votes(votes))
    }

    /// Set only the vote count, keeping the local voted flag.
    pub fn set_vote_count(&mut self, id: IssueId, count: u32) -> Option<FieldUpdate> {
        let item = self.get_mut(id)?;
        item.votes.count = count;
        Some(FieldUpdate::Votes(item.votes))
    }

    pub fn votes(&self, id: IssueId) -> Option<VoteState> {
        self.get(id).map(|item| item.votes)
    }

    pub fn items(&self) -> &[IssueView] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }
}
