//! Listing queries and the client's current view.

use serde::{Deserialize, Serialize};

use crate::issue::{IssueId, IssueRecord};

/// Page size used by the citizen feed.
pub const DEFAULT_PER_PAGE: u32 = 12;

/// Optional listing filters. Empty fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingFilters {
    pub status: Option<String>,
    pub category: Option<String>,
    pub province: Option<String>,
    pub district: Option<String>,
    pub sector: Option<String>,
    pub search: Option<String>,
}

impl ListingFilters {
    /// Non-empty filters as `(name, value)` query pairs.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("status", &self.status),
            ("category", &self.category),
            ("province", &self.province),
            ("district", &self.district),
            ("sector", &self.sector),
            ("search", &self.search),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| (name, v))
        })
        .collect()
    }
}

/// "Fetch listing page" request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingQuery {
    pub page: u32,
    pub per_page: u32,
    pub filters: ListingFilters,
}

impl ListingQuery {
    pub fn page(page: u32) -> Self {
        Self {
            page: page.max(1),
            ..Self::default()
        }
    }

    /// Full query string pairs, page first.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("per_page", self.per_page.to_string()),
        ];
        pairs.extend(
            self.filters
                .pairs()
                .into_iter()
                .map(|(k, v)| (k, v.to_string())),
        );
        pairs
    }
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            filters: ListingFilters::default(),
        }
    }
}

/// "Fetch listing page" response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingPage {
    pub issues: Vec<IssueRecord>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub pages: u32,
    #[serde(default = "first_page")]
    pub current_page: u32,
}

fn first_page() -> u32 {
    1
}

/// Where the client currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// The default citizen listing (main feed), possibly filtered.
    Listing(ListingQuery),
    /// The administrator dashboard listing.
    AdminDashboard(ListingQuery),
    /// A single issue page.
    Detail(IssueId),
}

impl View {
    /// Whether this is the default listing view that push events re-fetch.
    pub fn is_default_listing(&self) -> bool {
        matches!(self, View::Listing(_))
    }

    pub fn is_admin_dashboard(&self) -> bool {
        matches!(self, View::AdminDashboard(_))
    }

    /// The listing query this view shows, if it shows one.
    pub fn query(&self) -> Option<&ListingQuery> {
        match self {
            View::Listing(q) | View::AdminDashboard(q) => Some(q),
            View::Detail(_) => None,
        }
    }
}

impl Default for View {
    fn default() -> Self {
        View::Listing(ListingQuery::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pairs_skip_empty_filters() {
        let query = ListingQuery {
            page: 2,
            per_page: 12,
            filters: ListingFilters {
                status: Some("Open".into()),
                district: Some(String::new()),
                search: Some("water".into()),
                ..ListingFilters::default()
            },
        };
        let pairs = query.query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("page", "2".to_string()),
                ("per_page", "12".to_string()),
                ("status", "Open".to_string()),
                ("search", "water".to_string()),
            ]
        );
    }

    #[test]
    fn test_page_zero_clamps_to_one() {
        assert_eq!(ListingQuery::page(0).page, 1);
    }

    #[test]
    fn test_view_kinds() {
        assert!(View::default().is_default_listing());
        assert!(View::AdminDashboard(ListingQuery::default()).is_admin_dashboard());
        assert!(View::Detail(IssueId(1)).query().is_none());
    }

    #[test]
    fn test_listing_page_from_json() {
        let json = r#"{"issues": [{"id": 1, "title": "Pothole", "status": "Open"}],
                       "total": 30, "pages": 3, "current_page": 2}"#;
        let page: ListingPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.issues.len(), 1);
        assert_eq!(page.pages, 3);
        assert_eq!(page.current_page, 2);
    }
}
