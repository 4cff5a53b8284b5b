//! Search and pagination for the freelancer dashboard.

use serde::Serialize;

use crate::catalog::JobListing;

pub const PAGE_SIZE: usize = 3;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobPage {
    pub jobs: Vec<JobListing>,
    pub page: usize,
    pub total_pages: usize,
    pub total_jobs: usize,
    pub query: String,
}

/// Filters `listings` by `query` and cuts out one page.
///
/// The query matches case-insensitively as a substring of the title or the
/// description; a blank query keeps everything. `page` is clamped into
/// `1..=total_pages`, and to 1 when nothing matched.
pub fn browse(listings: Vec<JobListing>, query: &str, page: Option<usize>) -> JobPage {
    let query = query.trim().to_string();
    let needle = query.to_lowercase();

    let matching: Vec<JobListing> = if needle.is_empty() {
        listings
    } else {
        listings
            .into_iter()
            .filter(|job| {
                job.title.to_lowercase().contains(&needle)
                    || job.description.to_lowercase().contains(&needle)
            })
            .collect()
    };

    let total_jobs = matching.len();
    let total_pages = total_jobs.div_ceil(PAGE_SIZE);
    let page = page.unwrap_or(1).clamp(1, total_pages.max(1));

    let jobs = matching
        .into_iter()
        .skip((page - 1) * PAGE_SIZE)
        .take(PAGE_SIZE)
        .collect();

    JobPage {
        jobs,
        page,
        total_pages,
        total_jobs,
        query,
    }
}
