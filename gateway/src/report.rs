//! Lead activity reports: which sites were added, by whom and when, with
//! totals per status and category.
//!
//! Reads fail soft like every other gateway list: an unavailable store gives
//! an empty report with zero totals.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Days;
use chrono::NaiveDate;
use chrono::NaiveTime;
use chrono::Utc;
use serde::Serialize;

use crate::entity::Lead;
use crate::gateway::EntityGateway;
use crate::query::Filter;
use crate::query::Query;
use crate::record::RecordId;
use crate::record::SortDirection;
use crate::schema::stamp;

/// Which leads an activity report covers. Every bound that is set must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    /// First creation day included.
    pub from: Option<NaiveDate>,
    /// Last creation day included.
    pub to: Option<NaiveDate>,
    /// Exactly this creation day.
    pub on: Option<NaiveDate>,
    pub added_by: Option<RecordId>,
    /// Case-insensitive match on website or category.
    pub search: Option<String>,
}

impl ActivityFilter {
    pub fn on(day: NaiveDate) -> Self {
        Self {
            on: Some(day),
            ..Self::default()
        }
    }

    pub fn added_by(user: RecordId) -> Self {
        Self {
            added_by: Some(user),
            ..Self::default()
        }
    }

    fn to_query(&self) -> Query {
        let mut query = Query::new().order_by("createdAt", SortDirection::Desc);
        if let Some(from) = self.from {
            query = query.filter(Filter::gte("createdAt", midnight(from)));
        }
        if let Some(next) = self.to.and_then(|to| to.checked_add_days(Days::new(1))) {
            query = query.filter(Filter::lt("createdAt", midnight(next)));
        }
        if let Some(day) = self.on {
            query = query.filter(Filter::on_day("createdAt", day));
        }
        if let Some(user) = self.added_by {
            query = query.filter(Filter::eq("addedBy", user));
        }
        if let Some(text) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query = query.any_of(vec![
                Filter::contains("websiteUrl", text),
                Filter::contains("category", text),
            ]);
        }
        query
    }
}

fn midnight(day: NaiveDate) -> String {
    stamp(day.and_time(NaiveTime::MIN).and_utc())
}

/// `https://acme.io/` reads as `acme.io`.
pub fn clean_url(url: &str) -> &str {
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    url.strip_suffix('/').unwrap_or(url)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub total_urls: usize,
    pub total_arr: f64,
    pub by_status: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
}

impl ActivitySummary {
    fn of(leads: &[Lead]) -> Self {
        let mut summary = Self {
            total_urls: leads.len(),
            ..Self::default()
        };
        for lead in leads {
            summary.total_arr += lead.arr;
            *summary.by_status.entry(or_unknown(&lead.status)).or_insert(0) += 1;
            *summary.by_category.entry(or_unknown(&lead.category)).or_insert(0) += 1;
        }
        summary
    }
}

fn or_unknown(s: &str) -> String {
    if s.trim().is_empty() {
        "Unknown".to_string()
    } else {
        s.to_string()
    }
}

/// Matching leads, newest first, with their website shown without scheme.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivityReport {
    pub leads: Vec<Lead>,
    pub summary: ActivitySummary,
}

/// A site a rep added, as listed in their day view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUrl {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub website_url: String,
    pub category: String,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Spreadsheet-shaped row of an activity export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityExportRow {
    #[serde(rename = "Website URL")]
    pub website_url: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Team Size")]
    pub team_size: String,
    /// Millions, one decimal: `$1.5M`.
    #[serde(rename = "ARR")]
    pub arr: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Funding Type")]
    pub funding_type: String,
    #[serde(rename = "Added By")]
    pub added_by: String,
    #[serde(rename = "Date Added")]
    pub date_added: String,
}

impl From<&Lead> for ActivityExportRow {
    fn from(lead: &Lead) -> Self {
        Self {
            website_url: clean_url(&lead.website_url).to_string(),
            category: lead.category.clone(),
            team_size: lead.team_size.clone(),
            arr: format!("${:.1}M", lead.arr / 1_000_000.0),
            status: lead.status.clone(),
            funding_type: lead.funding_type.clone(),
            added_by: lead.added_by_name.clone(),
            date_added: lead
                .created_at
                .map(|t| t.date_naive().to_string())
                .unwrap_or_default(),
        }
    }
}

impl EntityGateway<Lead> {
    pub async fn activity(&self, filter: &ActivityFilter) -> ActivityReport {
        let mut leads = self.list(filter.to_query()).await;
        for lead in &mut leads {
            lead.website_url = clean_url(&lead.website_url).to_string();
        }
        let summary = ActivitySummary::of(&leads);
        ActivityReport { leads, summary }
    }

    pub async fn activity_on(&self, day: NaiveDate) -> ActivityReport {
        self.activity(&ActivityFilter::on(day)).await
    }

    pub async fn activity_by(&self, user: RecordId) -> ActivityReport {
        self.activity(&ActivityFilter::added_by(user)).await
    }

    /// Sites added by `rep` on `day`, newest first. Either bound may be left
    /// open.
    pub async fn daily_urls(&self, rep: Option<RecordId>, day: Option<NaiveDate>) -> Vec<DailyUrl> {
        let filter = ActivityFilter {
            on: day,
            added_by: rep,
            ..ActivityFilter::default()
        };
        self.activity(&filter)
            .await
            .leads
            .into_iter()
            .map(|lead| DailyUrl {
                id: lead.id,
                website_url: lead.website_url,
                category: lead.category,
                status: lead.status,
                created_at: lead.created_at,
            })
            .collect()
    }

    pub async fn export_activity(&self, filter: &ActivityFilter) -> Vec<ActivityExportRow> {
        self.activity(filter)
            .await
            .leads
            .iter()
            .map(ActivityExportRow::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clean_url_drops_scheme_and_trailing_slash() {
        assert_eq!(clean_url("https://acme.io/"), "acme.io");
        assert_eq!(clean_url("http://acme.io/pricing"), "acme.io/pricing");
        assert_eq!(clean_url("acme.io"), "acme.io");
        assert_eq!(clean_url(""), "");
    }

    #[test]
    fn date_range_is_inclusive_of_the_last_day() {
        let filter = ActivityFilter {
            from: NaiveDate::from_ymd_opt(2025, 6, 1),
            to: NaiveDate::from_ymd_opt(2025, 6, 30),
            ..ActivityFilter::default()
        };
        let query = filter.to_query();
        assert_eq!(query.filters[0], Filter::gte("createdAt", "2025-06-01T00:00:00.000Z"));
        assert_eq!(query.filters[1], Filter::lt("createdAt", "2025-07-01T00:00:00.000Z"));
        assert!(query.any_of.is_empty());
    }

    #[test]
    fn blank_search_adds_no_condition() {
        let filter = ActivityFilter {
            search: Some("  ".into()),
            ..ActivityFilter::default()
        };
        assert!(filter.to_query().any_of.is_empty());
    }
}
