//! Read-side aggregations over leads, deals and sales reps.
//!
//! Every figure is computed from full reads issued concurrently. A failed
//! read degrades its own figure to zero and is logged; the rest of the
//! aggregate is still returned.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Datelike;
use chrono::Days;
use chrono::NaiveDate;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::entity::Deal;
use crate::entity::Lead;
use crate::entity::SalesRep;
use crate::error::Result;
use crate::gateway::EntityGateway;
use crate::query::Filter;
use crate::query::Query;
use crate::query::RelativeDate;
use crate::record::RecordId;
use crate::record::SortDirection;
use crate::report::clean_url;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const FUNNEL_STAGES: [(&str, Option<&str>); 4] = [
    ("Leads", None),
    ("Connected", Some("Connected")),
    ("Meetings", Some("Meeting Booked")),
    ("Closed", Some("Meeting Done")),
];

const RECENT_PER_KIND: usize = 5;
const RECENT_LIMIT: usize = 10;
const DETAILED_RECENT_LIMIT: usize = 10;
const MEETING_MINUTES: u32 = 30;
const LEAD_CHART_DAYS: u32 = 14;

const SAMPLE_FUNNEL: [f64; 4] = [100.0, 25.0, 12.0, 8.0];
const SAMPLE_REVENUE: [f64; 12] = [
    45000.0, 52000.0, 48000.0, 61000.0, 55000.0, 67000.0, 72000.0, 58000.0, 63000.0, 69000.0,
    74000.0, 81000.0,
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub total_leads: usize,
    pub meetings_booked: usize,
    pub deals_closed: usize,
    /// Closed deals per lead, percent with one decimal.
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadsMetrics {
    pub today: usize,
    /// Percent change of today against yesterday; 100 when yesterday had none.
    pub today_trend: i64,
    pub yesterday: usize,
    pub this_week: usize,
    pub this_month: usize,
    pub total_leads: usize,
    pub status_distribution: BTreeMap<String, usize>,
    pub category_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPerformance {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub name: String,
    pub total_leads: usize,
    pub today_leads: usize,
    pub week_leads: usize,
    pub month_leads: usize,
    pub conversion_rate: i64,
}

/// Leads for a period and user, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadsAnalytics {
    pub leads: Vec<Lead>,
    pub total_count: usize,
}

/// Same ranking as [`UserPerformance`], trimmed for a leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRanking {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub name: String,
    pub total_leads: usize,
    pub week_leads: usize,
    pub today_leads: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Contact,
    Meeting,
    Deal,
}

/// One line of the dashboard activity feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// `lead-<Id>` or `deal-<Id>`.
    pub id: String,
    pub title: String,
    pub kind: ActivityKind,
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingKind {
    Demo,
    Followup,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub title: String,
    pub client: String,
    pub at: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub kind: MeetingKind,
}

impl Meeting {
    fn from_deal(deal: Deal) -> Self {
        let client = if deal.lead_name.is_empty() {
            deal.name
        } else {
            deal.lead_name
        };
        let kind = if deal.stage.to_lowercase().contains("booked") {
            MeetingKind::Demo
        } else {
            MeetingKind::Followup
        };
        Self {
            id: deal.id,
            title: format!("{} - {client}", deal.stage),
            client,
            at: deal.created_at,
            duration_minutes: MEETING_MINUTES,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub data: Vec<f64>,
}

/// Chart-ready data: one label per point and one or more series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub categories: Vec<String>,
    pub series: Vec<Series>,
    /// Set when the figures are the static sample rather than real data.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sample: bool,
}

impl Chart {
    fn new(categories: Vec<String>, name: &str, data: Vec<f64>) -> Self {
        Self {
            categories,
            series: vec![Series {
                name: name.to_string(),
                data,
            }],
            sample: false,
        }
    }

    fn sample(mut self) -> Self {
        self.sample = true;
        self
    }
}

#[derive(Clone)]
pub struct Analytics {
    leads: EntityGateway<Lead>,
    deals: EntityGateway<Deal>,
    reps: EntityGateway<SalesRep>,
    sample_fallback: bool,
}

fn leads_in(range: Option<RelativeDate>, user: Option<RecordId>) -> Query {
    let mut query = Query::new();
    if let Some(range) = range {
        query = query.filter(Filter::relative("createdAt", range));
    }
    if let Some(user) = user {
        query = query.filter(Filter::eq("addedBy", user));
    }
    query
}

fn or_zero(result: Result<usize>, metric: &str) -> usize {
    result.unwrap_or_else(|e| {
        warn!(metric, error = %e, "metric unavailable; reporting 0");
        0
    })
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 100.0).round()
}

impl Analytics {
    pub fn new(
        leads: EntityGateway<Lead>,
        deals: EntityGateway<Deal>,
        reps: EntityGateway<SalesRep>,
    ) -> Self {
        Self {
            leads,
            deals,
            reps,
            sample_fallback: false,
        }
    }

    /// Serve the static sample charts when real data is unavailable.
    pub fn with_sample_fallback(mut self, enabled: bool) -> Self {
        self.sample_fallback = enabled;
        self
    }

    pub async fn dashboard_metrics(&self) -> DashboardMetrics {
        let (leads, meetings, closed) = futures::join!(
            self.leads.count(Query::new()),
            self.deals
                .count(Query::new().filter(Filter::contains("stage", "Meeting"))),
            self.deals.count(Query::new().filter(Filter::eq("stage", "Closed"))),
        );
        let total_leads = or_zero(leads, "total leads");
        let deals_closed = or_zero(closed, "closed deals");
        let conversion_rate = if total_leads == 0 {
            0.0
        } else {
            (deals_closed as f64 / total_leads as f64 * 1000.0).round() / 10.0
        };
        DashboardMetrics {
            total_leads,
            meetings_booked: or_zero(meetings, "meetings"),
            deals_closed,
            conversion_rate,
        }
    }

    /// Lead counts per period plus status and category breakdowns, for
    /// everyone or for leads added by `user`.
    pub async fn leads_metrics(&self, user: Option<RecordId>) -> LeadsMetrics {
        let (today, yesterday, week, month, all) = futures::join!(
            self.leads.count(leads_in(Some(RelativeDate::Today), user)),
            self.leads.count(leads_in(Some(RelativeDate::Yesterday), user)),
            self.leads.count(leads_in(Some(RelativeDate::ThisWeek), user)),
            self.leads.count(leads_in(Some(RelativeDate::ThisMonth), user)),
            self.leads.try_list(leads_in(None, user)),
        );
        let today = or_zero(today, "leads today");
        let yesterday = or_zero(yesterday, "leads yesterday");
        let today_trend = if yesterday == 0 {
            100
        } else {
            ((today as f64 - yesterday as f64) / yesterday as f64 * 100.0).round() as i64
        };
        let all = all.unwrap_or_else(|e| {
            warn!(error = %e, "lead distribution unavailable");
            Vec::new()
        });
        let mut status_distribution = BTreeMap::new();
        let mut category_distribution = BTreeMap::new();
        for lead in &all {
            *status_distribution.entry(lead.status.clone()).or_insert(0) += 1;
            *category_distribution.entry(lead.category.clone()).or_insert(0) += 1;
        }
        LeadsMetrics {
            today,
            today_trend,
            yesterday,
            this_week: or_zero(week, "leads this week"),
            this_month: or_zero(month, "leads this month"),
            total_leads: all.len(),
            status_distribution,
            category_distribution,
        }
    }

    /// Per-rep lead counts, busiest rep first.
    pub async fn user_performance(&self) -> Vec<UserPerformance> {
        let reps = self.reps.get_all().await;
        let mut rows = join_all(reps.into_iter().map(|rep| async move {
            let user = Some(rep.id);
            let (total, today, week, month) = futures::join!(
                self.leads.count(leads_in(None, user)),
                self.leads.count(leads_in(Some(RelativeDate::Today), user)),
                self.leads.count(leads_in(Some(RelativeDate::ThisWeek), user)),
                self.leads.count(leads_in(Some(RelativeDate::ThisMonth), user)),
            );
            UserPerformance {
                id: rep.id,
                name: if rep.name.is_empty() {
                    "Unknown".to_string()
                } else {
                    rep.name.clone()
                },
                total_leads: or_zero(total, "rep total leads"),
                today_leads: or_zero(today, "rep leads today"),
                week_leads: or_zero(week, "rep leads this week"),
                month_leads: or_zero(month, "rep leads this month"),
                conversion_rate: rep.conversion_rate(),
            }
        }))
        .await;
        rows.sort_by(|a, b| b.total_leads.cmp(&a.total_leads));
        rows
    }

    /// Share of all leads that reached each funnel stage, by lead status.
    pub async fn sales_funnel(&self) -> Chart {
        let categories: Vec<String> = FUNNEL_STAGES.iter().map(|(n, _)| n.to_string()).collect();
        let leads = match self.leads.try_list(Query::new()).await {
            Ok(leads) if !leads.is_empty() => leads,
            Ok(_) => return self.fallback(categories, "Conversion Rate", &SAMPLE_FUNNEL),
            Err(e) => {
                warn!(error = %e, "sales funnel unavailable");
                return self.fallback(categories, "Conversion Rate", &SAMPLE_FUNNEL);
            }
        };
        let total = leads.len();
        let data = FUNNEL_STAGES
            .iter()
            .map(|(_, status)| {
                let count = match status {
                    None => total,
                    Some(s) => leads.iter().filter(|l| l.status == *s).count(),
                };
                percent(count, total)
            })
            .collect();
        Chart::new(categories, "Conversion Rate", data)
    }

    /// Deal value summed per calendar month of `year`.
    pub async fn revenue_trends(&self, year: i32) -> Chart {
        let categories: Vec<String> = MONTHS.iter().map(|m| m.to_string()).collect();
        let deals = match self
            .deals
            .try_list(Query::new().filter(Filter::in_year("createdAt", year)))
            .await
        {
            Ok(deals) if !deals.is_empty() => deals,
            Ok(_) => return self.fallback(categories, "Monthly Revenue", &SAMPLE_REVENUE),
            Err(e) => {
                warn!(error = %e, year, "revenue trends unavailable");
                return self.fallback(categories, "Monthly Revenue", &SAMPLE_REVENUE);
            }
        };
        let mut totals = [0.0_f64; 12];
        for deal in &deals {
            let Some(at) = deal.created_at else { continue };
            if at.year() == year {
                totals[at.month0() as usize] += deal.value;
            }
        }
        Chart::new(categories, "Monthly Revenue", totals.to_vec())
    }

    /// New leads per day for the `days` days ending on `until`, oldest first.
    pub async fn daily_leads_chart_until(
        &self,
        until: NaiveDate,
        days: u32,
        user: Option<RecordId>,
    ) -> Chart {
        let dates: Vec<NaiveDate> = (0..days)
            .rev()
            .filter_map(|back| until.checked_sub_days(Days::new(u64::from(back))))
            .collect();
        let counts = join_all(dates.iter().map(|&day| async move {
            let mut query = Query::new().filter(Filter::on_day("createdAt", day));
            if let Some(user) = user {
                query = query.filter(Filter::eq("addedBy", user));
            }
            or_zero(self.leads.count(query).await, "daily leads") as f64
        }))
        .await;
        let categories = dates.iter().map(|d| d.to_string()).collect();
        Chart::new(categories, "New Leads", counts)
    }

    pub async fn daily_leads_chart(&self, days: u32, user: Option<RecordId>) -> Chart {
        self.daily_leads_chart_until(Utc::now().date_naive(), days, user)
            .await
    }

    /// Leads added in `period` (all time when `None`) by `user` (everyone
    /// when `None`), newest first.
    pub async fn leads_analytics(
        &self,
        period: Option<RelativeDate>,
        user: Option<RecordId>,
    ) -> LeadsAnalytics {
        let leads = self
            .leads
            .list(leads_in(period, user).order_by("createdAt", SortDirection::Desc))
            .await;
        LeadsAnalytics {
            total_count: leads.len(),
            leads,
        }
    }

    /// Leads one rep added in `period`, newest first. Ids below 1 name no
    /// rep and give an empty list.
    pub async fn user_leads_report(&self, user: RecordId, period: RelativeDate) -> Vec<Lead> {
        if user < 1 {
            warn!(user, "no such rep id; empty report");
            return Vec::new();
        }
        self.leads_analytics(Some(period), Some(user)).await.leads
    }

    pub async fn team_rankings(&self) -> Vec<TeamRanking> {
        self.user_performance()
            .await
            .into_iter()
            .map(|p| TeamRanking {
                id: p.id,
                name: p.name,
                total_leads: p.total_leads,
                week_leads: p.week_leads,
                today_leads: p.today_leads,
            })
            .collect()
    }

    /// Newest leads and deals merged into one feed, newest first.
    pub async fn recent_activity(&self) -> Vec<Activity> {
        let newest = || {
            Query::new()
                .order_by("createdAt", SortDirection::Desc)
                .limit(RECENT_PER_KIND)
        };
        let (leads, deals) = futures::join!(self.leads.list(newest()), self.deals.list(newest()));
        let mut feed: Vec<Activity> = leads
            .into_iter()
            .map(|lead| {
                let site = if lead.website_url.is_empty() {
                    lead.name
                } else {
                    lead.website_url
                };
                Activity {
                    id: format!("lead-{}", lead.id),
                    title: format!("New lead: {site}"),
                    kind: ActivityKind::Contact,
                    at: lead.created_at,
                }
            })
            .chain(deals.into_iter().map(|deal| Activity {
                id: format!("deal-{}", deal.id),
                title: format!("Deal {}: {} - ${}", deal.stage, deal.name, deal.value),
                kind: if deal.stage == "Closed" {
                    ActivityKind::Deal
                } else {
                    ActivityKind::Meeting
                },
                at: deal.created_at,
            }))
            .collect();
        feed.sort_by(|a, b| b.at.cmp(&a.at));
        feed.truncate(RECENT_LIMIT);
        feed
    }

    /// The newest leads alone, with their site shown without scheme.
    pub async fn detailed_recent_activity(&self) -> Vec<Activity> {
        self.leads
            .list(
                Query::new()
                    .order_by("createdAt", SortDirection::Desc)
                    .limit(DETAILED_RECENT_LIMIT),
            )
            .await
            .into_iter()
            .map(|lead| {
                let site = match clean_url(&lead.website_url) {
                    "" => "Unknown URL",
                    site => site,
                };
                Activity {
                    id: format!("lead-{}", lead.id),
                    title: format!("New lead added: {site}"),
                    kind: ActivityKind::Contact,
                    at: lead.created_at,
                }
            })
            .collect()
    }

    /// Deals at a meeting stage created on `day`.
    pub async fn meetings_on(&self, day: NaiveDate) -> Vec<Meeting> {
        self.deals
            .list(
                Query::new()
                    .filter(Filter::contains("stage", "Meeting"))
                    .filter(Filter::on_day("createdAt", day)),
            )
            .await
            .into_iter()
            .map(Meeting::from_deal)
            .collect()
    }

    pub async fn todays_meetings(&self) -> Vec<Meeting> {
        self.meetings_on(Utc::now().date_naive()).await
    }

    /// New leads per day over the last two weeks.
    pub async fn lead_performance_chart(&self) -> Chart {
        self.daily_leads_chart(LEAD_CHART_DAYS, None).await
    }

    fn fallback(&self, categories: Vec<String>, name: &str, sample: &[f64]) -> Chart {
        if self.sample_fallback {
            Chart::new(categories, name, sample.to_vec()).sample()
        } else {
            let zeros = vec![0.0; categories.len()];
            Chart::new(categories, name, zeros)
        }
    }
}
