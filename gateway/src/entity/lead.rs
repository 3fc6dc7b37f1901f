use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Days;
use chrono::NaiveDate;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::Entity;
use super::SalesRep;
use super::double_option;
use crate::gateway::EntityGateway;
use crate::query::Filter;
use crate::query::Query;
use crate::record::RecordId;
use crate::record::SortDirection;
use crate::schema::Access;
use crate::schema::EntitySchema;
use crate::schema::FieldDefault;
use crate::schema::FieldKind;
use crate::schema::FieldSpec;
use crate::schema::Normalize;

/// Below this many leads in a day a rep is flagged in the daily report.
pub const DAILY_LEAD_TARGET: usize = 5;

/// Follow-ups are listed this many days ahead.
pub const FOLLOW_UP_WINDOW_DAYS: u64 = 7;

pub static SCHEMA: EntitySchema = EntitySchema {
    entity: "lead",
    table: "lead_c",
    fields: &[
        FieldSpec::text("websiteUrl", "website_url_c")
            .mirror("Name")
            .normalize(Normalize::Trim)
            .required()
            .unique(),
        FieldSpec::text("name", "Name").access(Access::Derived),
        FieldSpec::new("teamSize", "team_size_c", FieldKind::Text).default(FieldDefault::Text("1-3")),
        FieldSpec::new("arr", "arr_c", FieldKind::Number).default(FieldDefault::Number(0.0)),
        FieldSpec::new("category", "category_c", FieldKind::Text).default(FieldDefault::Text("Other")),
        FieldSpec::text("linkedinUrl", "linkedin_url_c").normalize(Normalize::Trim),
        FieldSpec::new("status", "status_c", FieldKind::Text)
            .default(FieldDefault::Text("Keep an Eye")),
        FieldSpec::new("fundingType", "funding_type_c", FieldKind::Text)
            .default(FieldDefault::Text("Bootstrapped")),
        FieldSpec::new("edition", "edition_c", FieldKind::Text)
            .default(FieldDefault::Text("Select Edition")),
        FieldSpec::new("followUpDate", "follow_up_date_c", FieldKind::Date),
        FieldSpec::new("addedBy", "added_by_c", FieldKind::Integer).default(FieldDefault::Integer(0)),
        FieldSpec::new("addedByName", "added_by_name_c", FieldKind::Text)
            .default(FieldDefault::Text("Unknown"))
            .create_default(FieldDefault::Text("Current User")),
        FieldSpec::new("createdAt", "created_at_c", FieldKind::DateTime)
            .fallback("CreatedOn")
            .access(Access::CreatedStamp),
    ],
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub name: String,
    pub website_url: String,
    pub team_size: String,
    pub arr: f64,
    pub category: String,
    pub linkedin_url: String,
    pub status: String,
    pub funding_type: String,
    pub edition: String,
    pub follow_up_date: Option<NaiveDate>,
    pub added_by: RecordId,
    pub added_by_name: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeadFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edition: Option<String>,
    #[serde(
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub follow_up_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_by: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_by_name: Option<String>,
}

impl LeadFields {
    pub fn for_site(url: impl Into<String>) -> Self {
        Self {
            website_url: Some(url.into()),
            ..Self::default()
        }
    }
}

impl Entity for Lead {
    type Input = LeadFields;
    type Patch = LeadFields;

    fn schema() -> &'static EntitySchema {
        &SCHEMA
    }

    fn id(&self) -> RecordId {
        self.id
    }
}

/// Lead entry in a daily report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportedLead {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub website_url: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepDailyReport {
    pub sales_rep: String,
    pub sales_rep_id: RecordId,
    pub leads: Vec<ReportedLead>,
    pub lead_count: usize,
    pub low_performance: bool,
}

impl EntityGateway<Lead> {
    pub async fn all_newest_first(&self) -> Vec<Lead> {
        self.list(Query::new().order_by("createdAt", SortDirection::Desc))
            .await
    }

    /// Leads whose follow-up falls within a week of `from`, soonest first.
    pub async fn pending_follow_ups_from(&self, from: NaiveDate) -> Vec<Lead> {
        let until = from
            .checked_add_days(Days::new(FOLLOW_UP_WINDOW_DAYS))
            .unwrap_or(NaiveDate::MAX);
        self.list(
            Query::new()
                .filter(Filter::gte("followUpDate", from.to_string()))
                .filter(Filter::lte("followUpDate", until.to_string()))
                .order_by("followUpDate", SortDirection::Asc),
        )
        .await
    }

    pub async fn pending_follow_ups(&self) -> Vec<Lead> {
        self.pending_follow_ups_from(Utc::now().date_naive()).await
    }

    /// Leads created on `day` grouped by the rep named in `addedByName`.
    /// Every rep appears, busiest first; leads attributed to a name that is
    /// not a known rep are left out.
    pub async fn daily_report_for(
        &self,
        reps: &EntityGateway<SalesRep>,
        day: NaiveDate,
    ) -> Vec<RepDailyReport> {
        let (leads, reps) = futures::join!(
            self.list(Query::new().filter(Filter::on_day("createdAt", day))),
            reps.get_all()
        );
        let mut by_rep: BTreeMap<String, RepDailyReport> = BTreeMap::new();
        for rep in reps {
            by_rep.entry(rep.name.clone()).or_insert(RepDailyReport {
                sales_rep: rep.name,
                sales_rep_id: rep.id,
                leads: Vec::new(),
                lead_count: 0,
                low_performance: false,
            });
        }
        for lead in leads {
            if let Some(entry) = by_rep.get_mut(&lead.added_by_name) {
                entry.leads.push(ReportedLead {
                    id: lead.id,
                    website_url: lead.website_url,
                    created_at: lead.created_at,
                });
            }
        }
        let mut report: Vec<RepDailyReport> = by_rep
            .into_values()
            .map(|mut r| {
                r.lead_count = r.leads.len();
                r.low_performance = r.lead_count < DAILY_LEAD_TARGET;
                r
            })
            .collect();
        report.sort_by(|a, b| b.lead_count.cmp(&a.lead_count));
        report
    }

    pub async fn daily_report(&self, reps: &EntityGateway<SalesRep>) -> Vec<RepDailyReport> {
        self.daily_report_for(reps, Utc::now().date_naive()).await
    }
}
