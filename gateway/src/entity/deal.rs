use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::Entity;
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

pub static SCHEMA: EntitySchema = EntitySchema {
    entity: "deal",
    table: "deal_c",
    fields: &[
        FieldSpec::text("name", "Name").normalize(Normalize::Trim),
        FieldSpec::text("leadName", "lead_name_c"),
        FieldSpec::new("leadId", "lead_id_c", FieldKind::Reference),
        FieldSpec::new("value", "value_c", FieldKind::Number).default(FieldDefault::Number(0.0)),
        FieldSpec::text("stage", "stage_c"),
        FieldSpec::text("assignedRep", "assigned_rep_c"),
        FieldSpec::text("edition", "edition_c"),
        FieldSpec::new("startMonth", "start_month_c", FieldKind::Integer)
            .default(FieldDefault::Integer(1)),
        FieldSpec::new("endMonth", "end_month_c", FieldKind::Integer)
            .default(FieldDefault::Integer(12)),
        FieldSpec::new("createdAt", "created_at_c", FieldKind::DateTime)
            .fallback("CreatedOn")
            .access(Access::CreatedStamp),
    ],
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub name: String,
    pub lead_name: String,
    pub lead_id: Option<RecordId>,
    pub value: f64,
    pub stage: String,
    pub assigned_rep: String,
    pub edition: String,
    pub start_month: i64,
    pub end_month: i64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DealFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_name: Option<String>,
    #[serde(
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub lead_id: Option<Option<RecordId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_rep: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_month: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_month: Option<i64>,
}

impl Entity for Deal {
    type Input = DealFields;
    type Patch = DealFields;

    fn schema() -> &'static EntitySchema {
        &SCHEMA
    }

    fn id(&self) -> RecordId {
        self.id
    }
}

impl EntityGateway<Deal> {
    pub async fn all_newest_first(&self) -> Vec<Deal> {
        self.list(Query::new().order_by("createdAt", SortDirection::Desc))
            .await
    }

    /// Deals created in `year`, newest first.
    pub async fn by_year(&self, year: i32) -> Vec<Deal> {
        self.list(
            Query::new()
                .filter(Filter::in_year("createdAt", year))
                .order_by("createdAt", SortDirection::Desc),
        )
        .await
    }
}
