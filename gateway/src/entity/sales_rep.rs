use serde::Deserialize;
use serde::Serialize;

use super::Entity;
use crate::record::RecordId;
use crate::schema::EntitySchema;
use crate::schema::FieldDefault;
use crate::schema::FieldKind;
use crate::schema::FieldSpec;
use crate::schema::Normalize;

pub static SCHEMA: EntitySchema = EntitySchema {
    entity: "sales rep",
    table: "sales_rep_c",
    fields: &[
        FieldSpec::text("name", "Name").normalize(Normalize::Trim),
        FieldSpec::new("leadsContacted", "leads_contacted_c", FieldKind::Integer)
            .default(FieldDefault::Integer(0)),
        FieldSpec::new("meetingsBooked", "meetings_booked_c", FieldKind::Integer)
            .default(FieldDefault::Integer(0)),
        FieldSpec::new("dealsClosed", "deals_closed_c", FieldKind::Integer)
            .default(FieldDefault::Integer(0)),
        FieldSpec::new("totalRevenue", "total_revenue_c", FieldKind::Number)
            .default(FieldDefault::Number(0.0)),
    ],
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SalesRep {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub name: String,
    pub leads_contacted: i64,
    pub meetings_booked: i64,
    pub deals_closed: i64,
    pub total_revenue: f64,
}

impl SalesRep {
    /// Closed deals per booked meeting, as a rounded percentage.
    pub fn conversion_rate(&self) -> i64 {
        if self.meetings_booked <= 0 {
            return 0;
        }
        (self.deals_closed as f64 / self.meetings_booked as f64 * 100.0).round() as i64
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SalesRepFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leads_contacted: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meetings_booked: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deals_closed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_revenue: Option<f64>,
}

impl Entity for SalesRep {
    type Input = SalesRepFields;
    type Patch = SalesRepFields;

    fn schema() -> &'static EntitySchema {
        &SCHEMA
    }

    fn id(&self) -> RecordId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_rate_rounds_and_handles_no_meetings() {
        let mut rep = SalesRep {
            id: 1,
            name: "Ana".into(),
            leads_contacted: 10,
            meetings_booked: 3,
            deals_closed: 2,
            total_revenue: 0.0,
        };
        assert_eq!(rep.conversion_rate(), 67);
        rep.meetings_booked = 0;
        assert_eq!(rep.conversion_rate(), 0);
    }
}
