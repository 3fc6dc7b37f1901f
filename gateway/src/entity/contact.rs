use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::Entity;
use crate::record::RecordId;
use crate::schema::Access;
use crate::schema::EntitySchema;
use crate::schema::FieldDefault;
use crate::schema::FieldKind;
use crate::schema::FieldSpec;
use crate::schema::Normalize;

pub static SCHEMA: EntitySchema = EntitySchema {
    entity: "contact",
    table: "app_contact_c",
    fields: &[
        FieldSpec::text("name", "Name").normalize(Normalize::Trim),
        FieldSpec::text("email", "email_c").normalize(Normalize::Trim),
        FieldSpec::text("company", "company_c"),
        FieldSpec::new("status", "status_c", FieldKind::Text).default(FieldDefault::Text("New")),
        FieldSpec::text("assignedRep", "assigned_rep_c"),
        FieldSpec::text("notes", "notes_c"),
        FieldSpec::new("createdAt", "created_at_c", FieldKind::DateTime)
            .fallback("CreatedOn")
            .access(Access::CreatedStamp),
    ],
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub company: String,
    pub status: String,
    pub assigned_rep: String,
    pub notes: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Create input and patch share one shape: every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_rep: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Entity for Contact {
    type Input = ContactFields;
    type Patch = ContactFields;

    fn schema() -> &'static EntitySchema {
        &SCHEMA
    }

    fn id(&self) -> RecordId {
        self.id
    }
}
