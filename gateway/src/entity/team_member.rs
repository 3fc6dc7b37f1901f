use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::Entity;
use crate::error::Result;
use crate::gateway::EntityGateway;
use crate::record::RecordId;
use crate::schema::Access;
use crate::schema::EntitySchema;
use crate::schema::FieldDefault;
use crate::schema::FieldKind;
use crate::schema::FieldSpec;
use crate::schema::Normalize;
use crate::schema::stamp;

const DEFAULT_PERMISSIONS: &str = r#"{"dashboard":true,"leads":false,"hotlist":false,"pipeline":false,"calendar":false,"analytics":false,"leaderboard":false,"contacts":false}"#;

pub static SCHEMA: EntitySchema = EntitySchema {
    entity: "team member",
    table: "team_c",
    fields: &[
        FieldSpec::text("name", "Name")
            .normalize(Normalize::Trim)
            .required(),
        FieldSpec::text("email", "email_c")
            .normalize(Normalize::TrimLowercase)
            .required()
            .unique(),
        FieldSpec::new("role", "role_c", FieldKind::Text).default(FieldDefault::Text("viewer")),
        FieldSpec::new("permissions", "permissions_c", FieldKind::JsonText)
            .default(FieldDefault::Json(DEFAULT_PERMISSIONS)),
        FieldSpec::new("status", "status_c", FieldKind::Choice(STATUSES))
            .default(FieldDefault::Text("pending"))
            .access(Access::FixedOnCreate),
        FieldSpec::new("createdAt", "created_at_c", FieldKind::DateTime)
            .fallback("CreatedOn")
            .access(Access::CreatedStamp),
        FieldSpec::new("updatedAt", "updated_at_c", FieldKind::DateTime)
            .fallback("ModifiedOn")
            .access(Access::Touched),
        FieldSpec::new("lastLogin", "last_login_c", FieldKind::DateTime).access(Access::FixedOnCreate),
    ],
};

const STATUSES: &[&str] = &["pending", "active", "inactive"];

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    #[default]
    Pending,
    Active,
    Inactive,
}

/// Sections of the app a member may open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Permissions {
    pub dashboard: bool,
    pub leads: bool,
    pub hotlist: bool,
    pub pipeline: bool,
    pub calendar: bool,
    pub analytics: bool,
    pub leaderboard: bool,
    pub contacts: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            dashboard: true,
            leads: false,
            hotlist: false,
            pipeline: false,
            calendar: false,
            analytics: false,
            leaderboard: false,
            contacts: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub role: String,
    pub permissions: Permissions,
    pub status: MemberStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewTeamMember {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamMemberPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MemberStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

impl Entity for TeamMember {
    type Input = NewTeamMember;
    type Patch = TeamMemberPatch;

    fn schema() -> &'static EntitySchema {
        &SCHEMA
    }

    fn id(&self) -> RecordId {
        self.id
    }
}

impl EntityGateway<TeamMember> {
    /// New members always start out pending.
    pub async fn invite(&self, member: &NewTeamMember) -> Result<TeamMember> {
        self.create(member).await
    }

    pub async fn activate(&self, id: RecordId) -> Result<TeamMember> {
        let patch = TeamMemberPatch {
            status: Some(MemberStatus::Active),
            last_login: Some(stamp(Utc::now())),
            ..TeamMemberPatch::default()
        };
        self.update(id, &patch).await
    }

    pub async fn deactivate(&self, id: RecordId) -> Result<TeamMember> {
        let patch = TeamMemberPatch {
            status: Some(MemberStatus::Inactive),
            ..TeamMemberPatch::default()
        };
        self.update(id, &patch).await
    }

    pub async fn remove(&self, id: RecordId) -> Result<()> {
        self.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use serde_json::json;

    #[test]
    fn create_record_stores_permissions_as_text() {
        let input = json!({"name": " Ana ", "email": " Ana@Example.COM ", "status": "active"});
        let rec = SCHEMA.write_create(input.as_object().unwrap(), Utc::now()).unwrap();
        assert_eq!(rec["Name"], "Ana");
        assert_eq!(rec["email_c"], "ana@example.com");
        assert_eq!(rec["status_c"], "pending");
        assert_eq!(rec["last_login_c"], Value::Null);
        let text = rec["permissions_c"].as_str().unwrap();
        let perms: Permissions = serde_json::from_str(text).unwrap();
        assert_eq!(perms, Permissions::default());
    }

    #[test]
    fn read_falls_back_to_modified_on_and_default_permissions() {
        let rec = json!({
            "Id": 2,
            "Name": "Bo",
            "email_c": "bo@x.io",
            "permissions_c": "not json",
            "ModifiedOn": "2026-10-01T12:00:00Z"
        });
        let map = SCHEMA.read(rec.as_object().unwrap()).unwrap();
        let member: TeamMember = serde_json::from_value(Value::Object(map)).unwrap();
        assert_eq!(member.permissions, Permissions::default());
        assert_eq!(member.status, MemberStatus::Pending);
        assert_eq!(member.role, "viewer");
        assert!(member.updated_at.is_some());
        assert_eq!(member.last_login, None);
    }
}
