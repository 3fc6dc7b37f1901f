use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use super::Entity;
use super::double_option;
use crate::gateway::EntityGateway;
use crate::query::Filter;
use crate::query::Query;
use crate::record::RecordId;
use crate::record::RemoteRecord;
use crate::schema::Access;
use crate::schema::EntitySchema;
use crate::schema::FieldDefault;
use crate::schema::FieldKind;
use crate::schema::FieldSpec;
use crate::schema::Normalize;
use crate::schema::stamp;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

const PRIORITIES: &[&str] = &["Low", "Medium", "High"];

pub static SCHEMA: EntitySchema = EntitySchema {
    entity: "task",
    table: "task_c",
    fields: &[
        FieldSpec::text("title", "title_c")
            .fallback("Name")
            .mirror("Name")
            .normalize(Normalize::Trim)
            .required(),
        FieldSpec::text("description", "description_c"),
        FieldSpec::new("categoryId", "category_id_c", FieldKind::Integer)
            .default(FieldDefault::Integer(1)),
        FieldSpec::new("priority", "priority_c", FieldKind::Choice(PRIORITIES))
            .default(FieldDefault::Text("Medium")),
        FieldSpec::new("dueDate", "due_date_c", FieldKind::Date),
        FieldSpec::new("completed", "completed_c", FieldKind::Bool)
            .default(FieldDefault::Bool(false))
            .access(Access::FixedOnCreate),
        FieldSpec::new("archived", "archived_c", FieldKind::Bool)
            .default(FieldDefault::Bool(false))
            .access(Access::FixedOnCreate),
        FieldSpec::new("createdAt", "created_at_c", FieldKind::DateTime)
            .fallback("CreatedOn")
            .access(Access::CreatedStamp),
        FieldSpec::new("completedAt", "completed_at_c", FieldKind::DateTime).access(Access::Derived),
    ],
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub title: String,
    pub description: String,
    pub category_id: RecordId,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub archived: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

impl Entity for Task {
    type Input = NewTask;
    type Patch = TaskPatch;

    fn schema() -> &'static EntitySchema {
        &SCHEMA
    }

    fn id(&self) -> RecordId {
        self.id
    }

    /// Completing stamps `completedAt`; reopening clears it.
    fn on_update(patch: &Map<String, Value>, record: &mut RemoteRecord, now: DateTime<Utc>) {
        if let Some(done) = patch.get("completed").and_then(Value::as_bool) {
            let at = if done { Value::from(stamp(now)) } else { Value::Null };
            record.insert("completed_at_c".to_string(), at);
        }
    }
}

fn open() -> [Filter; 2] {
    [Filter::eq("completed", false), Filter::eq("archived", false)]
}

impl EntityGateway<Task> {
    pub async fn by_category(&self, category_id: RecordId) -> Vec<Task> {
        self.list(Query::new().filter(Filter::eq("categoryId", category_id)))
            .await
    }

    /// Case-insensitive substring match on title or description.
    pub async fn search(&self, text: &str) -> Vec<Task> {
        let text = text.trim();
        if text.is_empty() {
            return self.get_all().await;
        }
        self.list(Query::new().any_of(vec![
            Filter::contains("title", text),
            Filter::contains("description", text),
        ]))
        .await
    }

    pub async fn completed(&self) -> Vec<Task> {
        self.list(
            Query::new()
                .filter(Filter::eq("completed", true))
                .filter(Filter::eq("archived", false)),
        )
        .await
    }

    pub async fn pending(&self) -> Vec<Task> {
        let [a, b] = open();
        self.list(Query::new().filter(a).filter(b)).await
    }

    /// Open tasks due strictly before `day`.
    pub async fn overdue_on(&self, day: NaiveDate) -> Vec<Task> {
        let [a, b] = open();
        self.list(
            Query::new()
                .filter(a)
                .filter(b)
                .filter(Filter::lt("dueDate", day.to_string())),
        )
        .await
    }

    pub async fn overdue(&self) -> Vec<Task> {
        self.overdue_on(Utc::now().date_naive()).await
    }

    /// Open tasks due on `day`.
    pub async fn due_on(&self, day: NaiveDate) -> Vec<Task> {
        let [a, b] = open();
        self.list(
            Query::new()
                .filter(a)
                .filter(b)
                .filter(Filter::eq("dueDate", day.to_string())),
        )
        .await
    }

    pub async fn due_today(&self) -> Vec<Task> {
        self.due_on(Utc::now().date_naive()).await
    }

    pub async fn set_completed(&self, id: RecordId, completed: bool) -> crate::Result<Task> {
        self.update(
            id,
            &TaskPatch {
                completed: Some(completed),
                ..TaskPatch::default()
            },
        )
        .await
    }

    pub async fn archive(&self, id: RecordId, archived: bool) -> crate::Result<Task> {
        self.update(
            id,
            &TaskPatch {
                archived: Some(archived),
                ..TaskPatch::default()
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn completing_stamps_and_reopening_clears() {
        let now = Utc::now();
        let mut rec = RemoteRecord::new();
        let patch = json!({"completed": true});
        Task::on_update(patch.as_object().unwrap(), &mut rec, now);
        assert_eq!(rec["completed_at_c"], Value::from(stamp(now)));

        let patch = json!({"completed": false});
        Task::on_update(patch.as_object().unwrap(), &mut rec, now);
        assert_eq!(rec["completed_at_c"], Value::Null);

        let mut untouched = RemoteRecord::new();
        Task::on_update(json!({"title": "x"}).as_object().unwrap(), &mut untouched, now);
        assert!(untouched.is_empty());
    }

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let p: TaskPatch = serde_json::from_value(json!({"dueDate": null})).unwrap();
        assert_eq!(p.due_date, Some(None));
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v, json!({"dueDate": null}));

        let p: TaskPatch = serde_json::from_value(json!({})).unwrap();
        assert_eq!(p.due_date, None);
        assert_eq!(serde_json::to_value(&p).unwrap(), json!({}));
    }

    #[test]
    fn read_mapper_fills_task_defaults() {
        let rec = json!({"Id": 3, "Name": "legacy", "due_date_c": "2026-10-20T00:00:00Z"});
        let map = SCHEMA.read(rec.as_object().unwrap()).unwrap();
        let task: Task = serde_json::from_value(Value::Object(map)).unwrap();
        assert_eq!(task.title, "legacy");
        assert_eq!(task.category_id, 1);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 10, 20));
        assert!(!task.completed && !task.archived);
        assert_eq!(task.completed_at, None);
    }
}
