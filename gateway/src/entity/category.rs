use std::collections::BTreeMap;

use futures::future::join_all;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use super::Entity;
use super::Task;
use crate::gateway::EntityGateway;
use crate::query::Filter;
use crate::query::Query;
use crate::record::RecordId;
use crate::schema::Access;
use crate::schema::EntitySchema;
use crate::schema::FieldDefault;
use crate::schema::FieldKind;
use crate::schema::FieldSpec;
use crate::schema::Normalize;

pub static SCHEMA: EntitySchema = EntitySchema {
    entity: "category",
    table: "category_c",
    fields: &[
        FieldSpec::text("name", "Name").normalize(Normalize::Trim),
        FieldSpec::new("color", "color_c", FieldKind::Text).default(FieldDefault::Text("#5B4FE9")),
        FieldSpec::new("icon", "icon_c", FieldKind::Text).default(FieldDefault::Text("Folder")),
        FieldSpec::new("taskCount", "task_count_c", FieldKind::Integer)
            .default(FieldDefault::Integer(0))
            .access(Access::FixedOnCreate),
    ],
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub task_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewCategory {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_count: Option<i64>,
}

impl Entity for Category {
    type Input = NewCategory;
    type Patch = CategoryPatch;

    fn schema() -> &'static EntitySchema {
        &SCHEMA
    }

    fn id(&self) -> RecordId {
        self.id
    }
}

impl EntityGateway<Category> {
    /// Non-archived task count per category. Counts are read concurrently and
    /// a failed read reports 0 for that category only.
    pub async fn task_counts(&self, tasks: &EntityGateway<Task>) -> BTreeMap<RecordId, usize> {
        let categories = self.get_all().await;
        let counts = join_all(categories.iter().map(|c| async move {
            let query = Query::new()
                .filter(Filter::eq("categoryId", c.id))
                .filter(Filter::eq("archived", false));
            let count = tasks.count(query).await.unwrap_or_else(|e| {
                warn!(category = c.id, error = %e, "task count unavailable; reporting 0");
                0
            });
            (c.id, count)
        }))
        .await;
        counts.into_iter().collect()
    }

    /// Recompute task counts and store them on each category. Categories that
    /// fail to update are logged and skipped.
    pub async fn refresh_task_counts(&self, tasks: &EntityGateway<Task>) -> BTreeMap<RecordId, usize> {
        let counts = self.task_counts(tasks).await;
        let writes = join_all(counts.iter().map(|(&id, &count)| async move {
            let patch = CategoryPatch {
                task_count: Some(count as i64),
                ..CategoryPatch::default()
            };
            match self.update(id, &patch).await {
                Ok(_) => Some((id, count)),
                Err(e) => {
                    warn!(category = id, error = %e, "failed to store task count");
                    None
                }
            }
        }))
        .await;
        writes.into_iter().flatten().collect()
    }
}
