//! Wire shapes exchanged with a remote record store.
//!
//! Field names follow the record service's JSON conventions (`Id`,
//! `FieldName`, `RecordIds`, ...) so the same types serve the HTTP client and
//! the local stores.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Store-assigned record identity.
pub type RecordId = i64;

/// One record as the store sees it: remote column name to value.
pub type RemoteRecord = Map<String, Value>;

pub const ID_COLUMN: &str = "Id";
pub const CREATED_ON_COLUMN: &str = "CreatedOn";
pub const MODIFIED_ON_COLUMN: &str = "ModifiedOn";

pub fn record_id(record: &RemoteRecord) -> Option<RecordId> {
    record.get(ID_COLUMN).and_then(Value::as_i64)
}

/// `{success, data | results, message}` returned by every store call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(alias = "results", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn message_or(&self, fallback: &str) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Why a single record in a write batch was rejected, when the store can tell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Conflict,
}

/// Per-record outcome of a create, update or delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordResult {
    #[serde(rename = "Id", default)]
    pub id: Option<RecordId>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RemoteRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl RecordResult {
    pub fn written(id: RecordId, data: RemoteRecord) -> Self {
        Self {
            id: Some(id),
            success: true,
            data: Some(data),
            message: None,
            failure: None,
        }
    }

    pub fn deleted(id: RecordId) -> Self {
        Self {
            id: Some(id),
            success: true,
            data: None,
            message: None,
            failure: None,
        }
    }

    pub fn rejected(id: Option<RecordId>, failure: FailureKind, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            data: None,
            message: Some(message.into()),
            failure: Some(failure),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Operator {
    EqualTo,
    NotEqualTo,
    Contains,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    /// Date column relative to the store's current day (`Today`, `this week`, ...).
    RelativeMatch,
    /// Date column matched on one component, selected by the sub-operator.
    ExactMatch,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Day,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Condition {
    pub field_name: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_operator: Option<DatePart>,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupOperator {
    And,
    Or,
}

/// Conditions combined with one boolean operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhereGroup {
    pub operator: GroupOperator,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    pub field_name: String,
    #[serde(rename = "sorttype")]
    pub sort_type: SortDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PagingInfo {
    pub limit: usize,
    pub offset: usize,
}

/// Parameters of a list query. Top-level `where` conditions and every group
/// must all hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FetchParams {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(rename = "where", default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub where_groups: Vec<WhereGroup>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging_info: Option<PagingInfo>,
}
