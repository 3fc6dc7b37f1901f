//! Entity-level queries, written against application field names and
//! translated to remote columns through the entity schema.

use chrono::Datelike;
use chrono::NaiveDate;
use serde_json::Value;

use crate::error::GatewayError;
use crate::error::Result;
use crate::record::Condition;
use crate::record::DatePart;
use crate::record::FetchParams;
use crate::record::GroupOperator;
use crate::record::ID_COLUMN;
use crate::record::Operator;
use crate::record::OrderBy;
use crate::record::PagingInfo;
use crate::record::SortDirection;
use crate::record::WhereGroup;
use crate::schema::EntitySchema;

/// Day ranges understood by `Operator::RelativeMatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeDate {
    Today,
    Yesterday,
    ThisWeek,
    ThisMonth,
}

impl RelativeDate {
    pub fn as_str(self) -> &'static str {
        match self {
            RelativeDate::Today => "Today",
            RelativeDate::Yesterday => "Yesterday",
            RelativeDate::ThisWeek => "this week",
            RelativeDate::ThisMonth => "this month",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "today" => Some(RelativeDate::Today),
            "yesterday" => Some(RelativeDate::Yesterday),
            "this week" => Some(RelativeDate::ThisWeek),
            "this month" => Some(RelativeDate::ThisMonth),
            _ => None,
        }
    }

    /// Whether `date` falls in this range as seen from `today`. Weeks start
    /// on Monday.
    pub fn contains(self, date: NaiveDate, today: NaiveDate) -> bool {
        match self {
            RelativeDate::Today => date == today,
            RelativeDate::Yesterday => today.pred_opt() == Some(date),
            RelativeDate::ThisWeek => date.iso_week() == today.iso_week(),
            RelativeDate::ThisMonth => date.year() == today.year() && date.month() == today.month(),
        }
    }
}

/// One predicate on an application field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub sub_operator: Option<DatePart>,
    pub values: Vec<Value>,
}

impl Filter {
    fn new(field: &str, operator: Operator, value: Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            sub_operator: None,
            values: vec![value],
        }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::EqualTo, value.into())
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::NotEqualTo, value.into())
    }

    pub fn contains(field: &str, needle: &str) -> Self {
        Self::new(field, Operator::Contains, Value::from(needle))
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::LessThan, value.into())
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::LessThanOrEqualTo, value.into())
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::GreaterThan, value.into())
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::GreaterThanOrEqualTo, value.into())
    }

    pub fn relative(field: &str, range: RelativeDate) -> Self {
        Self::new(field, Operator::RelativeMatch, Value::from(range.as_str()))
    }

    pub fn in_year(field: &str, year: i32) -> Self {
        Self {
            sub_operator: Some(DatePart::Year),
            ..Self::new(field, Operator::ExactMatch, Value::from(year.to_string()))
        }
    }

    pub fn on_day(field: &str, day: NaiveDate) -> Self {
        Self {
            sub_operator: Some(DatePart::Day),
            ..Self::new(field, Operator::ExactMatch, Value::from(day.to_string()))
        }
    }

    fn to_condition(&self, schema: &EntitySchema) -> Result<Condition> {
        Ok(Condition {
            field_name: column_for(schema, &self.field)?.to_string(),
            operator: self.operator,
            sub_operator: self.sub_operator,
            values: self.values.clone(),
        })
    }
}

/// A list query: every filter must hold, and at least one filter of each
/// `any_of` group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub any_of: Vec<Vec<Filter>>,
    pub order_by: Vec<(String, SortDirection)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn any_of(mut self, filters: Vec<Filter>) -> Self {
        self.any_of.push(filters);
        self
    }

    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by.push((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Translate to store parameters. Unknown field names are rejected rather
    /// than silently dropped, since a dropped predicate widens the result.
    pub fn to_params(&self, schema: &EntitySchema, fields: Vec<String>) -> Result<FetchParams> {
        let conditions = self
            .filters
            .iter()
            .map(|f| f.to_condition(schema))
            .collect::<Result<Vec<_>>>()?;
        let mut where_groups = Vec::with_capacity(self.any_of.len());
        for group in &self.any_of {
            where_groups.push(WhereGroup {
                operator: GroupOperator::Or,
                conditions: group
                    .iter()
                    .map(|f| f.to_condition(schema))
                    .collect::<Result<Vec<_>>>()?,
            });
        }
        let order_by = self
            .order_by
            .iter()
            .map(|(field, direction)| {
                Ok(OrderBy {
                    field_name: column_for(schema, field)?.to_string(),
                    sort_type: *direction,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(FetchParams {
            fields,
            conditions,
            where_groups,
            order_by,
            paging_info: self.limit.map(|limit| PagingInfo {
                limit,
                offset: self.offset,
            }),
        })
    }
}

fn column_for<'a>(schema: &'a EntitySchema, field: &'a str) -> Result<&'a str> {
    if field == ID_COLUMN {
        return Ok(ID_COLUMN);
    }
    schema.column(field).ok_or_else(|| {
        GatewayError::Validation(format!("{} has no field named {field}", schema.entity))
    })
}
