//! Query evaluation for stores that hold records locally.

use std::cmp::Ordering;

use chrono::Datelike;
use chrono::NaiveDate;
use serde_json::Value;

use crate::query::RelativeDate;
use crate::record::Condition;
use crate::record::DatePart;
use crate::record::FetchParams;
use crate::record::GroupOperator;
use crate::record::ID_COLUMN;
use crate::record::Operator;
use crate::record::OrderBy;
use crate::record::RecordId;
use crate::record::RemoteRecord;
use crate::record::SortDirection;
use crate::record::record_id;
use crate::schema::date_part;
use crate::schema::parse_timestamp;

static NULL: Value = Value::Null;

/// Filter, sort, page and project `records` as `params` ask.
pub fn apply<I>(records: I, params: &FetchParams, today: NaiveDate) -> Vec<RemoteRecord>
where
    I: IntoIterator<Item = RemoteRecord>,
{
    let mut hits: Vec<RemoteRecord> = records
        .into_iter()
        .filter(|r| matches(r, params, today))
        .collect();
    sort(&mut hits, &params.order_by);
    let hits = match params.paging_info {
        Some(p) => hits.into_iter().skip(p.offset).take(p.limit).collect(),
        None => hits,
    };
    hits.into_iter().map(|r| project(r, &params.fields)).collect()
}

pub fn matches(record: &RemoteRecord, params: &FetchParams, today: NaiveDate) -> bool {
    params.conditions.iter().all(|c| holds(record, c, today))
        && params.where_groups.iter().all(|g| match g.operator {
            GroupOperator::And => g.conditions.iter().all(|c| holds(record, c, today)),
            GroupOperator::Or => g.conditions.iter().any(|c| holds(record, c, today)),
        })
}

fn holds(record: &RemoteRecord, cond: &Condition, today: NaiveDate) -> bool {
    let stored = record.get(&cond.field_name).unwrap_or(&NULL);
    let mut values = cond.values.iter();
    match cond.operator {
        Operator::EqualTo => values.any(|v| loose_eq(stored, v)),
        Operator::NotEqualTo => !values.any(|v| loose_eq(stored, v)),
        Operator::Contains => {
            let Some(hay) = as_text(stored) else {
                return false;
            };
            let hay = hay.to_lowercase();
            values.any(|v| as_text(v).is_some_and(|n| hay.contains(&n.to_lowercase())))
        }
        Operator::LessThan => ordered(stored, cond, |o| o == Ordering::Less),
        Operator::LessThanOrEqualTo => ordered(stored, cond, |o| o != Ordering::Greater),
        Operator::GreaterThan => ordered(stored, cond, |o| o == Ordering::Greater),
        Operator::GreaterThanOrEqualTo => ordered(stored, cond, |o| o != Ordering::Less),
        Operator::RelativeMatch => {
            let Some(date) = stored.as_str().and_then(date_part) else {
                return false;
            };
            values
                .filter_map(|v| v.as_str().and_then(RelativeDate::parse))
                .any(|range| range.contains(date, today))
        }
        Operator::ExactMatch => values.any(|v| exact(stored, v, cond.sub_operator)),
    }
}

fn ordered(stored: &Value, cond: &Condition, accept: impl Fn(Ordering) -> bool) -> bool {
    if stored.is_null() {
        return false;
    }
    cond.values
        .first()
        .and_then(|v| compare_values(stored, v))
        .is_some_and(accept)
}

fn exact(stored: &Value, wanted: &Value, part: Option<DatePart>) -> bool {
    let Some(part) = part else {
        return match (as_text(stored), as_text(wanted)) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(&b),
            _ => false,
        };
    };
    let Some(date) = stored.as_str().and_then(date_part) else {
        return false;
    };
    let Some(wanted) = as_text(wanted) else {
        return false;
    };
    let wanted = wanted.trim();
    match part {
        DatePart::Year => wanted.parse::<i32>().is_ok_and(|y| y == date.year()),
        DatePart::Month => match wanted.parse::<u32>() {
            Ok(m) => m == date.month(),
            Err(_) => wanted == date.format("%Y-%m").to_string(),
        },
        DatePart::Day => date_part(wanted) == Some(date),
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => compare_values(a, b) == Some(Ordering::Equal),
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Ordering between two stored values. Strings that both read as dates or
/// timestamps compare chronologically; numeric strings compare with numbers.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
            _ => Some(x.cmp(y)),
        },
        (Value::Number(x), Value::String(y)) => x.as_f64()?.partial_cmp(&y.trim().parse::<f64>().ok()?),
        (Value::String(x), Value::Number(y)) => x.trim().parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        _ => None,
    }
}

pub fn sort(records: &mut [RemoteRecord], order_by: &[OrderBy]) {
    if order_by.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for key in order_by {
            let x = a.get(&key.field_name).unwrap_or(&NULL);
            let y = b.get(&key.field_name).unwrap_or(&NULL);
            let ord = compare_values(x, y).unwrap_or(Ordering::Equal);
            let ord = match key.sort_type {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Keep `Id` and the requested columns. An empty list keeps everything.
pub fn project(record: RemoteRecord, fields: &[String]) -> RemoteRecord {
    if fields.is_empty() {
        return record;
    }
    record
        .into_iter()
        .filter(|(k, _)| k == ID_COLUMN || fields.iter().any(|f| f == k))
        .collect()
}

/// First column of `unique` on which `candidate` collides with a stored
/// record other than `exclude`. Null and blank values never collide.
pub fn conflict<'a, 'r, I>(
    existing: I,
    candidate: &RemoteRecord,
    unique: &[&'a str],
    exclude: Option<RecordId>,
) -> Option<&'a str>
where
    I: IntoIterator<Item = &'r RemoteRecord> + Clone,
{
    unique.iter().copied().find(|column| {
        let Some(value) = candidate.get(*column).filter(|v| !is_blank(v)) else {
            return false;
        };
        existing
            .clone()
            .into_iter()
            .filter(|r| exclude.is_none() || record_id(r) != exclude)
            .any(|r| r.get(*column).is_some_and(|v| loose_eq(v, value)))
    })
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PagingInfo;
    use crate::record::WhereGroup;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rec(v: Value) -> RemoteRecord {
        v.as_object().cloned().unwrap_or_default()
    }

    fn cond(field: &str, operator: Operator, value: Value) -> Condition {
        Condition {
            field_name: field.into(),
            operator,
            sub_operator: None,
            values: vec![value],
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 21).unwrap()
    }

    fn rows() -> Vec<RemoteRecord> {
        vec![
            rec(json!({"Id": 1, "title_c": "Ship release", "due_c": "2026-10-20", "done_c": false})),
            rec(json!({"Id": 2, "title_c": "Buy milk", "due_c": "2026-10-22", "done_c": false})),
            rec(json!({"Id": 3, "title_c": "Ship boxes", "due_c": null, "done_c": true})),
        ]
    }

    fn ids(rs: &[RemoteRecord]) -> Vec<i64> {
        rs.iter().filter_map(record_id).collect()
    }

    #[test]
    fn contains_is_case_insensitive_and_null_never_compares() {
        let params = FetchParams {
            conditions: vec![
                cond("title_c", Operator::Contains, json!("SHIP")),
                cond("due_c", Operator::LessThan, json!("2026-10-21")),
            ],
            ..FetchParams::default()
        };
        assert_eq!(ids(&apply(rows(), &params, today())), vec![1]);
    }

    #[test]
    fn or_groups_sorting_and_paging() {
        let params = FetchParams {
            where_groups: vec![WhereGroup {
                operator: GroupOperator::Or,
                conditions: vec![
                    cond("done_c", Operator::EqualTo, json!(true)),
                    cond("title_c", Operator::Contains, json!("milk")),
                ],
            }],
            order_by: vec![OrderBy {
                field_name: "Id".into(),
                sort_type: SortDirection::Desc,
            }],
            paging_info: Some(PagingInfo {
                limit: 1,
                offset: 1,
            }),
            ..FetchParams::default()
        };
        assert_eq!(ids(&apply(rows(), &params, today())), vec![2]);
    }

    #[test]
    fn date_parts_and_relative_ranges() {
        let stamp = rec(json!({"Id": 9, "at": "2026-10-19T23:10:00.000Z"}));
        let mut c = cond("at", Operator::ExactMatch, json!("2026"));
        c.sub_operator = Some(DatePart::Year);
        assert!(holds(&stamp, &c, today()));
        c.sub_operator = Some(DatePart::Day);
        c.values = vec![json!("2026-10-19")];
        assert!(holds(&stamp, &c, today()));
        assert!(holds(&stamp, &cond("at", Operator::RelativeMatch, json!("this week")), today()));
        assert!(!holds(&stamp, &cond("at", Operator::RelativeMatch, json!("Today")), today()));
    }

    #[test]
    fn conflicts_ignore_self_and_blanks() {
        let existing = vec![rec(json!({"Id": 1, "email_c": "a@x.io"})), rec(json!({"Id": 2, "email_c": ""}))];
        let dup = rec(json!({"email_c": "a@x.io"}));
        assert_eq!(conflict(&existing, &dup, &["email_c"], None), Some("email_c"));
        assert_eq!(conflict(&existing, &dup, &["email_c"], Some(1)), None);
        let blank = rec(json!({"email_c": ""}));
        assert_eq!(conflict(&existing, &blank, &["email_c"], None), None);
    }

    #[test]
    fn projection_keeps_id() {
        let r = project(rows().remove(0), &["title_c".to_string()]);
        assert_eq!(Value::Object(r), json!({"Id": 1, "title_c": "Ship release"}));
    }
}
