//! Declarative field tables.
//!
//! Every entity describes its fields once: application name, remote column,
//! type, default and write rules. The read mapper and both write mappers are
//! driven from that table, so a default lives in exactly one place.

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::SecondsFormat;
use chrono::Utc;
use serde_json::Map;
use serde_json::Value;

use crate::error::GatewayError;
use crate::error::Result;
use crate::record::ID_COLUMN;
use crate::record::RemoteRecord;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Text,
    Integer,
    Number,
    Bool,
    /// `YYYY-MM-DD`; datetimes are truncated to their date part.
    Date,
    /// RFC 3339 timestamp.
    DateTime,
    /// Informal integer reference to another entity; blank means none.
    Reference,
    /// JSON object stored as text.
    JsonText,
    /// One of a fixed set of strings.
    Choice(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Null,
    Text(&'static str),
    Integer(i64),
    Number(f64),
    Bool(bool),
    /// JSON literal.
    Json(&'static str),
}

impl FieldDefault {
    pub fn to_value(self) -> Value {
        match self {
            FieldDefault::Null => Value::Null,
            FieldDefault::Text(s) => Value::from(s),
            FieldDefault::Integer(n) => Value::from(n),
            FieldDefault::Number(n) => Value::from(n),
            FieldDefault::Bool(b) => Value::Bool(b),
            FieldDefault::Json(s) => serde_json::from_str(s).unwrap_or(Value::Null),
        }
    }
}

/// Who may write a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Taken from input on create, patchable on update.
    Writable,
    /// Always the default on create, patchable afterwards.
    FixedOnCreate,
    /// Set to the current time on create, never patched.
    CreatedStamp,
    /// Set to the current time on every write.
    Touched,
    /// Never taken from input; written by mirrors or entity hooks.
    Derived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalize {
    None,
    Trim,
    TrimLowercase,
}

impl Normalize {
    fn apply(self, s: &str) -> String {
        match self {
            Normalize::None => s.to_string(),
            Normalize::Trim => s.trim().to_string(),
            Normalize::TrimLowercase => s.trim().to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
    /// Read when the stored value is absent, null or unusable.
    pub default: FieldDefault,
    /// Written on create when the input omits the field; `default` if unset.
    pub create_default: Option<FieldDefault>,
    pub access: Access,
    /// Column read when `column` is absent or null.
    pub fallback: Option<&'static str>,
    /// Second column that receives every write of this field.
    pub mirror: Option<&'static str>,
    pub normalize: Normalize,
    pub required: bool,
    pub unique: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column,
            kind,
            default: FieldDefault::Null,
            create_default: None,
            access: Access::Writable,
            fallback: None,
            mirror: None,
            normalize: Normalize::None,
            required: false,
            unique: false,
        }
    }

    pub const fn text(name: &'static str, column: &'static str) -> Self {
        Self::new(name, column, FieldKind::Text).default(FieldDefault::Text(""))
    }

    pub const fn default(mut self, default: FieldDefault) -> Self {
        self.default = default;
        self
    }

    pub const fn create_default(mut self, default: FieldDefault) -> Self {
        self.create_default = Some(default);
        self
    }

    pub const fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub const fn fallback(mut self, column: &'static str) -> Self {
        self.fallback = Some(column);
        self
    }

    pub const fn mirror(mut self, column: &'static str) -> Self {
        self.mirror = Some(column);
        self
    }

    pub const fn normalize(mut self, normalize: Normalize) -> Self {
        self.normalize = normalize;
        self
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Lenient decode of a stored value; anything unusable becomes the default.
    fn decode(&self, raw: Option<&Value>) -> Value {
        let decoded = match raw {
            Some(v) if !v.is_null() => self.decode_present(v),
            _ => None,
        };
        decoded.unwrap_or_else(|| self.default.to_value())
    }

    fn decode_present(&self, v: &Value) -> Option<Value> {
        match self.kind {
            FieldKind::Text => match v {
                Value::String(s) => Some(Value::from(s.as_str())),
                Value::Number(n) => Some(Value::from(n.to_string())),
                Value::Bool(b) => Some(Value::from(b.to_string())),
                _ => None,
            },
            FieldKind::Integer => as_i64(v).map(Value::from),
            FieldKind::Number => as_f64(v).map(Value::from),
            FieldKind::Bool => match v {
                Value::Bool(b) => Some(Value::Bool(*b)),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
                _ => None,
            },
            FieldKind::Date => v.as_str().and_then(date_part).map(|d| Value::from(d.to_string())),
            FieldKind::DateTime => v.as_str().and_then(parse_timestamp).map(|t| Value::from(stamp(t))),
            FieldKind::Reference => match v {
                Value::String(s) if s.trim().is_empty() => None,
                other => as_i64(other).map(Value::from),
            },
            FieldKind::JsonText => match v {
                Value::String(s) => serde_json::from_str::<Value>(s).ok().filter(Value::is_object),
                Value::Object(_) => Some(v.clone()),
                _ => None,
            },
            FieldKind::Choice(options) => v
                .as_str()
                .and_then(|s| options.iter().find(|o| o.eq_ignore_ascii_case(s.trim())))
                .map(|o| Value::from(*o)),
        }
    }

    /// Strict encode of an input value for storage.
    fn encode(&self, v: &Value) -> Result<Value> {
        if v.is_null() {
            if self.required {
                return Err(self.missing());
            }
            return Ok(Value::Null);
        }
        let encoded = match self.kind {
            FieldKind::Text => match v {
                Value::String(s) => Some(Value::from(self.normalize.apply(s))),
                Value::Number(n) => Some(Value::from(n.to_string())),
                Value::Bool(b) => Some(Value::from(b.to_string())),
                _ => None,
            },
            FieldKind::Integer | FieldKind::Reference => as_whole(v).map(Value::from),
            FieldKind::Number => v.is_number().then(|| v.clone()),
            FieldKind::Bool => v.as_bool().map(Value::Bool),
            FieldKind::Date => v.as_str().and_then(date_part).map(|d| Value::from(d.to_string())),
            FieldKind::DateTime => v.as_str().and_then(parse_timestamp).map(|t| Value::from(stamp(t))),
            FieldKind::JsonText if v.is_object() => Some(Value::from(serde_json::to_string(v)?)),
            FieldKind::JsonText => None,
            FieldKind::Choice(options) => v
                .as_str()
                .and_then(|s| options.iter().find(|o| o.eq_ignore_ascii_case(s.trim())))
                .map(|o| Value::from(*o)),
        };
        let encoded = encoded.ok_or_else(|| {
            GatewayError::Validation(format!("{} has an invalid value: {v}", self.name))
        })?;
        if self.required && encoded.as_str().is_some_and(|s| s.trim().is_empty()) {
            return Err(self.missing());
        }
        Ok(encoded)
    }

    fn stored_default(&self) -> Result<Value> {
        let default = self.create_default.unwrap_or(self.default);
        match (self.kind, default.to_value()) {
            (_, Value::Null) => Ok(Value::Null),
            (FieldKind::JsonText, v) => Ok(Value::from(serde_json::to_string(&v)?)),
            (_, v) => Ok(v),
        }
    }

    fn missing(&self) -> GatewayError {
        GatewayError::Validation(format!("{} is required", self.name))
    }

    fn put(&self, out: &mut RemoteRecord, value: Value) {
        if let Some(mirror) = self.mirror {
            out.insert(mirror.to_string(), value.clone());
        }
        out.insert(self.column.to_string(), value);
    }
}

/// Field table of one entity collection.
#[derive(Debug)]
pub struct EntitySchema {
    /// Human-facing entity name used in errors and logs.
    pub entity: &'static str,
    /// Remote table name.
    pub table: &'static str,
    pub fields: &'static [FieldSpec],
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&'static str> {
        self.field(name).map(|f| f.column)
    }

    /// Every column the read mapper looks at, fallbacks included.
    pub fn fetch_columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = Vec::new();
        for f in self.fields {
            for c in std::iter::once(f.column).chain(f.fallback) {
                if !cols.iter().any(|have| have == c) {
                    cols.push(c.to_string());
                }
            }
        }
        cols
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.unique)
    }

    pub fn unique_columns(&self) -> Vec<&'static str> {
        self.unique_fields().map(|f| f.column).collect()
    }

    /// Remote record to application shape, applying defaults and fallbacks.
    pub fn read(&self, record: &RemoteRecord) -> Result<Map<String, Value>> {
        let id = record.get(ID_COLUMN).and_then(as_i64).ok_or_else(|| {
            GatewayError::remote(format!("{} record without {ID_COLUMN}", self.entity))
        })?;
        let mut out = Map::new();
        out.insert(ID_COLUMN.to_string(), Value::from(id));
        for f in self.fields {
            let raw = record
                .get(f.column)
                .filter(|v| !v.is_null())
                .or_else(|| f.fallback.and_then(|c| record.get(c)));
            out.insert(f.name.to_string(), f.decode(raw));
        }
        Ok(out)
    }

    /// Full remote record for a create. Input keys outside the table are
    /// ignored; omitted fields take their defaults.
    pub fn write_create(&self, input: &Map<String, Value>, now: DateTime<Utc>) -> Result<RemoteRecord> {
        let mut out = RemoteRecord::new();
        for f in self.fields {
            let value = match f.access {
                Access::Writable => match input.get(f.name).filter(|v| !v.is_null()) {
                    Some(v) => f.encode(v)?,
                    None if f.required => return Err(f.missing()),
                    None => f.stored_default()?,
                },
                Access::FixedOnCreate => f.stored_default()?,
                Access::CreatedStamp | Access::Touched => Value::from(stamp(now)),
                Access::Derived => {
                    // A mirror may already have filled this column.
                    let value = f.stored_default()?;
                    out.entry(f.column.to_string()).or_insert(value);
                    continue;
                }
            };
            f.put(&mut out, value);
        }
        Ok(out)
    }

    /// Full remote record for restoring an exported record. Unlike
    /// `write_create`, every field present in `record` is kept, including
    /// fixed, derived and stamped ones; absent stamps are set to `now`.
    pub fn write_restore(&self, record: &Map<String, Value>, now: DateTime<Utc>) -> Result<RemoteRecord> {
        let mut out = RemoteRecord::new();
        for f in self.fields {
            let given = record.get(f.name).filter(|v| !v.is_null());
            let value = match (given, f.access) {
                (Some(v), _) => f.encode(v)?,
                (None, _) if f.required => return Err(f.missing()),
                (None, Access::CreatedStamp | Access::Touched) => Value::from(stamp(now)),
                (None, Access::Derived) => {
                    let value = f.stored_default()?;
                    out.entry(f.column.to_string()).or_insert(value);
                    continue;
                }
                (None, _) => f.stored_default()?,
            };
            f.put(&mut out, value);
        }
        Ok(out)
    }

    /// Partial remote record for an update: only keys present in `patch`,
    /// plus touched timestamps.
    pub fn write_update(&self, patch: &Map<String, Value>, now: DateTime<Utc>) -> Result<RemoteRecord> {
        let mut out = RemoteRecord::new();
        for f in self.fields {
            match f.access {
                Access::Writable | Access::FixedOnCreate => {
                    if let Some(v) = patch.get(f.name) {
                        let value = f.encode(v)?;
                        f.put(&mut out, value);
                    }
                }
                Access::Touched => f.put(&mut out, Value::from(stamp(now))),
                Access::CreatedStamp | Access::Derived => {}
            }
        }
        Ok(out)
    }
}

pub fn stamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Date part of a `YYYY-MM-DD` or RFC 3339 string.
pub fn date_part(s: &str) -> Option<NaiveDate> {
    let head = s.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if s.len() == 10 {
        return date_part(s)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
    }
    None
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Strict integer: fractional or out-of-range numbers are refused.
fn as_whole(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
