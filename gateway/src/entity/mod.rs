//! CRM entity types.
//!
//! Each entity module carries the record struct, its create input, its
//! partial-update patch and the field table that maps them to remote columns.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;

use crate::record::RecordId;
use crate::record::RemoteRecord;
use crate::schema::EntitySchema;

pub mod category;
pub mod contact;
pub mod deal;
pub mod lead;
pub mod sales_rep;
pub mod task;
pub mod team_member;

pub use category::Category;
pub use contact::Contact;
pub use deal::Deal;
pub use lead::Lead;
pub use sales_rep::SalesRep;
pub use task::Task;
pub use team_member::TeamMember;

pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Fields accepted by `create`.
    type Input: Serialize + DeserializeOwned + Send + Sync;
    /// Fields accepted by `update`; absent keys are left untouched.
    type Patch: Serialize + DeserializeOwned + Send + Sync;

    fn schema() -> &'static EntitySchema;

    fn id(&self) -> RecordId;

    /// Columns implied by a patch beyond the patch itself.
    fn on_update(_patch: &Map<String, Value>, _record: &mut RemoteRecord, _now: DateTime<Utc>) {}
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent key (`None`).
pub(crate) fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}
