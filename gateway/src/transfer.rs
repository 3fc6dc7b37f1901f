//! Line-delimited JSON export and import of one entity collection.

use std::io::Read;
use std::io::Write;

use anyhow::Context;
use serde_json::Map;
use serde_json::Value;

use crate::entity::Entity;
use crate::gateway::EntityGateway;
use crate::query::Query;

/// Write every record as one JSON object per line. Returns the count.
///
/// Unlike `get_all`, a failed read is an error here: an empty export would
/// look like a valid backup of an empty collection.
pub async fn export_jsonl<E: Entity>(
    gateway: &EntityGateway<E>,
    out: &mut dyn Write,
) -> anyhow::Result<usize> {
    let records = gateway.try_list(Query::new()).await?;
    for record in &records {
        serde_json::to_writer(&mut *out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(records.len())
}

/// Restore one record per non-blank line. Lines use application field
/// names, as written by `export_jsonl`. The store assigns fresh ids; every
/// other field present on the line is kept, status flags and timestamps
/// included. Stops at the first line that fails and names it.
pub async fn import_jsonl<E: Entity>(
    gateway: &EntityGateway<E>,
    input: &mut dyn Read,
) -> anyhow::Result<usize> {
    let mut data = String::new();
    input.read_to_string(&mut data)?;
    let mut count = 0usize;
    for (n, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let lineno = n + 1;
        let record: Map<String, Value> =
            serde_json::from_str(line).with_context(|| format!("line {lineno}: invalid record"))?;
        gateway
            .restore(&record)
            .await
            .with_context(|| format!("line {lineno}: restore failed"))?;
        count += 1;
    }
    Ok(count)
}
