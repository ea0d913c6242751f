//! Bulk talkgroup roster import
//!
//! Streams a talkgroup roster CSV into the entity store in one pass.
//! Column order: decimal id, hex id, mode, alpha tag, description, tag,
//! category, priority, pipe-delimited stream list. Rows are tolerated
//! aggressively: short rows yield partial records, rows whose first column
//! is not numeric (headers included) are skipped, and a bad priority or
//! mode falls back to its default.

use crate::error::Result;
use crate::store::{EntityStore, ReconcileAction, TalkgroupUpdate};
use radiobridge_core::types::TalkgroupMode;
use std::io;
use tracing::{debug, info, warn};

/// Outcome of a roster import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Talkgroups created
    pub created: u64,
    /// Existing talkgroups enriched or refreshed
    pub updated: u64,
    /// Rows skipped
    pub skipped: u64,
}

/// Import a talkgroup roster into `system`.
///
/// # Errors
///
/// Returns an error only when the reader itself fails; individual bad rows
/// are counted in [`ImportSummary::skipped`] and never abort the import.
pub fn import_talkgroups<R: io::Read>(
    store: &EntityStore,
    system: &str,
    reader: R,
) -> Result<ImportSummary> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut summary = ImportSummary::default();

    for (index, record) in csv_reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!(record = index + 1, error = %err, "skipping unreadable roster row");
                summary.skipped += 1;
                continue;
            }
        };

        // Blank lines come through as empty records
        if record.iter().all(str::is_empty) {
            continue;
        }

        let Some(number) = record.get(0).and_then(|c| c.parse::<i32>().ok()) else {
            // Header rows land here too
            debug!(record = index + 1, "skipping roster row with non-numeric id");
            summary.skipped += 1;
            continue;
        };

        let column = |i: usize| record.get(i).unwrap_or("").to_string();

        let update = TalkgroupUpdate {
            system: system.to_string(),
            number,
            alpha_tag: column(3),
            description: column(4),
            mode: TalkgroupMode::parse(record.get(2).unwrap_or("")),
            tag: column(5),
            category: column(6),
            priority: record
                .get(7)
                .and_then(|c| c.parse::<i32>().ok())
                .unwrap_or(0),
            streams: record
                .get(8)
                .unwrap_or("")
                .split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        };

        match store.upsert_talkgroup(update).action {
            ReconcileAction::Created => summary.created += 1,
            ReconcileAction::Updated | ReconcileAction::Refreshed => summary.updated += 1,
        }
    }

    info!(
        system,
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "talkgroup roster imported"
    );
    Ok(summary)
}
