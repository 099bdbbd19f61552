//! Batch initialization
//!
//! [`initialize_all`] walks a [`RedirectionTable`] in order. Each enabled entry is
//! resolved and redirected on its own: a failure is logged and recorded, and the
//! batch moves on to the next entry.

use crate::engine::{Patch, Redirector};
use crate::error::RedirectError;
use crate::memory::CodeMemory;
use crate::resolve::Reflection;
use crate::table::RedirectionTable;
use tracing::{debug, info, warn};

/// Knobs for a batch run
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Emit the completion summary at info level
    pub dev_mode: bool,
}

/// What happened to one table entry
#[derive(Debug)]
pub enum EntryStatus {
    Applied(Patch),
    Failed(RedirectError),
    /// Disabled in the table; never attempted
    Skipped,
}

#[derive(Debug)]
pub struct EntryOutcome {
    /// Position in the table
    pub index: usize,
    pub source: String,
    pub destination: String,
    pub group: Option<String>,
    pub status: EntryStatus,
}

/// Result of a batch, one outcome per table entry in table order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<EntryOutcome>,
}

impl BatchReport {
    pub fn applied(&self) -> impl Iterator<Item = &Patch> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            EntryStatus::Applied(patch) => Some(patch),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&EntryOutcome, &RedirectError)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            EntryStatus::Failed(e) => Some((o, e)),
            _ => None,
        })
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, EntryStatus::Skipped))
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.failed().next().is_none()
    }

    /// `applied/failed/skipped` counts
    pub fn summary(&self) -> String {
        format!(
            "{} applied, {} failed, {} skipped",
            self.applied().count(),
            self.failed().count(),
            self.skipped()
        )
    }
}

/// Apply every enabled entry of `table`
pub fn initialize_all<R, M>(
    table: &RedirectionTable,
    reflection: &R,
    redirector: &Redirector<M>,
    options: &BatchOptions,
) -> BatchReport
where
    R: Reflection + ?Sized,
    M: CodeMemory,
{
    let mut report = BatchReport::default();

    for (index, entry) in table.entries.iter().enumerate() {
        let source = entry.source.qualified_name();
        let destination = entry.destination.qualified_name();

        let status = if !entry.enabled {
            debug!(%source, "skipping disabled redirection");
            EntryStatus::Skipped
        } else {
            let from = reflection.resolve(&entry.source);
            let to = reflection.resolve(&entry.destination);

            match redirector.try_redirect(&from, &to) {
                Ok(patch) => EntryStatus::Applied(patch),
                Err(e) => {
                    warn!(%source, %destination, error = %e, "redirection failed");
                    EntryStatus::Failed(e)
                }
            }
        };

        report.outcomes.push(EntryOutcome {
            index,
            source,
            destination,
            group: entry.group.clone(),
            status,
        });
    }

    if options.dev_mode {
        info!("Redirections initialized: {}", report.summary());
    }

    report
}
