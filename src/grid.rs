use crate::columns::{ColumnPolicy, VisibleColumn};
use crate::model::{ColumnId, RowRecord, SheetDescriptor, SheetRows};
use crate::store::{BulkReceipt, RejectedRow, RowUpdate, StoreError, TabularStore};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("no sheet loaded")]
    NoSheet,
    #[error("row {row} out of range (rows: {len})")]
    RowOutOfRange { row: usize, len: usize },
    #[error("column {0} out of range")]
    ColumnOutOfRange(usize),
    #[error("column {0} is read-only")]
    ReadOnlyColumn(ColumnId),
    #[error("a save is already in flight")]
    SaveInFlight,
    #[error("save batch {0} is not in flight")]
    NoSaveInFlight(Uuid),
    #[error("save of {rows} row(s) failed: {source}")]
    SaveFailed {
        batch_id: Uuid,
        rows: usize,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GridError {
    pub fn code(&self) -> &'static str {
        match self {
            GridError::NoSheet => "no_sheet",
            GridError::RowOutOfRange { .. } | GridError::ColumnOutOfRange(_) => "bad_params",
            GridError::ReadOnlyColumn(_) => "read_only_column",
            GridError::SaveInFlight => "save_in_flight",
            GridError::NoSaveInFlight(_) => "no_save_in_flight",
            GridError::SaveFailed { source, .. } => source.code(),
            GridError::Store(e) => e.code(),
        }
    }
}

/// What the view shows in place of the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridStatus {
    Idle,
    Ready,
    NoData,
    Error(String),
}

impl GridStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridStatus::Idle => "idle",
            GridStatus::Ready => "ready",
            GridStatus::NoData => "noData",
            GridStatus::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSheet {
    pub name: String,
    pub descriptor: Option<SheetDescriptor>,
    pub header: RowRecord,
    pub rows: Vec<RowRecord>,
    /// Last state known to be on the server, per row.
    baseline: Vec<RowRecord>,
    pub columns: Vec<VisibleColumn>,
    pub row_offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub row_count: usize,
    pub discarded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveBatch {
    pub id: Uuid,
    pub sheet: String,
    pub rows: Vec<usize>,
    pub updates: Vec<RowUpdate>,
    pub row_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStart {
    NothingToSave,
    Started(SaveBatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub batch_id: Uuid,
    pub row_offset: usize,
    /// Rows now equal to the server state.
    pub saved: Vec<usize>,
    /// Rows the store refused; they stay in the changed set.
    pub rejected: Vec<RejectedRow>,
    /// Rows edited again while the batch was in flight.
    pub still_changed: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    NothingToSave,
    Saved(SaveReport),
}

/// Owns the row collection and changed-row set for the selected sheet.
pub struct GridController {
    policy: ColumnPolicy,
    sheet: Option<LoadedSheet>,
    changed: BTreeSet<usize>,
    in_flight: Option<Uuid>,
    status: GridStatus,
}

impl GridController {
    pub fn new(policy: ColumnPolicy) -> Self {
        Self {
            policy,
            sheet: None,
            changed: BTreeSet::new(),
            in_flight: None,
            status: GridStatus::Idle,
        }
    }

    pub fn sheet(&self) -> Option<&LoadedSheet> {
        self.sheet.as_ref()
    }

    pub fn status(&self) -> &GridStatus {
        &self.status
    }

    pub fn changed_rows(&self) -> Vec<usize> {
        self.changed.iter().copied().collect()
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Edits not yet on the server, or a save still waiting for its answer.
    pub fn has_unsaved(&self) -> bool {
        !self.changed.is_empty() || self.in_flight.is_some()
    }

    /// Forgets the loaded sheet. Used when the rows no longer belong to
    /// the configured store.
    pub fn clear(&mut self) {
        self.sheet = None;
        self.changed.clear();
        self.in_flight = None;
        self.status = GridStatus::Idle;
    }

    /// Replaces the row collection with `sheet_id`'s rows. Unsaved edits of
    /// the previous selection are dropped; the count is returned.
    pub fn load(
        &mut self,
        store: &dyn TabularStore,
        sheet_id: &str,
        descriptor: Option<SheetDescriptor>,
        row_offset: usize,
    ) -> Result<LoadSummary, GridError> {
        if self.in_flight.is_some() {
            return Err(GridError::SaveInFlight);
        }

        // A failed load leaves the current rows and their edits in place.
        let records = match store.fetch_rows(sheet_id) {
            Ok(r) => r,
            Err(e) => {
                self.status = GridStatus::Error(e.to_string());
                return Err(e.into());
            }
        };
        let Some(rows) = SheetRows::from_records(records) else {
            self.status = GridStatus::NoData;
            return Err(StoreError::NoData(format!("sheet {} is empty", sheet_id)).into());
        };

        let discarded = self.changed.len();
        self.changed.clear();
        let row_count = rows.rows.len();
        self.install(sheet_id, descriptor, rows, row_offset);
        Ok(LoadSummary {
            row_count,
            discarded,
        })
    }

    fn install(
        &mut self,
        name: &str,
        descriptor: Option<SheetDescriptor>,
        rows: SheetRows,
        row_offset: usize,
    ) {
        let columns = self.policy.visible_columns(&rows.header);
        self.status = if rows.rows.is_empty() {
            GridStatus::NoData
        } else {
            GridStatus::Ready
        };
        self.sheet = Some(LoadedSheet {
            name: name.to_string(),
            descriptor,
            header: rows.header,
            baseline: rows.rows.clone(),
            rows: rows.rows,
            columns,
            row_offset,
        });
    }

    fn loaded_mut(&mut self) -> Result<&mut LoadedSheet, GridError> {
        self.sheet.as_mut().ok_or(GridError::NoSheet)
    }

    pub fn cell(&self, row: usize, col: ColumnId) -> Result<&str, GridError> {
        let sheet = self.sheet.as_ref().ok_or(GridError::NoSheet)?;
        let rec = sheet.rows.get(row).ok_or(GridError::RowOutOfRange {
            row,
            len: sheet.rows.len(),
        })?;
        Ok(rec.get(col))
    }

    /// Stores `value` verbatim. Returns whether the row now has unsaved edits.
    pub fn edit_cell(
        &mut self,
        row: usize,
        col: ColumnId,
        value: impl Into<String>,
    ) -> Result<bool, GridError> {
        let sheet = self.loaded_mut()?;
        let len = sheet.rows.len();
        let Some(rec) = sheet.rows.get_mut(row) else {
            return Err(GridError::RowOutOfRange { row, len });
        };
        rec.set(col, value);
        let dirty = sheet.rows[row] != sheet.baseline[row];
        if dirty {
            self.changed.insert(row);
        } else {
            self.changed.remove(&row);
        }
        Ok(dirty)
    }

    pub fn revert_row(&mut self, row: usize) -> Result<(), GridError> {
        let sheet = self.loaded_mut()?;
        let len = sheet.rows.len();
        let Some(original) = sheet.baseline.get(row).cloned() else {
            return Err(GridError::RowOutOfRange { row, len });
        };
        sheet.rows[row] = original;
        self.changed.remove(&row);
        Ok(())
    }

    /// Snapshots the changed rows into a batch and marks a save in flight.
    pub fn begin_save(&mut self) -> Result<SaveStart, GridError> {
        if self.in_flight.is_some() {
            return Err(GridError::SaveInFlight);
        }
        let sheet = self.sheet.as_ref().ok_or(GridError::NoSheet)?;
        if self.changed.is_empty() {
            return Ok(SaveStart::NothingToSave);
        }

        let rows: Vec<usize> = self.changed.iter().copied().collect();
        let updates = rows
            .iter()
            .map(|&r| RowUpdate {
                row_index: r + sheet.row_offset,
                values: sheet.rows[r].values(),
            })
            .collect();
        let batch = SaveBatch {
            id: Uuid::new_v4(),
            sheet: sheet.name.clone(),
            rows,
            updates,
            row_offset: sheet.row_offset,
        };
        self.in_flight = Some(batch.id);
        Ok(SaveStart::Started(batch))
    }

    /// Applies the store's answer for `batch`. On failure the changed set
    /// is left as it was so a retry resubmits the same rows.
    pub fn finish_save(
        &mut self,
        batch: &SaveBatch,
        result: Result<BulkReceipt, StoreError>,
    ) -> Result<SaveReport, GridError> {
        if self.in_flight != Some(batch.id) {
            return Err(GridError::NoSaveInFlight(batch.id));
        }
        self.in_flight = None;

        let receipt = result.map_err(|source| GridError::SaveFailed {
            batch_id: batch.id,
            rows: batch.rows.len(),
            source,
        })?;

        let sheet = self.sheet.as_mut().ok_or(GridError::NoSheet)?;
        let mut report = SaveReport {
            batch_id: batch.id,
            row_offset: batch.row_offset,
            saved: Vec::new(),
            rejected: Vec::new(),
            still_changed: Vec::new(),
        };

        for (&row, update) in batch.rows.iter().zip(&batch.updates) {
            if let Some(r) = receipt
                .rejected
                .iter()
                .find(|r| r.row_index == update.row_index)
            {
                report.rejected.push(r.clone());
                continue;
            }
            let Some(base) = sheet.baseline.get_mut(row) else {
                continue;
            };
            *base = RowRecord::from_values(update.values.iter().cloned());
            if sheet.rows[row] == *base {
                self.changed.remove(&row);
                report.saved.push(row);
            } else {
                self.changed.insert(row);
                report.still_changed.push(row);
            }
        }
        Ok(report)
    }

    /// One-shot save: batch, write, apply.
    pub fn save_all(&mut self, store: &dyn TabularStore) -> Result<SaveOutcome, GridError> {
        let batch = match self.begin_save()? {
            SaveStart::NothingToSave => return Ok(SaveOutcome::NothingToSave),
            SaveStart::Started(b) => b,
        };
        log::info!(
            "saving {} row(s) of {} (batch {})",
            batch.rows.len(),
            batch.sheet,
            batch.id
        );
        let result = store.update_bulk(&batch.sheet, &batch.updates);
        self.finish_save(&batch, result).map(SaveOutcome::Saved)
    }
}
