use crate::db;
use crate::grid::{GridError, GridStatus, SaveOutcome};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, grid_err, required_index, required_str, store_ref};
use crate::ipc::types::{AppState, Request};
use crate::model::{cell_text, ColumnId};
use serde_json::json;
use uuid::Uuid;

/// The one public view of the grid: everything a renderer needs.
pub fn grid_state(state: &AppState) -> serde_json::Value {
    let grid = &state.grid;
    let error = match grid.status() {
        GridStatus::Error(msg) => Some(msg.clone()),
        _ => None,
    };
    let changed = grid.changed_rows();
    let mut out = json!({
        "status": grid.status().as_str(),
        "error": error,
        "sheet": null,
        "descriptor": null,
        "rowOffset": null,
        "columns": [],
        "rows": [],
        "changedRows": changed,
        "saving": grid.is_saving(),
        "focus": state.focus.focused(),
        "overlay": state.focus.overlay(),
    });
    if let Some(sheet) = grid.sheet() {
        let rows: Vec<serde_json::Value> = sheet
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                json!({
                    "index": i,
                    "cells": sheet.columns.iter().map(|c| r.get(c.id)).collect::<Vec<_>>(),
                    "changed": changed.binary_search(&i).is_ok(),
                })
            })
            .collect();
        out["sheet"] = json!(sheet.name);
        out["descriptor"] = json!(sheet.descriptor);
        out["rowOffset"] = json!(sheet.row_offset);
        out["columns"] = json!(sheet.columns);
        out["rows"] = json!(rows);
    }
    out
}

fn handle_grid_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let sheet = match required_str(req, "sheet") {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let store = match store_ref(&state.store, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let descriptor = state
        .sheets
        .as_ref()
        .and_then(|list| list.iter().find(|d| d.sheet_name == sheet).cloned());
    let row_offset = state.settings.store.row_offset_for(&sheet);

    match state.grid.load(store, &sheet, descriptor, row_offset) {
        Ok(summary) => {
            if let Some(loaded) = state.grid.sheet() {
                state.focus.reset(loaded.rows.len(), &loaded.columns);
            }
            if summary.discarded > 0 {
                log::warn!(
                    "switching to {} discarded {} unsaved row(s)",
                    sheet,
                    summary.discarded
                );
            }
            log::info!("loaded {} ({} rows, offset {})", sheet, summary.row_count, row_offset);
            let mut result = grid_state(state);
            result["discardedRows"] = json!(summary.discarded);
            ok(&req.id, result)
        }
        Err(e) => {
            log::warn!("load of {} failed: {}", sheet, e);
            grid_err(req, &e)
        }
    }
}

fn handle_grid_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, grid_state(state))
}

/// Accepts `columnId` ("Data5") or `col` (index into the visible columns).
fn resolve_column(state: &AppState, req: &Request) -> Result<ColumnId, serde_json::Value> {
    let Some(sheet) = state.grid.sheet() else {
        return Err(grid_err(req, &GridError::NoSheet));
    };
    let id = if let Some(raw) = req.params.get("columnId").and_then(|v| v.as_str()) {
        ColumnId::parse(raw).ok_or_else(|| {
            err(&req.id, "bad_params", format!("unknown column: {}", raw), None)
        })?
    } else {
        let col = required_index(req, "col")?;
        sheet
            .columns
            .get(col)
            .map(|c| c.id)
            .ok_or_else(|| grid_err(req, &GridError::ColumnOutOfRange(col)))?
    };
    match sheet.columns.iter().find(|c| c.id == id) {
        None => Err(err(
            &req.id,
            "bad_params",
            format!("column {} is not shown for this sheet", id),
            None,
        )),
        Some(c) if c.read_only => Err(grid_err(req, &GridError::ReadOnlyColumn(id))),
        Some(_) => Ok(id),
    }
}

fn handle_grid_edit_cell(state: &mut AppState, req: &Request) -> serde_json::Value {
    let row = match required_index(req, "row") {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let col = match resolve_column(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(raw) = req.params.get("value") else {
        return err(&req.id, "bad_params", "missing value", None);
    };
    let value = cell_text(raw);

    match state.grid.edit_cell(row, col, value) {
        Ok(changed) => ok(
            &req.id,
            json!({
                "row": row,
                "columnId": col,
                "value": state.grid.cell(row, col).unwrap_or_default(),
                "changed": changed,
                "changedRows": state.grid.changed_rows(),
            }),
        ),
        Err(e) => grid_err(req, &e),
    }
}

fn handle_grid_revert_row(state: &mut AppState, req: &Request) -> serde_json::Value {
    let row = match required_index(req, "row") {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match state.grid.revert_row(row) {
        Ok(()) => ok(
            &req.id,
            json!({ "row": row, "changedRows": state.grid.changed_rows() }),
        ),
        Err(e) => grid_err(req, &e),
    }
}

fn record_attempt(
    state: &AppState,
    batch_id: Uuid,
    row_count: usize,
    outcome: &str,
    message: Option<String>,
) {
    let Some(conn) = state.db.as_ref() else {
        return;
    };
    let Some(sheet) = state.grid.sheet() else {
        return;
    };
    let entry = db::JournalEntry {
        batch_id: batch_id.to_string(),
        sheet: sheet.name.clone(),
        row_count: row_count as i64,
        row_offset: sheet.row_offset as i64,
        outcome: outcome.to_string(),
        message,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    if let Err(e) = db::journal_append(conn, &entry) {
        log::warn!("could not journal save {}: {}", batch_id, e);
    }
}

fn handle_grid_save_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(&state.store, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match state.grid.save_all(store) {
        Ok(SaveOutcome::NothingToSave) => ok(
            &req.id,
            json!({ "outcome": "noChanges", "updated": 0, "changedRows": [] }),
        ),
        Ok(SaveOutcome::Saved(report)) => {
            let outcome = if report.rejected.is_empty() {
                "saved"
            } else {
                "partial"
            };
            let row_count = report.saved.len() + report.rejected.len() + report.still_changed.len();
            let message = (!report.rejected.is_empty())
                .then(|| format!("{} row(s) rejected by the store", report.rejected.len()));
            log::info!(
                "save {} {}: {} saved, {} rejected",
                report.batch_id,
                outcome,
                report.saved.len(),
                report.rejected.len()
            );
            record_attempt(state, report.batch_id, row_count, outcome, message);
            ok(
                &req.id,
                json!({
                    "outcome": outcome,
                    "batchId": report.batch_id.to_string(),
                    "rowOffset": report.row_offset,
                    "updated": report.saved.len(),
                    "savedRows": report.saved,
                    "rejected": report.rejected,
                    "stillChanged": report.still_changed,
                    "changedRows": state.grid.changed_rows(),
                }),
            )
        }
        Err(e) => {
            if let GridError::SaveFailed { batch_id, rows, .. } = &e {
                log::warn!("save {} failed: {}", batch_id, e);
                record_attempt(state, *batch_id, *rows, "failed", Some(e.to_string()));
            }
            grid_err(req, &e)
        }
    }
}

fn handle_journal_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let limit = req
        .params
        .get("limit")
        .and_then(|v| v.as_i64())
        .unwrap_or(50)
        .clamp(1, 500);
    match db::journal_list(conn, limit) {
        Ok(entries) => ok(&req.id, json!({ "entries": entries })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grid.load" => Some(handle_grid_load(state, req)),
        "grid.state" => Some(handle_grid_state(state, req)),
        "grid.editCell" => Some(handle_grid_edit_cell(state, req)),
        "grid.revertRow" => Some(handle_grid_revert_row(state, req)),
        "grid.saveAll" => Some(handle_grid_save_all(state, req)),
        "journal.list" => Some(handle_journal_list(state, req)),
        _ => None,
    }
}
