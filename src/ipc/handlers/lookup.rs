use crate::grid::GridError;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{grid_err, optional_str, store_err, store_ref};
use crate::ipc::types::{AppState, Request};
use crate::model::ColumnId;
use serde_json::json;

/// `(tp, mapel)` from explicit params, or from a loaded column's header
/// label and the loaded sheet's subject.
fn lookup_key(state: &AppState, req: &Request) -> Result<(String, String), serde_json::Value> {
    let explicit_mapel = optional_str(req, "mapel");
    if let Some(tp) = optional_str(req, "tp") {
        let mapel = explicit_mapel
            .ok_or_else(|| err(&req.id, "bad_params", "missing mapel", None))?;
        return Ok((tp, mapel));
    }

    let Some(raw) = optional_str(req, "columnId") else {
        return Err(err(&req.id, "bad_params", "missing tp or columnId", None));
    };
    let col = ColumnId::parse(&raw)
        .ok_or_else(|| err(&req.id, "bad_params", format!("unknown column: {}", raw), None))?;
    let sheet = state
        .grid
        .sheet()
        .ok_or_else(|| grid_err(req, &GridError::NoSheet))?;
    let tp = sheet.header.get(col).trim().to_string();
    if tp.is_empty() || sheet.header.is_placeholder(col) {
        return Err(err(
            &req.id,
            "bad_params",
            format!("column {} has no TP code", col),
            None,
        ));
    }
    let mapel = explicit_mapel
        .or_else(|| sheet.descriptor.as_ref().map(|d| d.mapel.clone()))
        .filter(|m| !m.is_empty())
        .ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "subject of the loaded sheet is unknown; pass mapel",
                None,
            )
        })?;
    Ok((tp, mapel))
}

fn handle_lookup_tp(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (tp, mapel) = match lookup_key(state, req) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let store = match store_ref(&state.store, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.lookup_tp(&tp, &mapel) {
        Ok(record) => ok(
            &req.id,
            json!({
                "tp": tp,
                "mapel": mapel,
                "found": record.is_some(),
                "record": record,
            }),
        ),
        Err(e) => store_err(req, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "lookup.tp" => Some(handle_lookup_tp(state, req)),
        _ => None,
    }
}
