use crate::grid::GridError;
use crate::ipc::error::err;
use crate::ipc::types::Request;
use crate::store::{StoreError, TabularStore};
use rusqlite::Connection;
use serde_json::json;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn required_index(req: &Request, key: &str) -> Result<usize, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_i64()) {
        Some(v) if v >= 0 => Ok(v as usize),
        _ => Err(err(
            &req.id,
            "bad_params",
            format!("missing/invalid {}", key),
            None,
        )),
    }
}

pub fn store_ref<'a>(
    store: &'a Option<Box<dyn TabularStore>>,
    req: &Request,
) -> Result<&'a dyn TabularStore, serde_json::Value> {
    store
        .as_deref()
        .ok_or_else(|| store_err(req, &StoreError::NotConfigured))
}

pub fn db_conn<'a>(
    db: &'a Option<Connection>,
    req: &Request,
) -> Result<&'a Connection, serde_json::Value> {
    db.as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn store_err(req: &Request, e: &StoreError) -> serde_json::Value {
    err(&req.id, e.code(), e.to_string(), None)
}

pub fn grid_err(req: &Request, e: &GridError) -> serde_json::Value {
    let details = match e {
        GridError::RowOutOfRange { row, len } => Some(json!({ "row": row, "rowCount": len })),
        GridError::ColumnOutOfRange(col) => Some(json!({ "col": col })),
        GridError::ReadOnlyColumn(id) => Some(json!({ "columnId": id })),
        GridError::SaveFailed { batch_id, rows, .. } => {
            Some(json!({ "batchId": batch_id.to_string(), "rows": rows }))
        }
        _ => None,
    };
    err(&req.id, e.code(), e.to_string(), details)
}
