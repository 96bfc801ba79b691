use crate::ipc::error::ok;
use crate::ipc::helpers::{store_err, store_ref};
use crate::ipc::types::{AppState, Request};
use crate::model::SheetDescriptor;
use crate::store::TabularStore;
use serde_json::json;

/// Cached sheet list, fetching it on first use or when `refresh` is set.
pub fn sheet_list<'a>(
    cache: &'a mut Option<Vec<SheetDescriptor>>,
    store: &dyn TabularStore,
    refresh: bool,
) -> Result<&'a [SheetDescriptor], crate::store::StoreError> {
    if refresh || cache.is_none() {
        let sheets = store.list_sheets()?;
        log::info!("sheet list fetched: {} sheet(s)", sheets.len());
        *cache = Some(sheets);
    }
    Ok(cache.as_deref().unwrap_or(&[]))
}

fn handle_sheets_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let refresh = req
        .params
        .get("refresh")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let store = match store_ref(&state.store, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match sheet_list(&mut state.sheets, store, refresh) {
        Ok(sheets) => {
            let status = if sheets.is_empty() { "noData" } else { "ready" };
            ok(&req.id, json!({ "sheets": sheets, "state": status }))
        }
        Err(e) => store_err(req, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sheets.list" => Some(handle_sheets_list(state, req)),
        _ => None,
    }
}
