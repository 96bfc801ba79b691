use crate::config::Settings;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "endpointConfigured": state.store.is_some(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let conn = match db::open_db(&path) {
        Ok(conn) => conn,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };
    let settings = match setup::load_settings(&conn, &Settings::from_env()) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let endpoint_changed = match state.check_endpoint_switch(settings.store.endpoint.as_deref()) {
        Ok(changed) => changed,
        Err(msg) => return err(&req.id, "unsaved_changes", msg, None),
    };

    log::info!("workspace opened at {}", path.display());
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    let store_changed = settings.store != state.settings.store;
    state.focus.set_timings(settings.grid.timings());
    state.settings = settings;
    if endpoint_changed {
        state.forget_loaded_sheet();
    }
    if store_changed {
        if let Err(e) = state.rebuild_store() {
            return err(&req.id, e.code(), e.to_string(), None);
        }
    }

    ok(
        &req.id,
        json!({
            "workspacePath": path.to_string_lossy(),
            "endpointConfigured": state.store.is_some(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
