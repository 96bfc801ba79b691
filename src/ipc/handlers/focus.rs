use crate::focus::{CellPos, FocusMove, OverlayUpdate, Rect};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{grid_err, required_index};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::time::Instant;

fn move_json(m: FocusMove) -> serde_json::Value {
    match m {
        FocusMove::Moved { to, select_all } => json!({
            "moved": true,
            "throttled": false,
            "row": to.row,
            "col": to.col,
            "selectAll": select_all,
        }),
        FocusMove::Stay => json!({ "moved": false, "throttled": false }),
        FocusMove::Throttled => json!({ "moved": false, "throttled": true }),
    }
}

fn focus_json(state: &AppState) -> serde_json::Value {
    json!({
        "focus": state.focus.focused(),
        "overlay": state.focus.overlay(),
    })
}

fn handle_focus_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let row = match required_index(req, "row") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let col = match required_index(req, "col") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.focus.focus(CellPos { row, col }) {
        Ok(()) => ok(&req.id, focus_json(state)),
        Err(e) => grid_err(req, &e),
    }
}

fn handle_focus_scroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let rect = |key: &str| -> Result<Rect, serde_json::Value> {
        let raw = req
            .params
            .get(key)
            .cloned()
            .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))?;
        serde_json::from_value(raw).map_err(|e| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be {{x, y, width, height}}: {}", key, e),
                None,
            )
        })
    };
    let viewport = match rect("viewport") {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let cell = match rect("cell") {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let result = match state.focus.scroll(Instant::now(), viewport, cell) {
        OverlayUpdate::Throttled => json!({ "throttled": true, "visible": state.focus.overlay().is_some() }),
        OverlayUpdate::Hidden => json!({ "throttled": false, "visible": false }),
        OverlayUpdate::Shown(anchor) => json!({
            "throttled": false,
            "visible": true,
            "anchor": anchor,
        }),
    };
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "focus.get" => ok(&req.id, focus_json(state)),
        "focus.set" => handle_focus_set(state, req),
        "focus.enter" => ok(&req.id, move_json(state.focus.confirm())),
        "focus.advance" => ok(&req.id, move_json(state.focus.advance(Instant::now()))),
        "focus.blur" => {
            state.focus.blur(Instant::now());
            ok(&req.id, focus_json(state))
        }
        "focus.overlayFocus" => {
            state.focus.overlay_focus();
            ok(&req.id, focus_json(state))
        }
        "focus.settle" => {
            let hidden = state.focus.settle(Instant::now());
            let mut result = focus_json(state);
            result["hidden"] = json!(hidden);
            ok(&req.id, result)
        }
        "focus.scroll" => handle_focus_scroll(state, req),
        _ => return None,
    };
    Some(resp)
}
