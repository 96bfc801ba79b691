use crate::config::{Settings, ALLOWED_ROW_OFFSETS};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::ColumnId;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, PartialEq, Eq)]
enum SetupSection {
    Store,
    Grid,
    Report,
}

const SECTIONS: [SetupSection; 3] = [SetupSection::Store, SetupSection::Grid, SetupSection::Report];

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "store" => Some(Self::Store),
            "grid" => Some(Self::Grid),
            "report" => Some(Self::Report),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Grid => "grid",
            Self::Report => "report",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Store => "setup.store",
            Self::Grid => "setup.grid",
            Self::Report => "setup.report",
        }
    }
}

fn section_value(settings: &Settings, section: SetupSection) -> Value {
    let v = match section {
        SetupSection::Store => serde_json::to_value(&settings.store),
        SetupSection::Grid => serde_json::to_value(&settings.grid),
        SetupSection::Report => serde_json::to_value(&settings.report),
    };
    v.unwrap_or_else(|_| json!({}))
}

fn apply_section(settings: &mut Settings, section: SetupSection, value: Value) -> Result<(), String> {
    match section {
        SetupSection::Store => {
            settings.store = serde_json::from_value(value).map_err(|e| e.to_string())?
        }
        SetupSection::Grid => {
            settings.grid = serde_json::from_value(value).map_err(|e| e.to_string())?
        }
        SetupSection::Report => {
            settings.report = serde_json::from_value(value).map_err(|e| e.to_string())?
        }
    }
    Ok(())
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_row_offset(v: &Value, key: &str) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !ALLOWED_ROW_OFFSETS.iter().any(|&o| o as i64 == n) {
        return Err(format!("{} must be one of: 2, 3", key));
    }
    Ok(n)
}

fn parse_endpoint(v: &Value, key: &str) -> Result<Value, String> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let s = parse_string_max(v, key, 2048)?;
    if s.is_empty() {
        return Ok(Value::Null);
    }
    if !s.starts_with("http://") && !s.starts_with("https://") {
        return Err(format!("{} must be an http(s) URL", key));
    }
    Ok(Value::String(s))
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Store => match k.as_str() {
                "endpoint" => {
                    obj.insert(k.clone(), parse_endpoint(v, k)?);
                }
                "timeoutSecs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 300)?));
                }
                "headerRowOffset" => {
                    obj.insert(k.clone(), Value::from(parse_row_offset(v, k)?));
                }
                "sheetOffsets" => {
                    let entries = v
                        .as_object()
                        .ok_or_else(|| format!("{} must be an object", k))?;
                    let offsets = obj
                        .entry(k.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                    let offsets = as_object_mut(offsets)?;
                    for (sheet, offset) in entries {
                        let sheet_name = sheet.trim();
                        if sheet_name.is_empty() {
                            return Err("sheetOffsets keys must not be empty".into());
                        }
                        if offset.is_null() {
                            offsets.remove(sheet_name);
                            continue;
                        }
                        let n = parse_row_offset(offset, &format!("sheetOffsets.{}", sheet_name))?;
                        offsets.insert(sheet_name.to_string(), Value::from(n));
                    }
                }
                _ => return Err(format!("unknown store field: {}", k)),
            },
            SetupSection::Grid => match k.as_str() {
                "advanceCooldownMs" | "blurGraceMs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 5000)?));
                }
                "scrollThrottleMs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 1000)?));
                }
                _ => return Err(format!("unknown grid field: {}", k)),
            },
            SetupSection::Report => match k.as_str() {
                "rowsPerPage" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 5, 200)?));
                }
                "schoolName" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 200)?));
                }
                "scoreColumn" => {
                    let s = parse_string_max(v, k, 8)?;
                    let col = ColumnId::parse(&s)
                        .ok_or_else(|| format!("{} must be one of: Data1..Data25", k))?;
                    obj.insert(k.clone(), Value::String(col.as_str().to_string()));
                }
                "includeNarrative" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown report field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(
    conn: &rusqlite::Connection,
    section: SetupSection,
    base: &Settings,
) -> anyhow::Result<Value> {
    let mut current = section_value(base, section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values should not block startup.
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                log::warn!("ignoring part of saved {} settings: {}", section.name(), msg);
            }
        }
    }
    Ok(current)
}

/// Saved workspace settings layered over `base`.
pub fn load_settings(conn: &rusqlite::Connection, base: &Settings) -> anyhow::Result<Settings> {
    let mut settings = base.clone();
    for section in SECTIONS {
        let value = load_section(conn, section, base)?;
        if let Err(msg) = apply_section(&mut settings, section, value) {
            log::warn!("saved {} settings unusable: {}", section.name(), msg);
        }
    }
    Ok(settings)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "store": section_value(&state.settings, SetupSection::Store),
            "grid": section_value(&state.settings, SetupSection::Grid),
            "report": section_value(&state.settings, SetupSection::Report),
            "persistent": state.db.is_some(),
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = section_value(&state.settings, section);
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    let mut next = state.settings.clone();
    if let Err(msg) = apply_section(&mut next, section, current.clone()) {
        return err(&req.id, "bad_params", msg, None);
    }
    let endpoint_changed = match state.check_endpoint_switch(next.store.endpoint.as_deref()) {
        Ok(changed) => changed,
        Err(msg) => return err(&req.id, "unsaved_changes", msg, None),
    };
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    let store_changed = next.store != state.settings.store;
    state.settings = next;
    if endpoint_changed {
        state.forget_loaded_sheet();
    }
    match section {
        SetupSection::Store if store_changed => {
            if let Err(e) = state.rebuild_store() {
                return err(&req.id, e.code(), e.to_string(), None);
            }
        }
        SetupSection::Grid => state.focus.set_timings(state.settings.grid.timings()),
        _ => {}
    }
    let mut result = json!({ "ok": true, "persisted": state.db.is_some() });
    result[section.name()] = current;
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn store_patch_validates_offsets() {
        let mut current = section_value(&Settings::default(), SetupSection::Store);
        merge_section_patch(
            SetupSection::Store,
            &mut current,
            &patch(json!({ "headerRowOffset": 3, "sheetOffsets": { "MAPEL101": 2 } })),
        )
        .unwrap();
        assert_eq!(current["headerRowOffset"], json!(3));
        assert_eq!(current["sheetOffsets"]["MAPEL101"], json!(2));

        let err = merge_section_patch(
            SetupSection::Store,
            &mut current,
            &patch(json!({ "headerRowOffset": 1 })),
        )
        .unwrap_err();
        assert!(err.contains("headerRowOffset"));

        merge_section_patch(
            SetupSection::Store,
            &mut current,
            &patch(json!({ "sheetOffsets": { "MAPEL101": null } })),
        )
        .unwrap();
        assert_eq!(current["sheetOffsets"], json!({}));
    }

    #[test]
    fn endpoint_must_be_http() {
        let mut current = section_value(&Settings::default(), SetupSection::Store);
        assert!(merge_section_patch(
            SetupSection::Store,
            &mut current,
            &patch(json!({ "endpoint": "ftp://example.org" })),
        )
        .is_err());
        merge_section_patch(
            SetupSection::Store,
            &mut current,
            &patch(json!({ "endpoint": " https://script.example.org/exec " })),
        )
        .unwrap();
        assert_eq!(current["endpoint"], json!("https://script.example.org/exec"));
    }

    #[test]
    fn report_score_column_is_canonicalised() {
        let mut settings = Settings::default();
        let mut current = section_value(&settings, SetupSection::Report);
        merge_section_patch(
            SetupSection::Report,
            &mut current,
            &patch(json!({ "scoreColumn": "data21", "rowsPerPage": 10 })),
        )
        .unwrap();
        apply_section(&mut settings, SetupSection::Report, current).unwrap();
        assert_eq!(settings.report.score_column, ColumnId::Data21);
        assert_eq!(settings.report.rows_per_page, 10);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut current = section_value(&Settings::default(), SetupSection::Grid);
        let err = merge_section_patch(
            SetupSection::Grid,
            &mut current,
            &patch(json!({ "advanceCooldown": 10 })),
        )
        .unwrap_err();
        assert!(err.contains("unknown grid field"));
    }

    #[test]
    fn saved_sections_layer_over_base() {
        let dir = tempfile::tempdir().unwrap();
        let conn = db::open_db(dir.path()).unwrap();
        db::settings_set_json(&conn, "setup.grid", &json!({ "advanceCooldownMs": 500 })).unwrap();

        let mut base = Settings::default();
        base.store.endpoint = Some("http://localhost:1/exec".into());
        let loaded = load_settings(&conn, &base).unwrap();
        assert_eq!(loaded.grid.advance_cooldown_ms, 500);
        assert_eq!(loaded.grid.blur_grace_ms, 150);
        assert_eq!(loaded.store.endpoint.as_deref(), Some("http://localhost:1/exec"));
    }
}
