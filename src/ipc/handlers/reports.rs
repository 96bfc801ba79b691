use crate::ipc::error::{err, ok};
use crate::ipc::handlers::sheets::sheet_list;
use crate::ipc::helpers::{optional_str, store_err, store_ref};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, DocumentOptions, Rekap, RekapFilter};
use serde_json::json;

const REPORT_TITLE: &str = "Laporan Hasil Belajar";

fn filter_from(req: &Request) -> RekapFilter {
    RekapFilter {
        kelas: optional_str(req, "kelas"),
        semester: optional_str(req, "semester"),
    }
}

fn rekap_for(state: &mut AppState, req: &Request) -> Result<Rekap, serde_json::Value> {
    let store = store_ref(&state.store, req)?;
    let refresh = req
        .params
        .get("refresh")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let sheets = sheet_list(&mut state.sheets, store, refresh).map_err(|e| store_err(req, &e))?;
    report::build_rekap(
        store,
        sheets,
        &filter_from(req),
        state.settings.report.score_column,
    )
    .map_err(|e| {
        log::warn!("rekap failed: {}", e);
        store_err(req, &e)
    })
}

fn handle_report_rekap(state: &mut AppState, req: &Request) -> serde_json::Value {
    match rekap_for(state, req) {
        Ok(rekap) => ok(&req.id, json!(rekap)),
        Err(resp) => resp,
    }
}

fn handle_report_student_documents(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mut rekap = match rekap_for(state, req) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    if let Some(name) = optional_str(req, "student") {
        rekap.students.retain(|s| s.name == name);
        if rekap.students.is_empty() {
            return err(
                &req.id,
                "not_found",
                format!("no student named {}", name),
                None,
            );
        }
    }

    let mut warnings: Vec<String> = Vec::new();
    let narratives = match state.store.as_deref() {
        Some(store) if state.settings.report.include_narrative => {
            match report::collect_narratives(store, &rekap) {
                Ok(index) => Some(index),
                Err(e) => {
                    log::warn!("narrative lookup failed, omitting narratives: {}", e);
                    warnings.push(format!("narratives omitted: {}", e));
                    None
                }
            }
        }
        _ => None,
    };

    let school = state.settings.report.school_name.trim();
    let opts = DocumentOptions {
        title: if school.is_empty() {
            REPORT_TITLE.to_string()
        } else {
            format!("{} - {}", REPORT_TITLE, school)
        },
        rows_per_page: state.settings.report.rows_per_page,
        generated_at: chrono::Utc::now().to_rfc3339(),
    };
    let documents: Vec<_> = rekap
        .students
        .iter()
        .map(|s| report::student_document(s, narratives.as_ref(), &opts))
        .collect();

    ok(
        &req.id,
        json!({
            "documents": documents,
            "warnings": warnings,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "report.rekap" => Some(handle_report_rekap(state, req)),
        "report.studentDocuments" => Some(handle_report_student_documents(state, req)),
        _ => None,
    }
}
