//! Client for the remote tabular store (a spreadsheet web app).
//!
//! Blocking reqwest client: the sidecar handles one request at a time, so
//! there is no runtime to share. The report aggregator fans out over
//! the rayon pool instead.

use crate::model::{cell_text, RowRecord, SheetDescriptor, TpRecord};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Text MIME type keeps the write a "simple" request for the web app.
const UPDATE_CONTENT_TYPE: &str = "text/plain;charset=utf-8";
const TP_SHEET: &str = "DataTP";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no store endpoint configured")]
    NotConfigured,
    #[error("network error: {0}")]
    Network(String),
    #[error("no data: {0}")]
    NoData(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("store rejected request: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotConfigured => "no_endpoint",
            StoreError::Network(_) => "network_error",
            StoreError::NoData(_) => "no_data",
            StoreError::Decode(_) => "decode_failed",
            StoreError::Rejected(_) => "store_rejected",
        }
    }
}

/// One row of a bulk write: store row position plus every cell in column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowUpdate {
    pub row_index: usize,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRow {
    /// Store row position, as sent.
    pub row_index: usize,
    pub message: String,
}

/// What the store reported back for a bulk write. Stores that do not
/// report per-row outcomes yield an empty `rejected` list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReceipt {
    pub rejected: Vec<RejectedRow>,
}

pub trait TabularStore: Send + Sync {
    fn list_sheets(&self) -> Result<Vec<SheetDescriptor>, StoreError>;
    /// All records of a sheet; index 0 is the display-header row.
    fn fetch_rows(&self, sheet: &str) -> Result<Vec<RowRecord>, StoreError>;
    /// `Ok(None)` when the store answers with its not-found marker.
    fn lookup_tp(&self, tp: &str, mapel: &str) -> Result<Option<TpRecord>, StoreError>;
    fn update_bulk(&self, sheet: &str, updates: &[RowUpdate]) -> Result<BulkReceipt, StoreError>;
}

/// The web app signals failures in-band: `{"error": ...}` or `{"status": "error"}`.
pub fn error_marker(v: &Value) -> Option<String> {
    let obj = v.as_object()?;
    if let Some(e) = obj.get("error") {
        if !e.is_null() && e != &Value::Bool(false) {
            return Some(cell_text(e));
        }
    }
    if obj.get("status").and_then(|s| s.as_str()) == Some("error") {
        let msg = obj
            .get("message")
            .map(cell_text)
            .unwrap_or_else(|| "error".to_string());
        return Some(msg);
    }
    None
}

fn parse_receipt(body: &str) -> Result<BulkReceipt, StoreError> {
    // Plain-text acknowledgements are success.
    let Ok(v) = serde_json::from_str::<Value>(body) else {
        return Ok(BulkReceipt::default());
    };
    if let Some(msg) = error_marker(&v) {
        return Err(StoreError::Rejected(msg));
    }
    let mut receipt = BulkReceipt::default();
    if let Some(results) = v.get("results").and_then(|r| r.as_array()) {
        for r in results {
            let Some(row_index) = r.get("rowIndex").and_then(|x| x.as_u64()) else {
                continue;
            };
            if r.get("ok").and_then(|x| x.as_bool()) == Some(false) {
                receipt.rejected.push(RejectedRow {
                    row_index: row_index as usize,
                    message: r
                        .get("message")
                        .map(cell_text)
                        .unwrap_or_else(|| "rejected".to_string()),
                });
            }
        }
    }
    Ok(receipt)
}

pub struct HttpStore {
    http: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpStore {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("gradesheetd/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    fn get_json(&self, query: &[(&str, &str)]) -> Result<Value, StoreError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(query)
            .send()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StoreError::Network(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json::<Value>()
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

impl TabularStore for HttpStore {
    fn list_sheets(&self) -> Result<Vec<SheetDescriptor>, StoreError> {
        let v = self.get_json(&[("action", "listSheets")])?;
        if let Some(msg) = error_marker(&v) {
            return Err(StoreError::Rejected(msg));
        }
        serde_json::from_value(v).map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn fetch_rows(&self, sheet: &str) -> Result<Vec<RowRecord>, StoreError> {
        let v = self.get_json(&[("sheet", sheet)])?;
        if let Some(msg) = error_marker(&v) {
            return Err(StoreError::Rejected(msg));
        }
        let Some(items) = v.as_array() else {
            return Err(StoreError::Decode("expected an array of rows".into()));
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                RowRecord::from_json(item)
                    .ok_or_else(|| StoreError::Decode(format!("row {} is not an object", i)))
            })
            .collect()
    }

    fn lookup_tp(&self, tp: &str, mapel: &str) -> Result<Option<TpRecord>, StoreError> {
        let v = self.get_json(&[("sheet", TP_SHEET), ("tp", tp), ("mapel", mapel)])?;
        if error_marker(&v).is_some() || v.is_null() {
            return Ok(None);
        }
        serde_json::from_value(v)
            .map(Some)
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn update_bulk(&self, sheet: &str, updates: &[RowUpdate]) -> Result<BulkReceipt, StoreError> {
        let body = json!({
            "action": "update_bulk",
            "sheetName": sheet,
            "updates": updates,
        });
        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, UPDATE_CONTENT_TYPE)
            .body(body.to_string())
            .send()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        let text = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(StoreError::Network(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }
        parse_receipt(&text)
    }
}
