use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::columns::DEFAULT_POLICY;
use crate::config::Settings;
use crate::focus::FocusNavigator;
use crate::grid::GridController;
use crate::model::SheetDescriptor;
use crate::store::{HttpStore, StoreError, TabularStore};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub settings: Settings,
    pub store: Option<Box<dyn TabularStore>>,
    /// Sheet list, fetched once and kept until an explicit refresh.
    pub sheets: Option<Vec<SheetDescriptor>>,
    pub grid: GridController,
    pub focus: FocusNavigator,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let focus = FocusNavigator::new(settings.grid.timings());
        let mut state = Self {
            workspace: None,
            db: None,
            settings,
            store: None,
            sheets: None,
            grid: GridController::new(DEFAULT_POLICY),
            focus,
        };
        if let Err(e) = state.rebuild_store() {
            log::warn!("store client not available: {}", e);
        }
        state
    }

    /// Whether `next` moves to a different endpoint. Rows loaded from one
    /// endpoint must not be saved to another, so the move is refused while
    /// edits are pending.
    pub fn check_endpoint_switch(&self, next: Option<&str>) -> Result<bool, String> {
        if next == self.settings.store.endpoint.as_deref() {
            return Ok(false);
        }
        if self.grid.has_unsaved() {
            return Err(format!(
                "{} row(s) have unsaved edits; save or revert before changing the endpoint",
                self.grid.changed_rows().len()
            ));
        }
        Ok(true)
    }

    pub fn forget_loaded_sheet(&mut self) {
        self.grid.clear();
        self.focus.reset(0, &[]);
    }

    /// Recreates the HTTP client from the current store settings. Cached
    /// sheet descriptors belong to the old endpoint and are dropped.
    pub fn rebuild_store(&mut self) -> Result<(), StoreError> {
        self.sheets = None;
        self.store = None;
        let Some(endpoint) = self.settings.store.endpoint.clone() else {
            return Ok(());
        };
        let store = HttpStore::new(endpoint.clone(), self.settings.store.timeout())?;
        log::info!("store endpoint set to {}", endpoint);
        self.store = Some(Box::new(store));
        Ok(())
    }
}
