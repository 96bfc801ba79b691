use crate::model::{ColumnId, RowRecord};
use serde::Serialize;

/// Why a column is or is not part of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    /// Narrative fields; only the report uses them.
    Excluded,
    /// Bookkeeping columns the sheet computes for itself.
    Hidden,
    /// Switched off for this sheet by a placeholder header.
    ConditionallyHidden,
    Shown,
}

/// Fixed-position column pinned during horizontal scroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrozenColumn {
    pub id: ColumnId,
    pub offset: u32,
    pub width: u32,
}

/// Static classification tables. Rules apply in field order.
#[derive(Debug, Clone, Copy)]
pub struct ColumnPolicy {
    pub excluded: &'static [ColumnId],
    pub hidden: &'static [ColumnId],
    pub conditional: &'static [ColumnId],
    pub read_only: &'static [ColumnId],
    pub frozen: &'static [FrozenColumn],
    pub default_width: u32,
}

pub const DEFAULT_POLICY: ColumnPolicy = ColumnPolicy {
    excluded: &[ColumnId::Data24, ColumnId::Data25],
    hidden: &[ColumnId::Data23],
    conditional: &[
        ColumnId::Data5,
        ColumnId::Data6,
        ColumnId::Data7,
        ColumnId::Data8,
        ColumnId::Data9,
        ColumnId::Data10,
        ColumnId::Data11,
        ColumnId::Data12,
        ColumnId::Data13,
        ColumnId::Data14,
        ColumnId::Data15,
        ColumnId::Data16,
        ColumnId::Data17,
        ColumnId::Data18,
        ColumnId::Data19,
    ],
    read_only: &[
        ColumnId::Data1,
        ColumnId::Data2,
        ColumnId::Data3,
        ColumnId::Data4,
    ],
    frozen: &[
        FrozenColumn {
            id: ColumnId::Data1,
            offset: 0,
            width: 50,
        },
        FrozenColumn {
            id: ColumnId::Data2,
            offset: 50,
            width: 100,
        },
        FrozenColumn {
            id: ColumnId::Data3,
            offset: 150,
            width: 220,
        },
        FrozenColumn {
            id: ColumnId::Data4,
            offset: 370,
            width: 60,
        },
    ],
    default_width: 80,
};

impl Default for ColumnPolicy {
    fn default() -> Self {
        DEFAULT_POLICY
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleColumn {
    pub id: ColumnId,
    pub label: String,
    pub read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen_offset: Option<u32>,
    pub width: u32,
}

impl ColumnPolicy {
    pub fn classify(&self, header: &RowRecord, col: ColumnId) -> Visibility {
        if self.excluded.contains(&col) {
            Visibility::Excluded
        } else if self.hidden.contains(&col) {
            Visibility::Hidden
        } else if self.conditional.contains(&col) && header.is_placeholder(col) {
            Visibility::ConditionallyHidden
        } else {
            Visibility::Shown
        }
    }

    /// Visible columns in store order. Must be recomputed from each sheet's
    /// own header row.
    pub fn visible_columns(&self, header: &RowRecord) -> Vec<VisibleColumn> {
        ColumnId::ALL
            .iter()
            .copied()
            .filter(|c| self.classify(header, *c) == Visibility::Shown)
            .map(|id| {
                let frozen = self.frozen.iter().find(|f| f.id == id);
                VisibleColumn {
                    id,
                    label: header.get(id).to_string(),
                    read_only: self.read_only.contains(&id),
                    frozen_offset: frozen.map(|f| f.offset),
                    width: frozen.map(|f| f.width).unwrap_or(self.default_width),
                }
            })
            .collect()
    }
}
