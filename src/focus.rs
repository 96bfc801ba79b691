//! Keyboard focus bookkeeping for the grid's editable cells, plus the
//! floating "advance" control that follows the focused cell.
//!
//! Callers pass the current `Instant` in, so every transition is a pure
//! function of its inputs.

use crate::columns::VisibleColumn;
use crate::grid::GridError;
use crate::model::ColumnId;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellPos {
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusTimings {
    pub advance_cooldown: Duration,
    pub blur_grace: Duration,
    pub scroll_throttle: Duration,
}

impl Default for FocusTimings {
    fn default() -> Self {
        Self {
            advance_cooldown: Duration::from_millis(300),
            blur_grace: Duration::from_millis(150),
            scroll_throttle: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMove {
    Moved { to: CellPos, select_all: bool },
    Stay,
    Throttled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverlayAnchor {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayUpdate {
    Throttled,
    Hidden,
    Shown(OverlayAnchor),
}

pub struct FocusNavigator {
    timings: FocusTimings,
    row_count: usize,
    /// Visible columns with their editable flag.
    editable: Vec<(ColumnId, bool)>,
    focused: Option<CellPos>,
    last_advance: Option<Instant>,
    blurred_at: Option<Instant>,
    last_scroll: Option<Instant>,
    overlay: Option<OverlayAnchor>,
    overlay_visible: bool,
}

impl FocusNavigator {
    pub fn new(timings: FocusTimings) -> Self {
        Self {
            timings,
            row_count: 0,
            editable: Vec::new(),
            focused: None,
            last_advance: None,
            blurred_at: None,
            last_scroll: None,
            overlay: None,
            overlay_visible: false,
        }
    }

    pub fn set_timings(&mut self, timings: FocusTimings) {
        self.timings = timings;
    }

    /// Called after every sheet load: new geometry, no focus.
    pub fn reset(&mut self, row_count: usize, columns: &[VisibleColumn]) {
        self.row_count = row_count;
        self.editable = columns.iter().map(|c| (c.id, !c.read_only)).collect();
        self.focused = None;
        self.last_advance = None;
        self.blurred_at = None;
        self.last_scroll = None;
        self.overlay = None;
        self.overlay_visible = false;
    }

    pub fn focused(&self) -> Option<CellPos> {
        self.focused
    }

    pub fn overlay(&self) -> Option<OverlayAnchor> {
        if self.overlay_visible {
            self.overlay
        } else {
            None
        }
    }

    pub fn focus(&mut self, pos: CellPos) -> Result<(), GridError> {
        if pos.row >= self.row_count {
            return Err(GridError::RowOutOfRange {
                row: pos.row,
                len: self.row_count,
            });
        }
        match self.editable.get(pos.col) {
            None => return Err(GridError::ColumnOutOfRange(pos.col)),
            Some((id, false)) => return Err(GridError::ReadOnlyColumn(*id)),
            Some((_, true)) => {}
        }
        self.focused = Some(pos);
        self.blurred_at = None;
        self.overlay_visible = true;
        Ok(())
    }

    fn step_down(&mut self) -> FocusMove {
        let Some(cur) = self.focused else {
            return FocusMove::Stay;
        };
        if cur.row + 1 >= self.row_count {
            return FocusMove::Stay;
        }
        let to = CellPos {
            row: cur.row + 1,
            col: cur.col,
        };
        self.focused = Some(to);
        FocusMove::Moved {
            to,
            select_all: true,
        }
    }

    /// Enter key: same column, next row. The last row does not wrap.
    pub fn confirm(&mut self) -> FocusMove {
        self.step_down()
    }

    /// Floating control: like Enter, ignoring repeats inside the cool-down.
    pub fn advance(&mut self, now: Instant) -> FocusMove {
        if self.focused.is_none() {
            return FocusMove::Stay;
        }
        if let Some(prev) = self.last_advance {
            if now.saturating_duration_since(prev) < self.timings.advance_cooldown {
                return FocusMove::Throttled;
            }
        }
        self.last_advance = Some(now);
        // Pressing the control blurs the cell; the advance re-focuses.
        self.blurred_at = None;
        self.step_down()
    }

    /// Focus left a cell. The overlay hides only once the grace period has
    /// passed without focus returning (see [`FocusNavigator::settle`]).
    pub fn blur(&mut self, now: Instant) {
        if self.focused.is_some() {
            self.blurred_at = Some(now);
        }
    }

    /// Focus moved onto the overlay control itself.
    pub fn overlay_focus(&mut self) {
        self.blurred_at = None;
    }

    /// Returns true when this call hid the overlay.
    pub fn settle(&mut self, now: Instant) -> bool {
        let Some(at) = self.blurred_at else {
            return false;
        };
        if now.saturating_duration_since(at) < self.timings.blur_grace {
            return false;
        }
        self.blurred_at = None;
        self.focused = None;
        self.overlay_visible = false;
        true
    }

    /// Re-anchors the overlay to the focused cell's on-screen rect.
    pub fn scroll(&mut self, now: Instant, viewport: Rect, cell: Rect) -> OverlayUpdate {
        if self.focused.is_none() {
            self.overlay_visible = false;
            return OverlayUpdate::Hidden;
        }
        if let Some(prev) = self.last_scroll {
            if now.saturating_duration_since(prev) < self.timings.scroll_throttle {
                return OverlayUpdate::Throttled;
            }
        }
        self.last_scroll = Some(now);

        if !viewport.contains(&cell) {
            self.overlay_visible = false;
            return OverlayUpdate::Hidden;
        }
        // Bottom-right corner of the focused cell.
        let anchor = OverlayAnchor {
            x: cell.right(),
            y: cell.bottom(),
        };
        self.overlay = Some(anchor);
        self.overlay_visible = true;
        OverlayUpdate::Shown(anchor)
    }
}
