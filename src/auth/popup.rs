//! Popup window capability.
//!
//! Hosts implement [`PopupOpener`] over whatever owns real windows (a wasm
//! shim over `window.open`, a desktop webview); tests use fakes that flip the
//! closed flag on demand.

use thiserror::Error;

/// Fixed popup width in CSS pixels.
pub const POPUP_WIDTH: i32 = 500;
/// Fixed popup height in CSS pixels.
pub const POPUP_HEIGHT: i32 = 700;

/// Screen position and outer size of the window that owns the popup.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub outer_width: f64,
    pub outer_height: f64,
}

/// Where and how large the popup is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupGeometry {
    pub left: i64,
    pub top: i64,
    pub width: i32,
    pub height: i32,
}

impl PopupGeometry {
    /// Center a fixed-size popup over the owner window.
    pub fn centered_on(owner: ScreenRect) -> Self {
        let left = round_half_up(owner.x + (owner.outer_width - f64::from(POPUP_WIDTH)) / 2.0);
        let top = round_half_up(owner.y + (owner.outer_height - f64::from(POPUP_HEIGHT)) / 2.0);
        Self {
            left: left as i64,
            top: top as i64,
            width: POPUP_WIDTH,
            height: POPUP_HEIGHT,
        }
    }

    /// Window features string in `window.open` syntax.
    pub fn features(&self) -> String {
        format!(
            "width={},height={},left={},top={}",
            self.width, self.height, self.left, self.top
        )
    }
}

// Screen coordinates round half toward +inf, not away from zero.
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Error raised by a host when closing a popup fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("popup close failed: {0}")]
pub struct CloseError(pub String);

/// A single open popup window.
pub trait PopupWindow: Send + Sync {
    fn is_closed(&self) -> bool;
    fn close(&self) -> Result<(), CloseError>;
}

/// Opens popups relative to the owning window.
pub trait PopupOpener: Send + Sync {
    /// Screen position and outer size of the owning window.
    fn owner_rect(&self) -> ScreenRect;

    /// Open `url` in a named popup. `None` means the host blocked it.
    fn open(
        &self,
        url: &str,
        window_name: &str,
        geometry: PopupGeometry,
    ) -> Option<Box<dyn PopupWindow>>;
}
