//! Host interface: the callbacks the screen drives and the clock it reads.
//!
//! The core performs no I/O. Everything the host must react to — bells,
//! title changes, mode switches that affect input handling, image lifetime —
//! arrives through [`EventSink`]. All callbacks are synchronous and may be
//! invoked from inside a screen mutation; the sink must not call back into
//! the same screen.

use crate::image::ImageId;
use crate::input::{MouseProtocol, MouseTransport, MouseWheelMode};

/// Which buffer a screen is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScreenType {
    Primary,
    Alternate,
}

/// Cursor glyph shape (DECSCUSR).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CursorShape {
    #[default]
    Block,
    Underscore,
    Bar,
    Rectangle,
}

/// Whether the cursor blinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CursorDisplay {
    #[default]
    Steady,
    Blinking,
}

/// Pointer shape requests forwarded to the window system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MouseCursorShape {
    #[default]
    Arrow,
    PointingHand,
}

/// Outbound notifications from the screen to its host.
///
/// Every method has a no-op default so hosts (and tests) implement only what
/// they care about.
pub trait EventSink {
    /// Visible content changed; a redraw is due.
    fn screen_updated(&mut self) {}

    /// The active buffer switched between primary and alternate.
    fn buffer_changed(&mut self, screen_type: ScreenType) {
        let _ = screen_type;
    }

    fn bell(&mut self) {}

    /// Desktop notification requested (OSC 777).
    fn notify(&mut self, title: &str, body: &str) {
        let _ = (title, body);
    }

    fn set_window_title(&mut self, title: &str) {
        let _ = title;
    }

    /// XTWINOPS resize request, forwarded verbatim.
    fn resize_window(&mut self, width: u32, height: u32, in_pixels: bool) {
        let _ = (width, height, in_pixels);
    }

    /// OSC 52 clipboard write.
    fn copy_to_clipboard(&mut self, data: &str) {
        let _ = data;
    }

    fn set_mouse_cursor(&mut self, shape: MouseCursorShape) {
        let _ = shape;
    }

    fn set_bracketed_paste(&mut self, enable: bool) {
        let _ = enable;
    }

    fn set_cursor_visibility(&mut self, visible: bool) {
        let _ = visible;
    }

    fn set_cursor_style(&mut self, display: CursorDisplay, shape: CursorShape) {
        let _ = (display, shape);
    }

    fn use_application_cursor_keys(&mut self, enable: bool) {
        let _ = enable;
    }

    fn set_application_keypad_mode(&mut self, enable: bool) {
        let _ = enable;
    }

    fn set_mouse_protocol(&mut self, protocol: MouseProtocol, enable: bool) {
        let _ = (protocol, enable);
    }

    fn set_mouse_transport(&mut self, transport: MouseTransport) {
        let _ = transport;
    }

    fn set_mouse_wheel_mode(&mut self, mode: MouseWheelMode) {
        let _ = mode;
    }

    fn set_generate_focus_events(&mut self, enable: bool) {
        let _ = enable;
    }

    /// The last cell referencing this image was dropped; GPU-side copies can
    /// be freed.
    fn discard_image(&mut self, handle: ImageId) {
        let _ = handle;
    }

    fn scrollback_buffer_cleared(&mut self) {}

    /// RIS completed; all prior state is void.
    fn hard_reset(&mut self) {}

    /// Diagnostic state dump requested.
    fn dump_state(&mut self) {}
}

/// A sink that ignores everything. Useful for tests and headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {}

/// Time source for blink phase computation.
///
/// The core never sleeps or schedules; it only converts "now" into a blink
/// phase when the host asks.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_millis(&self) -> u64;
}

/// Fixed clock for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualClock(pub u64);

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0
    }
}
