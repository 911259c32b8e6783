//! Seek/scrub engine — pointer gestures over the progress bar.
//!
//! Two states. `Idle` until a mouse press or touch start lands on the bar;
//! `Dragging` until the matching release. While dragging, move/up listeners
//! are attached to the whole window so the gesture survives the pointer
//! leaving the bar. Entering `Dragging` attaches them, leaving detaches them,
//! and dropping the engine mid-gesture detaches them too.

use tracing::debug;

use crate::media::MediaResource;
use crate::transport::TransportController;

/// Input device driving a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    Mouse,
    Touch,
}

/// Horizontal extent of the progress bar in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarRect {
    pub left: f64,
    pub width: f64,
}

impl BarRect {
    pub fn new(left: f64, width: f64) -> Self {
        Self { left, width }
    }

    /// `clamp((x - left) / width, 0, 1)`, or `None` for a degenerate bar.
    pub fn fraction_at(&self, client_x: f64) -> Option<f64> {
        if !(self.width > 0.0) {
            return None;
        }
        let fraction = (client_x - self.left) / self.width;
        fraction.is_finite().then(|| fraction.clamp(0.0, 1.0))
    }
}

/// Window-level registry for drag move/up listeners.
///
/// `attach` registers both the move and the release listener for `kind`;
/// `detach` removes exactly what that `attach` registered.
pub trait WindowListeners {
    type Token;

    fn attach(&mut self, kind: PointerKind) -> Self::Token;
    fn detach(&mut self, token: Self::Token);
}

struct SeekGesture<T> {
    anchor: BarRect,
    kind: PointerKind,
    listeners: T,
}

pub struct SeekEngine<M: MediaResource, W: WindowListeners> {
    transport: TransportController<M>,
    window: W,
    gesture: Option<SeekGesture<W::Token>>,
}

impl<M: MediaResource, W: WindowListeners> SeekEngine<M, W> {
    pub fn new(transport: TransportController<M>, window: W) -> Self {
        Self {
            transport,
            window,
            gesture: None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.gesture.is_some()
    }

    // ── mouse ─────────────────────────────────────────────────────────

    pub fn pointer_down(&mut self, bar: BarRect, client_x: f64) -> Option<f64> {
        self.begin(PointerKind::Mouse, bar, client_x)
    }

    pub fn pointer_move(&mut self, client_x: f64) -> Option<f64> {
        self.track(PointerKind::Mouse, client_x)
    }

    pub fn pointer_up(&mut self) {
        self.end(PointerKind::Mouse);
    }

    // ── touch (first touch point wins) ────────────────────────────────

    pub fn touch_start(&mut self, bar: BarRect, touches: &[f64]) -> Option<f64> {
        let &x = touches.first()?;
        self.begin(PointerKind::Touch, bar, x)
    }

    pub fn touch_move(&mut self, touches: &[f64]) -> Option<f64> {
        let &x = touches.first()?;
        self.track(PointerKind::Touch, x)
    }

    pub fn touch_end(&mut self) {
        self.end(PointerKind::Touch);
    }

    /// Abandon any gesture in progress.
    pub fn cancel(&mut self) {
        self.release();
    }

    fn begin(&mut self, kind: PointerKind, bar: BarRect, client_x: f64) -> Option<f64> {
        // A press without a release (lost pointer-up) must not leak listeners.
        self.release();

        self.transport.set_seeking(true);
        let listeners = self.window.attach(kind);
        self.gesture = Some(SeekGesture {
            anchor: bar,
            kind,
            listeners,
        });
        debug!("seek: drag started ({kind:?})");
        self.seek_at(bar, client_x)
    }

    fn track(&mut self, kind: PointerKind, client_x: f64) -> Option<f64> {
        let anchor = match &self.gesture {
            Some(g) if g.kind == kind => g.anchor,
            _ => return None,
        };
        self.seek_at(anchor, client_x)
    }

    fn end(&mut self, kind: PointerKind) {
        if self.gesture.as_ref().is_some_and(|g| g.kind == kind) {
            self.release();
        }
    }

    fn release(&mut self) {
        if let Some(gesture) = self.gesture.take() {
            self.window.detach(gesture.listeners);
            self.transport.set_seeking(false);
            debug!("seek: drag ended ({:?})", gesture.kind);
        }
    }

    fn seek_at(&self, bar: BarRect, client_x: f64) -> Option<f64> {
        let fraction = bar.fraction_at(client_x)?;
        self.transport.seek_to_fraction(fraction)
    }
}

impl<M: MediaResource, W: WindowListeners> Drop for SeekEngine<M, W> {
    fn drop(&mut self) {
        self.release();
    }
}
