//! Navigation state — routes, history and the state handed between pages.

use graphear_core::types::NavState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Wait,
    Home,
    PdfConverter,
    Audio,
    Solve,
    WrongReview,
}

impl Route {
    pub const ALL: [Route; 6] = [
        Route::Wait,
        Route::Home,
        Route::PdfConverter,
        Route::Audio,
        Route::Solve,
        Route::WrongReview,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Route::Wait => "/wait",
            Route::Home => "/home",
            Route::PdfConverter => "/pdf-converter",
            Route::Audio => "/audio",
            Route::Solve => "/solve",
            Route::WrongReview => "/wrong-review",
        }
    }

    /// Resolve a path. `/` redirects to `/wait`; trailing slashes are ignored.
    pub fn from_path(path: &str) -> Option<Route> {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Some(Route::Wait);
        }
        Route::ALL.into_iter().find(|r| r.path() == trimmed)
    }
}

/// Current route, back stack and the pending state for the next page.
#[derive(Debug)]
pub struct Navigator {
    current: Route,
    history: Vec<Route>,
    pending: Option<NavState>,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self {
            current: Route::Wait,
            history: Vec::new(),
            pending: None,
        }
    }

    pub fn current(&self) -> Route {
        self.current
    }

    /// Every route is open to the single local user.
    pub fn is_authenticated(&self) -> bool {
        true
    }

    pub fn navigate(&mut self, route: Route) {
        self.go(route, None);
    }

    /// Navigate and hand `state` to the destination page.
    pub fn navigate_with(&mut self, route: Route, state: NavState) {
        self.go(route, Some(state));
    }

    /// Navigate by path; unknown paths leave the current route unchanged.
    pub fn open(&mut self, path: &str) -> Option<Route> {
        let route = Route::from_path(path)?;
        self.navigate(route);
        Some(route)
    }

    pub fn back(&mut self) -> Route {
        if let Some(prev) = self.history.pop() {
            self.current = prev;
            self.pending = None;
        }
        self.current
    }

    /// State handed over by the last navigation; consumed on read.
    pub fn take_state(&mut self) -> Option<NavState> {
        self.pending.take()
    }

    fn go(&mut self, route: Route, state: Option<NavState>) {
        if route != self.current {
            self.history.push(self.current);
        }
        tracing::debug!("navigate: {} → {}", self.current.path(), route.path());
        self.current = route;
        self.pending = state;
    }
}
