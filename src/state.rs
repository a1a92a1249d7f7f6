use crate::session::SessionGuard;
use crate::stats::Dashboard;

#[derive(Clone)]
pub struct AppState {
    pub session: SessionGuard,
    pub dashboard: Dashboard,
}

impl AppState {
    pub fn new(session: SessionGuard, dashboard: Dashboard) -> Self {
        Self { session, dashboard }
    }
}
