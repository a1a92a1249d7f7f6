use crate::handlers;
use crate::session::SIGNIN_ROUTE;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/refresh", post(handlers::refresh))
        .route("/errors/clear", post(handlers::clear_errors))
        .route(SIGNIN_ROUTE, get(handlers::signin_page).post(handlers::signin))
        .route("/signout", post(handlers::signout))
        .route("/api/dashboard", get(handlers::get_dashboard))
        .with_state(state)
}
