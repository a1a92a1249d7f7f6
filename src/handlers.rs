use crate::errors::AppError;
use crate::models::{MonthlyCollections, PendingCounts, ValidationStats};
use crate::session::SIGNIN_ROUTE;
use crate::state::AppState;
use crate::ui::{render_dashboard, render_session_expired, render_signin};
use crate::widget::WidgetPayload;
use axum::{
    Form, Json,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SignInForm {
    pub token: String,
}

#[derive(Serialize)]
struct DashboardPayload<'a> {
    session_expired: bool,
    validation: WidgetPayload<'a, ValidationStats>,
    pending: WidgetPayload<'a, PendingCounts>,
    monthly: WidgetPayload<'a, MonthlyCollections>,
}

pub async fn index(State(state): State<AppState>) -> Response {
    let lang = state.session.locale().await;
    if state.dashboard.session_expired() {
        let html = render_session_expired(lang.as_deref(), SIGNIN_ROUTE, state.session.redirect_delay());
        return Html(html).into_response();
    }
    if state.session.token().is_none() {
        return Redirect::to(SIGNIN_ROUTE).into_response();
    }

    state.dashboard.revalidate().await;
    let html = render_dashboard(
        lang.as_deref(),
        &state.dashboard.validation.snapshot(),
        &state.dashboard.pending.snapshot(),
        &state.dashboard.monthly.snapshot(),
    );
    Html(html).into_response()
}

pub async fn get_dashboard(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let validation = state.dashboard.validation.snapshot();
    let pending = state.dashboard.pending.snapshot();
    let monthly = state.dashboard.monthly.snapshot();
    let payload = DashboardPayload {
        session_expired: state.dashboard.session_expired(),
        validation: WidgetPayload::from_state(&validation),
        pending: WidgetPayload::from_state(&pending),
        monthly: WidgetPayload::from_state(&monthly),
    };
    let body = serde_json::to_value(&payload).map_err(AppError::internal)?;
    Ok(Json(body))
}

pub async fn refresh(State(state): State<AppState>) -> Redirect {
    state.dashboard.refetch().await;
    Redirect::to("/")
}

pub async fn clear_errors(State(state): State<AppState>) -> Redirect {
    state.dashboard.clear_errors();
    Redirect::to("/")
}

pub async fn signin_page(State(state): State<AppState>) -> Html<String> {
    let lang = state.session.locale().await;
    Html(render_signin(lang.as_deref(), state.session.token().is_some()))
}

pub async fn signin(
    State(state): State<AppState>,
    Form(form): Form<SignInForm>,
) -> Result<Redirect, AppError> {
    let token = form.token.trim();
    if token.is_empty() {
        return Err(AppError::bad_request("token is required"));
    }
    state.session.sign_in(token, None).await?;
    state.dashboard.clear_errors();
    info!("signed in from the back-office form");
    Ok(Redirect::to("/"))
}

pub async fn signout(State(state): State<AppState>) -> Result<Redirect, AppError> {
    state.session.clear_session().await?;
    info!("signed out");
    Ok(Redirect::to(SIGNIN_ROUTE))
}
