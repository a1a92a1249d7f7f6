use crate::resource::ResourceState;
use serde::Serialize;

/// The single view a dashboard widget shows for a resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WidgetView<'a, T> {
    Loading,
    /// Session expired; navigation to sign-in is pending.
    Hidden,
    Error(&'a str),
    Empty,
    Populated(&'a T),
}

impl<T> WidgetView<'_, T> {
    pub fn status(&self) -> &'static str {
        match self {
            WidgetView::Loading => "loading",
            WidgetView::Hidden => "hidden",
            WidgetView::Error(_) => "error",
            WidgetView::Empty => "empty",
            WidgetView::Populated(_) => "ready",
        }
    }
}

pub fn widget_view<T>(state: &ResourceState<T>) -> WidgetView<'_, T> {
    if state.is_loading && !state.session_expired {
        return WidgetView::Loading;
    }
    if state.session_expired {
        return WidgetView::Hidden;
    }
    if let Some(error) = state.error.as_deref() {
        return WidgetView::Error(error);
    }
    match state.data.as_ref() {
        Some(data) => WidgetView::Populated(data),
        None => WidgetView::Empty,
    }
}

/// Serializable form of a widget's view for the JSON dashboard.
#[derive(Debug, Serialize)]
pub struct WidgetPayload<'a, T> {
    pub status: &'static str,
    pub data: Option<&'a T>,
    pub error: Option<&'a str>,
    pub fetched_at: Option<String>,
}

impl<'a, T> WidgetPayload<'a, T> {
    pub fn from_state(state: &'a ResourceState<T>) -> Self {
        let view = widget_view(state);
        let status = view.status();
        let (data, error) = match view {
            WidgetView::Populated(data) => (Some(data), None),
            WidgetView::Error(message) => (None, Some(message)),
            _ => (None, None),
        };
        Self {
            status,
            data,
            error,
            fetched_at: state.fetched_at.map(|at| at.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(data: Option<u32>) -> ResourceState<u32> {
        ResourceState {
            data,
            is_loading: false,
            ..ResourceState::default()
        }
    }

    #[test]
    fn loading_wins_until_settled() {
        let state = ResourceState::<u32> {
            data: Some(3),
            error: Some("stale error".into()),
            ..ResourceState::default()
        };
        assert_eq!(widget_view(&state), WidgetView::Loading);
    }

    #[test]
    fn expired_session_hides_everything() {
        let mut state = loaded(Some(3));
        state.is_loading = true;
        state.session_expired = true;
        state.error = Some("ignored".into());
        assert_eq!(widget_view(&state), WidgetView::Hidden);
    }

    #[test]
    fn error_beats_data() {
        let mut state = loaded(Some(3));
        state.error = Some("quota exceeded".into());
        assert_eq!(widget_view(&state), WidgetView::Error("quota exceeded"));
    }

    #[test]
    fn empty_then_populated() {
        assert_eq!(widget_view(&loaded(None)), WidgetView::Empty);
        assert_eq!(widget_view(&loaded(Some(7))), WidgetView::Populated(&7));
    }

    #[test]
    fn payload_reports_status() {
        let state = loaded(Some(7));
        let payload = WidgetPayload::from_state(&state);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.data, Some(&7));
        assert_eq!(payload.error, None);
    }
}
