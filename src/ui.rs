use crate::models::{MonthlyCollections, PendingCounts, ValidationStats};
use crate::resource::ResourceState;
use crate::widget::{WidgetView, widget_view};
use std::time::Duration;

pub fn render_dashboard(
    lang: Option<&str>,
    validation: &ResourceState<ValidationStats>,
    pending: &ResourceState<PendingCounts>,
    monthly: &ResourceState<MonthlyCollections>,
) -> String {
    let body = DASHBOARD_BODY
        .replace(
            "{{VALIDATION}}",
            &render_widget("Validations", validation, render_validation),
        )
        .replace(
            "{{PENDING}}",
            &render_widget("Pending", pending, render_pending),
        )
        .replace(
            "{{MONTHLY}}",
            &render_widget("Monthly collections", monthly, render_monthly),
        );
    page(lang, "Dashboard", "", &body)
}

pub fn render_session_expired(lang: Option<&str>, redirect_to: &str, after: Duration) -> String {
    let refresh = format!(
        r#"<meta http-equiv="refresh" content="{};url={}" />"#,
        after.as_secs().max(1),
        escape_html(redirect_to)
    );
    let body = format!(
        r#"<section class="notice"><h2>Session expired</h2><p>Your session has expired. Redirecting to <a href="{0}">sign in</a>…</p></section>"#,
        escape_html(redirect_to)
    );
    page(lang, "Session expired", &refresh, &body)
}

pub fn render_signin(lang: Option<&str>, signed_in: bool) -> String {
    let status = if signed_in {
        r#"<p class="hint">A session is already active. Submitting replaces its token.</p>"#
    } else {
        ""
    };
    let body = SIGNIN_BODY.replace("{{STATUS}}", status);
    page(lang, "Sign in", "", &body)
}

fn render_widget<T>(title: &str, state: &ResourceState<T>, populated: fn(&T) -> String) -> String {
    let content = match widget_view(state) {
        WidgetView::Loading => r#"<div class="skeleton" aria-busy="true"></div>"#.to_string(),
        WidgetView::Hidden => return String::new(),
        WidgetView::Error(message) => format!(
            r#"<div class="error"><p>{}</p><form method="post" action="/refresh"><button type="submit">Retry</button></form></div>"#,
            escape_html(message)
        ),
        WidgetView::Empty => r#"<p class="empty">No data available.</p>"#.to_string(),
        WidgetView::Populated(data) => populated(data),
    };
    let updated = state
        .fetched_at
        .map(|at| format!(r#"<span class="updated">{}</span>"#, at.format("%H:%M:%S")))
        .unwrap_or_default();
    format!(
        r#"<article class="widget"><header><h2>{}</h2>{updated}</header>{content}</article>"#,
        escape_html(title)
    )
}

fn render_validation(stats: &ValidationStats) -> String {
    metric_cards(&[
        ("Total", stats.total),
        ("Validated", stats.validated),
        ("Pending", stats.pending),
        ("Rejected", stats.rejected),
    ])
}

fn render_pending(counts: &PendingCounts) -> String {
    metric_cards(&[
        ("Collections", counts.collections),
        ("Validations", counts.validations),
        ("Total", counts.total),
    ])
}

fn render_monthly(collections: &MonthlyCollections) -> String {
    if collections.months.is_empty() {
        return r#"<p class="empty">No collections recorded.</p>"#.to_string();
    }
    let max = collections
        .months
        .iter()
        .map(|point| point.count)
        .max()
        .unwrap_or(0)
        .max(1);
    let bars: String = collections
        .months
        .iter()
        .map(|point| {
            let height = u128::from(point.count) * 100 / u128::from(max);
            format!(
                r#"<div class="bar" title="{0}: {1}"><span style="height:{height}%"></span><small>{0}</small></div>"#,
                escape_html(&point.month),
                point.count
            )
        })
        .collect();
    format!(r#"<div class="bars">{bars}</div>"#)
}

fn metric_cards(items: &[(&str, u64)]) -> String {
    let cards: String = items
        .iter()
        .map(|(label, value)| {
            format!(r#"<div class="stat"><span class="label">{label}</span><span class="value">{value}</span></div>"#)
        })
        .collect();
    format!(r#"<div class="panel">{cards}</div>"#)
}

fn page(lang: Option<&str>, title: &str, head: &str, body: &str) -> String {
    PAGE_HTML
        .replace("{{LANG}}", &escape_html(lang.unwrap_or("fr")))
        .replace("{{TITLE}}", &escape_html(title))
        .replace("{{HEAD}}", head)
        .replace("{{BODY}}", body)
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

const DASHBOARD_BODY: &str = r#"<section class="grid">
      {{VALIDATION}}
      {{PENDING}}
      {{MONTHLY}}
    </section>
    <form method="post" action="/signout"><button class="secondary" type="submit">Sign out</button></form>"#;

const SIGNIN_BODY: &str = r#"<section class="notice">
      <h2>Sign in</h2>
      {{STATUS}}
      <form method="post" action="/signin">
        <label for="token">Access token</label>
        <input id="token" name="token" type="password" autocomplete="off" required />
        <button type="submit">Continue</button>
      </form>
    </section>"#;

const PAGE_HTML: &str = r#"<!DOCTYPE html>
<html lang="{{LANG}}">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  {{HEAD}}
  <title>{{TITLE}} · OFR Agro-bétail</title>
  <style>
    :root {
      --bg: #f4f1ea;
      --ink: #2b2a28;
      --accent: #2f6b4a;
      --danger: #c63b2b;
      --card: #ffffff;
    }

    body {
      margin: 0;
      font-family: "Trebuchet MS", sans-serif;
      background: var(--bg);
      color: var(--ink);
      padding: 32px 18px;
    }

    main {
      width: min(1080px, 100%);
      margin: 0 auto;
      display: grid;
      gap: 24px;
    }

    .grid {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(300px, 1fr));
      gap: 18px;
    }

    .widget, .notice {
      background: var(--card);
      border-radius: 18px;
      padding: 20px;
      box-shadow: 0 12px 30px rgba(0, 0, 0, 0.06);
    }

    .widget header {
      display: flex;
      justify-content: space-between;
      align-items: baseline;
    }

    .updated, .hint, .empty {
      color: #7a746d;
      font-size: 0.85rem;
    }

    .panel {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(110px, 1fr));
      gap: 12px;
    }

    .stat .label {
      display: block;
      font-size: 0.75rem;
      text-transform: uppercase;
      letter-spacing: 0.1em;
      color: #8b857d;
    }

    .stat .value {
      font-size: 1.6rem;
      font-weight: 600;
      color: var(--accent);
    }

    .skeleton {
      height: 80px;
      border-radius: 12px;
      background: linear-gradient(90deg, #eee, #f7f7f7, #eee);
    }

    .error p {
      color: var(--danger);
    }

    .bars {
      display: flex;
      align-items: flex-end;
      gap: 8px;
      height: 140px;
    }

    .bar {
      flex: 1;
      display: flex;
      flex-direction: column;
      justify-content: flex-end;
      height: 100%;
    }

    .bar span {
      display: block;
      background: var(--accent);
      border-radius: 6px 6px 0 0;
    }

    button {
      border: none;
      border-radius: 999px;
      padding: 10px 18px;
      background: var(--accent);
      color: white;
      cursor: pointer;
    }

    button.secondary {
      background: #5f5c57;
    }
  </style>
</head>
<body>
  <main>
    <header><h1>Opération Fluidité Routière Agro-bétail</h1></header>
    {{BODY}}
  </main>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MonthlyPoint;

    fn settled<T>(data: Option<T>) -> ResourceState<T> {
        ResourceState {
            data,
            is_loading: false,
            ..ResourceState::default()
        }
    }

    #[test]
    fn dashboard_renders_each_view() {
        let validation = settled(Some(ValidationStats {
            total: 12,
            validated: 9,
            pending: 2,
            rejected: 1,
        }));
        let pending = ResourceState::<PendingCounts> {
            error: Some("<quota> exceeded".into()),
            ..settled(None)
        };
        let monthly = ResourceState::<MonthlyCollections>::default();

        let html = render_dashboard(Some("en"), &validation, &pending, &monthly);
        assert!(html.contains(r#"<html lang="en">"#));
        assert!(html.contains(r#"<span class="value">12</span>"#));
        assert!(html.contains("&lt;quota&gt; exceeded"));
        assert!(html.contains(r#"class="skeleton""#));
    }

    #[test]
    fn expired_widget_renders_nothing() {
        let state = ResourceState::<PendingCounts> {
            session_expired: true,
            ..ResourceState::default()
        };
        assert!(render_widget("Pending", &state, render_pending).is_empty());
    }

    #[test]
    fn monthly_bars_scale_huge_counts() {
        let collections = MonthlyCollections {
            months: vec![
                MonthlyPoint {
                    month: "2026-08".into(),
                    count: u64::MAX / 2,
                    quantity: 0.0,
                },
                MonthlyPoint {
                    month: "2026-09".into(),
                    count: u64::MAX,
                    quantity: 0.0,
                },
            ],
        };
        let html = render_monthly(&collections);
        assert!(html.contains("height:49%"));
        assert!(html.contains("height:100%"));
    }

    #[test]
    fn expiry_notice_redirects_after_delay() {
        let html = render_session_expired(None, "/signin", Duration::from_secs(2));
        assert!(html.contains(r#"content="2;url=/signin""#));
        assert!(html.contains(r#"<html lang="fr">"#));
    }
}
