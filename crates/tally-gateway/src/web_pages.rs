//! Leptos SSR renderers for the dashboard and login form.

use chrono_tz::Tz;
use leptos::prelude::*;
use std::collections::BTreeMap;
use tally_store::{LogEntry, LogSource};

use crate::endpoints::{DOWNLOAD_ENDPOINT, LOGIN_ENDPOINT, LOGOUT_ENDPOINT, LOG_FORM_ENDPOINT};

const PAGE_STYLE: &str = r#"
    :root { color-scheme: light; font-family: "IBM Plex Sans", "Segoe UI", sans-serif; }
    body { margin: 0; background: #f4f6f8; color: #13232f; }
    .container { max-width: 880px; margin: 0 auto; padding: 1.5rem; }
    h1 { margin: 0 0 0.75rem 0; font-size: 1.5rem; }
    form { display: flex; gap: 0.5rem; margin-bottom: 1rem; }
    input[type=text], input[type=password] {
      flex: 1; padding: 0.5rem; border: 1px solid #c4ced8; border-radius: 6px;
    }
    button {
      padding: 0.5rem 1rem; border: 0; border-radius: 6px;
      background: #1f5fa8; color: #fff; cursor: pointer;
    }
    ul.entries { list-style: none; padding: 0; font-family: "IBM Plex Mono", monospace; }
    ul.entries li { padding: 0.3rem 0; border-bottom: 1px solid #e1e6eb; }
    .counts span { margin-right: 1rem; }
    .error { color: #a31d1d; }
    nav a { margin-right: 1rem; }
"#;

/// Wraps an escaped SSR fragment in the static document shell.
fn render_document(title: &'static str, body: String) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{title}</title>
  <style>{PAGE_STYLE}</style>
</head>
<body>
{body}
</body>
</html>
"#
    )
}

/// Dashboard with the entry form, per-source counts and the latest entries,
/// newest first, timestamps in `timezone`.
pub(crate) fn render_dashboard_page(
    username: &str,
    counts: &BTreeMap<LogSource, u64>,
    entries: &[LogEntry],
    timezone: Tz,
) -> String {
    let total_label = format!("Total: {}", counts.values().sum::<u64>());
    let signed_in_label = format!("Signed in as {username}");
    let source_labels = LogSource::ALL
        .iter()
        .map(|source| {
            format!(
                "{}: {}",
                source.as_str(),
                counts.get(source).copied().unwrap_or(0)
            )
        })
        .collect::<Vec<_>>();
    let entry_lines = entries
        .iter()
        .rev()
        .map(|entry| entry.render_line_in(&timezone))
        .collect::<Vec<_>>();
    let has_entries = !entry_lines.is_empty();
    let entry_count = entry_lines.len().to_string();

    let body = view! {
        <div class="container" id="tally-dashboard">
            <h1>Tally</h1>
            <nav>
                <span>{signed_in_label}</span>
                <a href=DOWNLOAD_ENDPOINT>Download</a>
                <a href=LOGOUT_ENDPOINT>Sign out</a>
            </nav>
            <form method="post" action=LOG_FORM_ENDPOINT>
                <input
                    type="text"
                    name="message"
                    placeholder="What happened?"
                    autofocus="autofocus"
                    required="required"
                />
                <button type="submit">Log</button>
            </form>
            <div class="counts">
                <span>{total_label}</span>
                {source_labels
                    .into_iter()
                    .map(|label| view! { <span>{label}</span> })
                    .collect_view()}
            </div>
            <ul class="entries" data-entry-count=entry_count>
                {entry_lines
                    .into_iter()
                    .map(|line| view! { <li>{line}</li> })
                    .collect_view()}
                {(!has_entries).then(|| view! { <li>"No log entries yet."</li> })}
            </ul>
        </div>
    };
    render_document("Tally", body.to_html())
}

pub(crate) fn render_login_page(error: Option<&str>) -> String {
    let error_line = error.map(str::to_string);
    let body = view! {
        <div class="container" id="tally-login">
            <h1>Sign in</h1>
            {error_line.map(|message| view! { <p class="error">{message}</p> })}
            <form method="post" action=LOGIN_ENDPOINT>
                <input type="text" name="username" placeholder="Username" required="required" />
                <input
                    type="password"
                    name="password"
                    placeholder="Password"
                    required="required"
                />
                <button type="submit">Sign in</button>
            </form>
        </div>
    };
    render_document("Tally sign in", body.to_html())
}
