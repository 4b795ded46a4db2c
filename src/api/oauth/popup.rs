//! Popup completion page and flow cookies.
//!
//! The OAuth popup has no shared session with the window that opened it. The
//! callback answers with a tiny HTML page that posts the outcome to
//! `window.opener`, restricted to the request's own origin, and closes itself.

use crate::oauth::FlowOutcome;
use crate::platform::Platform;
use axum::http::{header::COOKIE, HeaderMap};
use axum::response::Html;

/// Builds the self-closing page that reports `outcome` to the opener at `origin`.
pub fn popup_page(outcome: &FlowOutcome, origin: &str) -> Html<String> {
    let message = script_json(&serde_json::to_string(outcome).unwrap_or_else(|_| "{}".to_string()));
    let target = script_json(&serde_json::Value::String(origin.to_string()).to_string());
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Connecting…</title></head>
<body>
<script>
(function () {{
  var message = {message};
  try {{
    if (window.opener) {{
      window.opener.postMessage(message, {target});
    }}
  }} finally {{
    window.close();
  }}
}})();
</script>
</body>
</html>
"#
    ))
}

/// Escapes JSON for embedding inside a `<script>` element.
fn script_json(json: &str) -> String {
    json.replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

/// `Set-Cookie` value for a flow cookie with the given lifetime.
pub fn flow_cookie(name: &str, value: &str, max_age_seconds: i64, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "{name}={value}; HttpOnly{secure_flag}; SameSite=Lax; Path=/; Max-Age={max_age_seconds}"
    )
}

/// `Set-Cookie` values clearing both flow cookies for `platform`.
pub fn clear_flow_cookies(platform: Platform, secure: bool) -> [String; 2] {
    [
        flow_cookie(&platform.state_cookie(), "", 0, secure),
        flow_cookie(&platform.widget_cookie(), "", 0, secure),
    ]
}

/// Reads one cookie from the request's `Cookie` header(s).
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|part| part.trim().strip_prefix(prefix.as_str()).map(str::to_string))
        .filter(|value| !value.is_empty())
}
