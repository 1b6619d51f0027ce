use crate::errors::ServerError;
use astra::{Body, Response, ResponseBuilder};
use serde_json::json;

/// Render a ServerError as JSON for API callers, or as a small HTML page.
pub fn error_response(err: ServerError, as_json: bool) -> Response {
    let status = err.status();
    if status >= 500 {
        tracing::error!(status, error = %err, "request failed");
    } else {
        tracing::debug!(status, error = %err, "request rejected");
    }

    let message = match &err {
        ServerError::BadRequest(msg) => msg.clone(),
        other => other.to_string(),
    };

    let built = if as_json {
        let body = json!({ "status": "error", "message": message }).to_string();
        ResponseBuilder::new()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Body::from(body))
    } else {
        ResponseBuilder::new()
            .status(status)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(Body::from(render_error(status, &message)))
    };

    built.unwrap_or_else(|_| Response::new(Body::from("Internal Server Error")))
}

/// Build a basic HTML error page
fn render_error(status: u16, message: &str) -> String {
    let message = maud::html! { (message) }.into_string();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Error {status}</title>
  <style>
    body {{
      font-family: system-ui, sans-serif;
      max-width: 720px;
      margin: 4rem auto;
      padding: 1rem;
    }}
    p {{
      font-size: 1.1rem;
      color: #444;
    }}
  </style>
</head>
<body>
  <h1>Error {status}</h1>
  <p>{message}</p>
  <p><a href="/">← Back to listings</a></p>
</body>
</html>"#
    )
}
