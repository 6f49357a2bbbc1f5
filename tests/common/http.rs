use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

/// Drive one request through the router without binding a socket.
///
/// A `body` is sent as JSON; `headers` are added verbatim.
pub async fn request(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
    headers: &[(&str, String)],
) -> Response {
    let payload = match &body {
        Some(json) => Body::from(serde_json::to_vec(json).unwrap()),
        None => Body::empty(),
    };
    let mut req = Request::new(payload);
    *req.method_mut() = method;
    *req.uri_mut() = path.parse().unwrap();

    let map = req.headers_mut();
    if body.is_some() {
        map.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    for (name, value) in headers {
        let name = header::HeaderName::from_bytes(name.as_bytes()).unwrap();
        map.append(name, HeaderValue::from_str(value).unwrap());
    }

    app.clone().oneshot(req).await.unwrap()
}

/// Split a response into status, headers and its JSON body (`Null` when empty).
pub async fn response_json(resp: Response) -> (StatusCode, HeaderMap, Value) {
    let (parts, body) = resp.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            let text = String::from_utf8_lossy(&bytes);
            panic!("{} body is not JSON ({e}): {text}", parts.status)
        })
    };
    (parts.status, parts.headers, json)
}

/// Error envelope with the given machine-readable code.
pub fn assert_json_error(body: &Value, code: &str) {
    assert_eq!(body["success"], Value::Bool(false), "not an error envelope: {body}");
    assert_eq!(body["code"].as_str(), Some(code), "unexpected error: {body}");
    assert!(body["message"].is_string(), "error without message: {body}");
}

/// 2xx with a `{ success: true, data }` envelope.
pub fn assert_status_ok_json(status: StatusCode, body: &Value) {
    assert!(status.is_success(), "status {status}: {body}");
    assert_eq!(body["success"], Value::Bool(true), "{body}");
    assert!(!body["data"].is_null(), "missing data: {body}");
}
