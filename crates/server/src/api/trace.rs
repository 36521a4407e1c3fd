use std::borrow::Cow;

use axum::extract::MatchedPath;
use axum::http::Request;
use tracing::Span;

/// Path prefix of the public download route; the segment after it is a
/// live credential.
const DOWNLOAD_PREFIX: &str = "/v1/download/";

/// Span for one HTTP request.
///
/// Records the matched route template when routing has resolved one and a
/// redacted URI path otherwise, so download tokens never reach the logs.
pub fn request_span<B>(request: &Request<B>) -> Span {
    let path = request.extensions().get::<MatchedPath>().map_or_else(
        || redact_path(request.uri().path()),
        |matched| Cow::Borrowed(matched.as_str()),
    );
    tracing::debug_span!(
        "request",
        method = %request.method(),
        path = %path,
        version = ?request.version(),
    )
}

/// Replace the token segment of a download path with a placeholder.
pub fn redact_path(path: &str) -> Cow<'_, str> {
    match path.strip_prefix(DOWNLOAD_PREFIX) {
        Some(rest) if !rest.is_empty() => Cow::Owned(format!("{DOWNLOAD_PREFIX}{{token}}")),
        _ => Cow::Borrowed(path),
    }
}
