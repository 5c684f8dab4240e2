use crate::cache::CacheEntry;
use crate::rules::{self, MatchError, ParamMap};
use crate::server::{AppState, ServerSettings};
use axum::extract::{Host, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-redirector-cache-status");

/// Per-request pipeline: cache lookup, then match, rewrite, parameter
/// composition, and location assembly, with the result written back to the
/// cache. Negative results are cached too; responses born from authoring
/// errors (rewrite or assembly failures) are not.
pub async fn handle_redirect(
    State(state): State<Arc<AppState>>,
    Host(host): Host,
    uri: Uri,
) -> Response {
    let host = normalize_host(&host).to_string();
    let path = uri.path().to_string();
    let request_params = parse_query(uri.query());
    let correlation_id = Uuid::new_v4();
    let span = tracing::debug_span!("request_handler", %host, %path, %correlation_id);

    async move {
        if let Some(cached) = state.cache.get(&host, &path).await {
            debug!(location = %cached.location, "cache hit");
            return cached_response(&state.settings, &cached);
        }

        let table = state.table.load();
        let rule = match rules::find_match(&table, &host, &path) {
            Ok(rule) => rule,
            Err(err) => return handle_match_error(&state, err, &host, &path).await,
        };

        let new_path = match rules::rewrite_path(&path, &rule.pattern, &rule.to) {
            Ok(new_path) => new_path,
            // an authoring error, not a request error: respond with the
            // fallback and leave the cache alone
            Err(err) => {
                warn!(%err, from = %rule.from, to = %rule.to, "failed to rewrite path");
                return fallback_response(&state.settings);
            }
        };

        let params = match rules::compose_params(&rule.strategy, &request_params, &rule.values) {
            Ok(params) => params,
            Err(err) => {
                warn!(%err, "unknown parameter strategy");
                ParamMap::new()
            }
        };

        let location = match rules::build_location(&rule.to, &new_path, &params) {
            Ok(location) => location,
            Err(err) => {
                warn!(%err, to = %rule.to, "failed to assemble location");
                return fallback_response(&state.settings);
            }
        };

        let response = redirect_response(
            rule.code,
            Some(&location),
            cache_control_value(state.settings.cache_control_max_age, rule.cache_control_max_age),
            false,
        );

        state
            .cache
            .set(&host, &path, location, rule.code, rule.cache_control_max_age)
            .await;

        response
    }
    .instrument(span)
    .await
}

async fn handle_match_error(
    state: &AppState,
    err: MatchError,
    host: &str,
    path: &str,
) -> Response {
    debug!(%err, "no rule matched");
    let settings = &state.settings;

    let (code, location) = if settings.location_on_miss.is_empty() {
        (settings.status_on_miss, None)
    } else {
        (
            StatusCode::TEMPORARY_REDIRECT.as_u16(),
            Some(settings.location_on_miss.as_str()),
        )
    };

    let response = redirect_response(
        code,
        location,
        cache_control_value(settings.cache_control_max_age, 0),
        false,
    );

    state
        .cache
        .set(host, path, location.unwrap_or_default().to_string(), code, 0)
        .await;

    response
}

fn cached_response(settings: &ServerSettings, entry: &CacheEntry) -> Response {
    let location = (!entry.location.is_empty()).then_some(entry.location.as_str());
    redirect_response(
        entry.code,
        location,
        cache_control_value(settings.cache_control_max_age, entry.cache_control_max_age),
        true,
    )
}

fn fallback_response(settings: &ServerSettings) -> Response {
    let location = (!settings.location_on_miss.is_empty()).then_some(settings.location_on_miss.as_str());
    redirect_response(settings.status_on_miss, location, None, false)
}

fn redirect_response(
    code: u16,
    location: Option<&str>,
    max_age: Option<i64>,
    cached: bool,
) -> Response {
    let mut headers = HeaderMap::new();

    if let Some(location) = location {
        match HeaderValue::from_str(location) {
            Ok(value) => {
                headers.insert(header::LOCATION, value);
            }
            Err(err) => {
                warn!(%err, location, "location is not a valid header value");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    if let Some(age) = max_age {
        if let Ok(value) = HeaderValue::from_str(&format!("max-age={age}")) {
            headers.insert(header::CACHE_CONTROL, value);
        }
    }

    if cached {
        headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static("cached"));
    }

    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, headers).into_response()
}

/// Cache-Control max-age to emit, if any: a rule-level `-1` suppresses the
/// header, `0` inherits the server default (itself suppressible with `-1`),
/// and anything else is emitted verbatim.
fn cache_control_value(server_default: i64, rule_value: i64) -> Option<i64> {
    match rule_value {
        -1 => None,
        0 => (server_default > -1).then_some(server_default),
        value => Some(value),
    }
}

fn normalize_host(host: &str) -> &str {
    match host.split_once(':') {
        Some((host, _port)) => host,
        None => host,
    }
}

fn parse_query(query: Option<&str>) -> ParamMap {
    let mut params = ParamMap::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_control_value() {
        // rule-level -1 always suppresses
        assert_eq!(cache_control_value(3600, -1), None);
        assert_eq!(cache_control_value(-1, -1), None);
        // rule-level 0 inherits the server default unless that is disabled
        assert_eq!(cache_control_value(3600, 0), Some(3600));
        assert_eq!(cache_control_value(0, 0), Some(0));
        assert_eq!(cache_control_value(-1, 0), None);
        // anything else wins over the default
        assert_eq!(cache_control_value(3600, 60), Some(60));
        assert_eq!(cache_control_value(-1, 60), Some(60));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("example.com"), "example.com");
        assert_eq!(normalize_host("example.com:1234"), "example.com");
        assert_eq!(normalize_host("localhost:8080"), "localhost");
    }

    #[test]
    fn test_parse_query() {
        let params = parse_query(Some("existing=world&new=other&new=again"));
        assert_eq!(params["existing"], vec!["world".to_string()]);
        assert_eq!(
            params["new"],
            vec!["other".to_string(), "again".to_string()]
        );
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn test_redirect_response_headers() {
        let response = redirect_response(301, Some("https://foo.com/x"), Some(60), true);
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        let headers = response.headers();
        assert_eq!(headers[header::LOCATION], "https://foo.com/x");
        assert_eq!(headers[header::CACHE_CONTROL], "max-age=60");
        assert_eq!(headers["x-redirector-cache-status"], "cached");
    }

    #[test]
    fn test_redirect_response_omits_absent_headers() {
        let response = redirect_response(404, None, None, false);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let headers = response.headers();
        assert!(!headers.contains_key(header::LOCATION));
        assert!(!headers.contains_key(header::CACHE_CONTROL));
        assert!(!headers.contains_key("x-redirector-cache-status"));
    }
}
