//! `test-utils` is used for testing in both `quotagate-lib` and `quotagate-bin`.
//! This crate does not depend on `quotagate-lib` or `quotagate-bin`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock web server, which responds with a predefined status when
/// handling a matching request
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET")).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// A `429 Too Many Requests` response template with the given `Retry-After`
/// value and, optionally, the limit type that was exceeded
#[macro_export]
macro_rules! rate_limited {
    ($retry_after:expr $(,)?) => {
        wiremock::ResponseTemplate::new(429).insert_header("Retry-After", $retry_after)
    };
    ($retry_after:expr, $limit_type:expr $(,)?) => {
        $crate::rate_limited!($retry_after).insert_header("X-Rate-Limit-Type", $limit_type)
    };
}

/// A `200 OK` response template advertising region and method limits.
///
/// Each argument is a header value, e.g. `"20:1,100:120"`.
#[macro_export]
macro_rules! advertised_limits {
    ($app:expr, $app_count:expr, $method:expr, $method_count:expr $(,)?) => {
        wiremock::ResponseTemplate::new(200)
            .insert_header("X-App-Rate-Limit", $app)
            .insert_header("X-App-Rate-Limit-Count", $app_count)
            .insert_header("X-Method-Rate-Limit", $method)
            .insert_header("X-Method-Rate-Limit-Count", $method_count)
    };
}
