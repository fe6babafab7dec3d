use http::StatusCode;

/// How the dispatcher handles a response, decided by its status code alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// 2xx, delivered and used to adapt the limits
    Success,
    /// `429 Too Many Requests`, the scope is saturated
    RateLimited,
    /// A malformed or unauthorized request; retrying can't help
    Rejected,
    /// Anything else, worth another attempt if the budget allows
    Retry,
}

/// An extension trait to help determine what to do with a response
pub(crate) trait RetryExt {
    fn disposition(&self) -> Disposition;
}

impl RetryExt for StatusCode {
    fn disposition(&self) -> Disposition {
        match *self {
            status if status.is_success() => Disposition::Success,
            StatusCode::TOO_MANY_REQUESTS => Disposition::RateLimited,
            StatusCode::BAD_REQUEST
            | StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::NOT_FOUND
            | StatusCode::METHOD_NOT_ALLOWED
            | StatusCode::UNSUPPORTED_MEDIA_TYPE => Disposition::Rejected,
            _ => Disposition::Retry,
        }
    }
}
