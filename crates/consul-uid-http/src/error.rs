/// Errors raised while setting up a [`ConsulClient`](crate::ConsulClient).
///
/// Failures of individual requests are reported as
/// [`consul_uid::TransportError`] instead.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error("invalid scheme `{0}`, expected `http` or `https`")]
    InvalidScheme(String),
    #[error("invalid agent URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("ACL token is not a valid header value")]
    InvalidToken,
    #[error("unable to build HTTP client")]
    Build(#[from] reqwest::Error),
}
