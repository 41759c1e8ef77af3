use error_stack::Report;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Transport failure not covered by the other variants.
    Request,
    /// Connection refused, host lookup failure, or a connection lost mid-request.
    Connection,
    /// The request or the response body timed out.
    Timeout,
    /// The gateway replied with a non-success status code.
    Http(u16),
    /// The response contained an `errors` array.
    Archive,
    /// The response body is not valid JSON or doesn't match the expected shape.
    DeserializeResponse,
    /// The client options are invalid.
    Configuration,
}

pub trait GatewayErrorExt {
    fn is_retryable(&self) -> bool;
}

impl GatewayError {
    /// Whether the request should be retried after a backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Http(status) => matches!(status, 429 | 502 | 503),
            GatewayError::Timeout | GatewayError::Connection => true,
            GatewayError::Request
            | GatewayError::Archive
            | GatewayError::DeserializeResponse
            | GatewayError::Configuration => false,
        }
    }
}

impl GatewayErrorExt for Report<GatewayError> {
    fn is_retryable(&self) -> bool {
        self.current_context().is_retryable()
    }
}

/// Classify a transport error returned by reqwest.
pub(crate) fn transport_error(err: reqwest::Error) -> Report<GatewayError> {
    let context = if err.is_timeout() {
        GatewayError::Timeout
    } else if err.is_connect() || is_connection_lost(&err) {
        GatewayError::Connection
    } else {
        GatewayError::Request
    };

    Report::new(err).change_context(context)
}

/// Whether the connection was closed, reset or aborted while the request was
/// in flight.
fn is_connection_lost(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(err) = source {
        if let Some(err) = err.downcast_ref::<hyper::Error>() {
            if err.is_incomplete_message() || err.is_closed() || err.is_canceled() {
                return true;
            }
        }

        if let Some(err) = err.downcast_ref::<std::io::Error>() {
            if is_connection_lost_kind(err.kind()) {
                return true;
            }
        }

        source = err.source();
    }

    false
}

fn is_connection_lost_kind(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind;

    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}

impl error_stack::Context for GatewayError {}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Request => write!(f, "gateway error: failed to send request"),
            GatewayError::Connection => write!(f, "gateway error: failed to connect"),
            GatewayError::Timeout => write!(f, "gateway error: the request timed out"),
            GatewayError::Http(status) => write!(f, "gateway error: got http {}", status),
            GatewayError::Archive => write!(f, "gateway error: archive returned errors"),
            GatewayError::DeserializeResponse => {
                write!(f, "gateway error: failed to deserialize response")
            }
            GatewayError::Configuration => write!(f, "gateway error: invalid configuration"),
        }
    }
}
