//! Status classification logic

/// HTTP status family of a completed network attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFamily {
    Informational,
    Successful,
    Redirection,
    ClientError,
    ServerError,
    /// Outside 100..=599.
    Unknown,
}

impl StatusFamily {
    pub fn of(status: u16) -> Self {
        match status {
            100..=199 => StatusFamily::Informational,
            200..=299 => StatusFamily::Successful,
            300..=399 => StatusFamily::Redirection,
            400..=499 => StatusFamily::ClientError,
            500..=599 => StatusFamily::ServerError,
            _ => StatusFamily::Unknown,
        }
    }

    /// Whether a response in this family is delivered as an `HttpStatus` error
    /// (and therefore may be replaced by a contingent cache entry).
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            StatusFamily::ClientError | StatusFamily::ServerError | StatusFamily::Unknown
        )
    }

    pub fn is_success(self) -> bool {
        matches!(self, StatusFamily::Successful)
    }
}
