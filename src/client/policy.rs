use crate::client::classification::StatusFamily;
use crate::transport::TransportResponse;
use crate::Result;

/// Internal decision for how to proceed once a network attempt has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Hand the network response to the caller.
    Deliver,
    /// The attempt failed; serve a contingent cache entry if one exists.
    Fallback,
    /// The attempt failed and the cache may not stand in for it.
    Fail,
}

/// Decide what to do with a completed (not cancelled) attempt.
///
/// - `fallback_allowed` is true for cacheable requests under the normal cache
///   policy.
/// - Informational and redirect statuses are delivered, never replaced.
pub(crate) fn decide(outcome: &Result<TransportResponse>, fallback_allowed: bool) -> Decision {
    let failed = match outcome {
        Ok(resp) => StatusFamily::of(resp.status).is_failure(),
        Err(e) => e.is_network_failure(),
    };
    match (failed, fallback_allowed) {
        (false, _) => {
            if outcome.is_ok() {
                Decision::Deliver
            } else {
                Decision::Fail
            }
        }
        (true, true) => Decision::Fallback,
        (true, false) => Decision::Fail,
    }
}
