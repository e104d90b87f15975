use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ReferrerError, Result};
use crate::models::RawResponse;
use crate::platform::ServiceHandle;

/// Issues the single referrer request on `handle`.
///
/// Transport faults and timeouts are surfaced as errors rather than treated as
/// an empty reply; `Ok(None)` is reserved for a provider that answered without
/// a payload.
pub async fn request_referrer(
    handle: &dyn ServiceHandle,
    package_name: &str,
    call_timeout: Duration,
) -> Result<Option<RawResponse>> {
    debug!(package_name, "requesting install referrer");
    match tokio::time::timeout(call_timeout, handle.get_install_referrer(package_name)).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(fault)) => {
            warn!(%fault, "referrer call failed");
            Err(ReferrerError::TransportFault(fault.0))
        }
        Err(_) => {
            warn!(?call_timeout, "referrer call timed out");
            Err(ReferrerError::Timeout(timeout_millis(call_timeout)))
        }
    }
}

/// Whole milliseconds in `d`, saturating for durations beyond `u64::MAX` ms.
fn timeout_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
