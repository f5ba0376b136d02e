//! Utility functions for dlock
//!
//! Clock and host helpers used across the codebase.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use if_addrs::IfAddr;

/// Current time as whole seconds since the Unix epoch
pub fn current_unix_secs() -> i64 {
    since_epoch().as_secs() as i64
}

/// Current time as milliseconds since the Unix epoch
pub fn current_unix_millis() -> i64 {
    since_epoch().as_millis() as i64
}

/// Absolute expiry, in seconds since the Unix epoch, of a lock taken now
///
/// Rounded up to the next whole second, so any positive ttl yields an
/// expiry later than the current second and the lock is active once written.
/// A lock may outlive `now + ttl` by less than one second.
pub fn expire_at_secs(ttl: Duration) -> i64 {
    let at = since_epoch() + ttl;
    (at.as_secs() + u64::from(at.subsec_nanos() > 0)) as i64
}

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// Get the local IP address
///
/// Returns the first non-loopback IPv4 address found,
/// or "127.0.0.1" as fallback. Used as the default host attribution.
pub fn local_ip() -> String {
    if_addrs::get_if_addrs()
        .ok()
        .and_then(|addrs| {
            addrs
                .into_iter()
                .find(|iface| !iface.is_loopback() && matches!(iface.addr, IfAddr::V4(_)))
                .and_then(|iface| match iface.addr {
                    IfAddr::V4(addr) => Some(addr.ip.to_string()),
                    _ => None,
                })
        })
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_units_agree() {
        let secs = current_unix_secs();
        let millis = current_unix_millis();
        assert!(millis / 1000 >= secs);
        assert!(millis / 1000 - secs <= 1);
    }

    #[test]
    fn test_expire_at_secs() {
        let now = current_unix_secs();
        let expire = expire_at_secs(Duration::from_secs(300));
        assert!(expire >= now + 299 && expire <= now + 301);
    }

    #[test]
    fn test_sub_second_ttl_expires_after_current_second() {
        for _ in 0..50 {
            let now = current_unix_secs();
            assert!(expire_at_secs(Duration::from_millis(1)) > now);
        }
    }

    #[test]
    fn test_local_ip() {
        let ip = local_ip();
        assert!(!ip.is_empty());
        assert!(ip.parse::<std::net::Ipv4Addr>().is_ok());
    }
}
