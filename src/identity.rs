// Secrets Engine — Machine identity
//
// Composes `hostname:mac:username` as the machine-binding half of the KDF
// password. Stable across process invocations on the same host; if any
// component changes, previously stored entries become unreadable.

/// Substituted when no usable network interface MAC is available.
pub const NO_MAC_FALLBACK: &str = "no-mac-available";

/// The identity string fed into master-key derivation.
pub fn machine_identity() -> String {
    format!("{}:{}:{}", host_name(), primary_mac(), whoami::username())
}

fn host_name() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::debug!("hostname lookup failed: {e}");
            "unknown-host".to_string()
        }
    }
}

/// MAC of the first non-loopback interface, skipping all-zero addresses.
fn primary_mac() -> String {
    match mac_address::get_mac_address() {
        Ok(Some(mac)) if mac.bytes() != [0u8; 6] => mac.to_string(),
        _ => NO_MAC_FALLBACK.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_stable_within_a_process() {
        assert_eq!(machine_identity(), machine_identity());
    }

    #[test]
    fn test_identity_has_three_components() {
        let identity = machine_identity();
        // hostname : mac (itself colon-separated or the fallback) : username
        assert!(identity.split(':').count() >= 3, "unexpected shape: {identity}");
        assert!(!identity.starts_with(':'));
        assert!(!identity.ends_with(':'));
    }
}
