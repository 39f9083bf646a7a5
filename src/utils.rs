use sha2::{Digest, Sha256};

/// Creates a truncated, salted hash of an identifier for safe logging.
///
/// # Arguments
/// * `id` - The identifier to hash (e.g., an API key).
/// * `salt` - A salt value from the application's configuration.
///
/// # Returns
/// A short, hexadecimal string representing the salted hash.
pub fn log_safe_id(id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(id.as_bytes());
    let hash = hasher.finalize();

    // Take first 4 bytes and format each as hex
    hash[..4]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

/// Milliseconds rounded to two decimals
pub fn elapsed_ms(elapsed: std::time::Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_log_safe_id_is_stable_and_salted() {
        let a = log_safe_id("secret-token", "salt-a");
        assert_eq!(a, log_safe_id("secret-token", "salt-a"));
        assert_ne!(a, log_safe_id("secret-token", "salt-b"));
        assert_eq!(a.len(), 8);
        assert!(!a.contains("secret"));
    }

    #[test]
    fn test_elapsed_ms_rounds_to_two_decimals() {
        assert_eq!(elapsed_ms(Duration::from_micros(12_346)), 12.35);
        assert_eq!(elapsed_ms(Duration::from_millis(3)), 3.0);
        assert_eq!(elapsed_ms(Duration::ZERO), 0.0);
    }
}
