//! Accelerator visibility for CUDA builds.

/// Variable read by the CUDA runtime to select visible devices
pub const VISIBLE_DEVICES_VAR: &str = "CUDA_VISIBLE_DEVICES";

/// Value to export for `index`, or `None` when the user already set one.
pub fn visible_devices_value(current: Option<&str>, index: usize) -> Option<String> {
    match current {
        Some(value) if !value.trim().is_empty() => None,
        _ => Some(index.to_string()),
    }
}

/// Exports `CUDA_VISIBLE_DEVICES=<index>` unless it is already set.
///
/// Must run before the first device is created. Returns the exported value.
pub fn export_visible_devices(index: usize) -> Option<String> {
    let current = std::env::var(VISIBLE_DEVICES_VAR).ok();
    match visible_devices_value(current.as_deref(), index) {
        Some(value) => {
            std::env::set_var(VISIBLE_DEVICES_VAR, &value);
            tracing::info!("{VISIBLE_DEVICES_VAR}={value}");
            Some(value)
        }
        None => {
            tracing::debug!(
                "{VISIBLE_DEVICES_VAR} already set to {}, leaving it alone",
                current.unwrap_or_default()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exports_when_unset() {
        assert_eq!(visible_devices_value(None, 0), Some("0".to_string()));
        assert_eq!(visible_devices_value(Some(""), 2), Some("2".to_string()));
    }

    #[test]
    fn test_respects_existing_value() {
        assert_eq!(visible_devices_value(Some("1,3"), 0), None);
    }
}
