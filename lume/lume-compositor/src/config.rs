//! Compositor configuration: diagnostics and validation strictness.

/// Number of UAV slots tracked by barrier emulation.
pub const DEFAULT_UAV_SLOTS: usize = 64;

#[derive(Clone, Debug)]
pub struct CompositorConfig {
    /// Warn when a shadow node recalculates twice for the same camera in one frame.
    pub debug_shadow_node_checks: bool,
    /// Mark a workspace invalid when one shadow node is used with both Recalculate and
    /// FirstOnly passes. When false the mix is only logged.
    pub reject_mixed_shadow_policies: bool,
    pub max_uav_slots: usize,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            debug_shadow_node_checks: cfg!(debug_assertions),
            reject_mixed_shadow_policies: false,
            max_uav_slots: DEFAULT_UAV_SLOTS,
        }
    }
}

impl CompositorConfig {
    /// Defaults overridden by `LUME_COMPOSITOR_STRICT_SHADOWS=1` and
    /// `LUME_COMPOSITOR_SHADOW_CHECKS=0|1`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| var(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"));
        let mut config = Self::default();
        if let Some(strict) = flag("LUME_COMPOSITOR_STRICT_SHADOWS") {
            config.reject_mixed_shadow_policies = strict;
        }
        if let Some(checks) = flag("LUME_COMPOSITOR_SHADOW_CHECKS") {
            config.debug_shadow_node_checks = checks;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides() {
        let config = CompositorConfig::from_vars(|key| match key {
            "LUME_COMPOSITOR_STRICT_SHADOWS" => Some("1".to_string()),
            "LUME_COMPOSITOR_SHADOW_CHECKS" => Some("0".to_string()),
            _ => None,
        });
        assert!(config.reject_mixed_shadow_policies);
        assert!(!config.debug_shadow_node_checks);
        assert_eq!(config.max_uav_slots, DEFAULT_UAV_SLOTS);

        let untouched = CompositorConfig::from_vars(|_| None);
        assert!(!untouched.reject_mixed_shadow_policies);
        assert_eq!(untouched.debug_shadow_node_checks, cfg!(debug_assertions));
    }
}
