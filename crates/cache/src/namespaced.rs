//! Namespaced helpers over [`Cache`].
//!
//! Each namespace prefixes its keys and applies its own default TTL when the
//! caller does not pass one.

use std::time::Duration;

use crate::cache::Cache;

pub const TEMPLATE_PREFIX: &str = "template:";
pub const USER_PREFS_PREFIX: &str = "user_prefs:";
pub const PROVIDER_CONFIG_PREFIX: &str = "provider_config:";

pub const TEMPLATE_TTL: Duration = Duration::from_secs(30 * 60);
pub const USER_PREFS_TTL: Duration = Duration::from_secs(60 * 60);
pub const PROVIDER_CONFIG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

impl<V: Clone> Cache<V> {
    pub fn cache_template(&self, template: &str, data: V, ttl: Option<Duration>) {
        self.set_with_ttl(
            format!("{TEMPLATE_PREFIX}{template}"),
            data,
            ttl.unwrap_or(TEMPLATE_TTL),
        );
    }

    pub fn template(&self, template: &str) -> Option<V> {
        self.get(&format!("{TEMPLATE_PREFIX}{template}"))
    }

    pub fn cache_user_preferences(&self, user_id: &str, preferences: V, ttl: Option<Duration>) {
        self.set_with_ttl(
            format!("{USER_PREFS_PREFIX}{user_id}"),
            preferences,
            ttl.unwrap_or(USER_PREFS_TTL),
        );
    }

    pub fn user_preferences(&self, user_id: &str) -> Option<V> {
        self.get(&format!("{USER_PREFS_PREFIX}{user_id}"))
    }

    pub fn cache_provider_config(&self, provider: &str, config: V, ttl: Option<Duration>) {
        self.set_with_ttl(
            format!("{PROVIDER_CONFIG_PREFIX}{provider}"),
            config,
            ttl.unwrap_or(PROVIDER_CONFIG_TTL),
        );
    }

    pub fn provider_config(&self, provider: &str) -> Option<V> {
        self.get(&format!("{PROVIDER_CONFIG_PREFIX}{provider}"))
    }
}
