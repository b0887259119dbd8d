use regex::RegexBuilder;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::services::store::{self, KeyValueStore, StoreError};

/// Store key holding the user-facing pipeline settings.
pub const SETTINGS_KEY: &str = "settings";

/// Pipeline options maintained by the options screen and read on every run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Global switch; a disabled pipeline rejects every image.
    pub enabled: bool,

    /// Destination directory relative to the sink root.
    pub download_path: String,

    /// Host patterns where the pipeline is offered (`*` matches any run of characters).
    pub enabled_sites: Vec<String>,

    /// Whether images go through the remote compression service.
    pub compression_enabled: bool,

    /// Compression service API key.
    pub api_key: String,

    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            download_path: String::new(),
            enabled_sites: vec!["*".to_string()],
            compression_enabled: true,
            api_key: String::new(),
            target_width: None,
            target_height: None,
        }
    }
}

impl PipelineSettings {
    /// Read settings from the store, falling back to defaults when none are saved.
    pub async fn load(store: &dyn KeyValueStore) -> Result<Self, StoreError> {
        let settings: Option<Self> = store::load_json(store, SETTINGS_KEY).await?;
        Ok(settings.unwrap_or_default())
    }

    pub async fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        store::save_json(store, SETTINGS_KEY, self).await
    }

    /// Configured target width; zero counts as unset.
    pub fn target_width(&self) -> Option<u32> {
        self.target_width.filter(|width| *width > 0)
    }

    /// Configured target height; zero counts as unset.
    pub fn target_height(&self) -> Option<u32> {
        self.target_height.filter(|height| *height > 0)
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Whether the page at `page_url` matches one of the enabled site patterns.
    pub fn is_site_enabled(&self, page_url: &str) -> bool {
        let Ok(url) = Url::parse(page_url) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        self.enabled_sites
            .iter()
            .any(|pattern| site_matches(pattern.trim(), &host))
    }
}

/// A site pattern matches when it covers the whole host (`*` standing for any
/// run of characters, case-insensitive) or occurs literally inside it.
fn site_matches(pattern: &str, host: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if host.contains(&pattern.to_ascii_lowercase()) {
        return true;
    }

    let anchored = format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"));
    match RegexBuilder::new(&anchored).case_insensitive(true).build() {
        Ok(regex) => regex.is_match(host),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "Ignoring invalid site pattern");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let settings: PipelineSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, PipelineSettings::default());
        assert!(settings.enabled);
        assert!(settings.compression_enabled);
        assert_eq!(settings.target_width(), None);
    }

    #[test]
    fn test_camel_case_fields() {
        let settings: PipelineSettings = serde_json::from_str(
            r#"{"enabled": false, "downloadPath": "pics", "apiKey": "k", "targetWidth": 800, "targetHeight": null}"#,
        )
        .unwrap();
        assert!(!settings.enabled);
        assert_eq!(settings.download_path, "pics");
        assert_eq!(settings.target_width(), Some(800));
        assert_eq!(settings.target_height(), None);
        assert!(settings.has_api_key());
    }

    #[test]
    fn test_zero_target_is_unset() {
        let settings = PipelineSettings {
            target_width: Some(0),
            target_height: Some(600),
            ..Default::default()
        };
        assert_eq!(settings.target_width(), None);
        assert_eq!(settings.target_height(), Some(600));
    }

    #[test]
    fn test_site_patterns() {
        let settings = PipelineSettings {
            enabled_sites: vec!["example.com".to_string(), "*.images.net".to_string()],
            ..Default::default()
        };
        assert!(settings.is_site_enabled("https://example.com/gallery"));
        assert!(settings.is_site_enabled("https://EXAMPLE.com/"));
        // A plain domain also covers its subdomains
        assert!(settings.is_site_enabled("https://www.example.com/"));
        assert!(settings.is_site_enabled("https://cdn.images.net/a.png"));
        assert!(!settings.is_site_enabled("https://images.net.evil.org/"));
        assert!(!settings.is_site_enabled("https://other.org/"));
        assert!(!settings.is_site_enabled("not a url"));
    }

    #[test]
    fn test_plain_domain_enables_subdomain() {
        let settings = PipelineSettings {
            enabled_sites: vec!["doubao.com".to_string()],
            ..Default::default()
        };
        assert!(settings.is_site_enabled("https://www.doubao.com/chat"));
        assert!(!settings.is_site_enabled("https://doubao.org/chat"));
    }

    #[test]
    fn test_default_sites_allow_everything() {
        let settings = PipelineSettings::default();
        assert!(settings.is_site_enabled("https://anything.example/page"));
    }

    #[test]
    fn test_site_matches() {
        assert!(site_matches("*", "a.b"));
        assert!(site_matches("a*c.com", "abbbc.com"));
        assert!(site_matches("*.Example.COM", "shop.example.com"));
        // Dots are literal, not regex wildcards
        assert!(!site_matches("a.c", "abc"));
        assert!(!site_matches("", "abc"));
        assert!(!site_matches("shop.*.org", "shop.example.com"));
    }
}
