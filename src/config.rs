use std::path::Path;

use derive_builder::Builder;
use serde::Deserialize;

use crate::error::ReaderError;

/// Settings supplied by the host integration.
///
/// Every field has a default, so a config file only needs the keys it
/// changes.
///
/// ```rust
/// use tts_highlight::config::ReaderConfigBuilder;
///
/// let config = ReaderConfigBuilder::default()
///     .segment_breaking_tags(vec!["p".to_string(), "li".to_string()])
///     .word_class("word")
///     .build()?;
/// assert_eq!(config.marker_tag, "span");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Builder, Deserialize)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct ReaderConfig {
    /// Raw removal rule table, validated by
    /// [`RemoveRules::from_value`](crate::pipeline::RemoveRules::from_value).
    pub remove_tags: serde_json::Value,
    /// Tags whose boundaries always end a segment.
    pub segment_breaking_tags: Vec<String>,
    /// Characters the aligner treats as a plain space.
    pub whitespace_equivalents: Vec<char>,
    /// Element used to wrap highlighted text.
    pub marker_tag: String,
    pub sentence_class: String,
    pub word_class: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            remove_tags: serde_json::json!({
                "table": true,
                "sup": "reference",
                "div": ["toc", "thumb"],
                "script": true,
                "style": true,
            }),
            segment_breaking_tags: [
                "h1", "h2", "h3", "h4", "h5", "h6", "p", "br", "li", "dd", "dt", "blockquote",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            whitespace_equivalents: vec!['\u{a0}'],
            marker_tag: "span".to_string(),
            sentence_class: "highlight-sentence".to_string(),
            word_class: "highlight-word".to_string(),
        }
    }
}

/// Load a [`ReaderConfig`] from a JSON file.
pub fn load_config(path: &Path) -> Result<ReaderConfig, ReaderError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    log::info!("Loaded reader config from {}", path.display());
    Ok(config)
}

/// Parse a config from a JSON string. Missing fields take their defaults.
pub fn parse_config(json: &str) -> Result<ReaderConfig, ReaderError> {
    serde_json::from_str(json)
        .map_err(|e| ReaderError::Config(format!("Failed to parse JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::{parse_config, ReaderConfig, ReaderConfigBuilder};
    use crate::error::ReaderError;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = parse_config(r#"{"word_class": "w", "whitespace_equivalents": ["\u2007"]}"#)
            .expect("valid config");
        assert_eq!(config.word_class, "w");
        assert_eq!(config.whitespace_equivalents, vec!['\u{2007}']);
        assert_eq!(config.marker_tag, ReaderConfig::default().marker_tag);
        assert!(config.segment_breaking_tags.contains(&"p".to_string()));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            parse_config("{\"marker_tag\": 3}"),
            Err(ReaderError::Config(_))
        ));
    }

    #[test]
    fn builder_starts_from_defaults() {
        let config = ReaderConfigBuilder::default()
            .sentence_class("s")
            .build()
            .expect("all fields default");
        assert_eq!(config.sentence_class, "s");
        assert_eq!(config.remove_tags, ReaderConfig::default().remove_tags);
    }
}
