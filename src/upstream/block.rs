//! Block/challenge page detection.
//!
//! Anti-bot fronts answer with an HTML interstitial, often with a 200 or 503
//! status. A response counts as blocked when it is HTML (or non-JSON for
//! groups that expect JSON) and contains one of the configured markers.

/// Matches response bodies against lowercase marker strings.
#[derive(Debug, Clone)]
pub struct BlockDetector {
    markers: Vec<String>,
    expect_json: bool,
}

/// Only the head of the body is scanned; challenge pages put markers early.
const SCAN_LIMIT: usize = 64 * 1024;

impl BlockDetector {
    pub fn new(markers: &[String], expect_json: bool) -> Self {
        Self {
            markers: markers
                .iter()
                .map(|m| m.trim().to_ascii_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
            expect_json,
        }
    }

    /// Return the first marker found, if the response looks like a block page.
    pub fn detect(&self, content_type: Option<&str>, body: &[u8]) -> Option<&str> {
        let content_type = content_type.unwrap_or("").to_ascii_lowercase();
        let is_html = content_type.contains("text/html");
        let is_json = content_type.contains("json");

        let suspicious = is_html || (self.expect_json && !is_json);
        if !suspicious {
            return None;
        }

        let head = &body[..body.len().min(SCAN_LIMIT)];
        let text = String::from_utf8_lossy(head).to_ascii_lowercase();

        self.markers
            .iter()
            .find(|m| text.contains(m.as_str()))
            .map(|m| m.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::default_block_markers;

    fn detector(expect_json: bool) -> BlockDetector {
        BlockDetector::new(&default_block_markers(), expect_json)
    }

    #[test]
    fn test_cloudflare_interstitial() {
        let body = b"<html><title>Just a moment...</title><div id=\"challenge-platform\"></div></html>";
        assert_eq!(
            detector(false).detect(Some("text/html; charset=UTF-8"), body),
            Some("challenge-platform")
        );
    }

    #[test]
    fn test_json_is_never_blocked() {
        let body = br#"{"title":"captcha: the anime"}"#;
        assert_eq!(detector(true).detect(Some("application/json"), body), None);
    }

    #[test]
    fn test_plain_html_without_marker_passes() {
        assert_eq!(detector(false).detect(Some("text/html"), b"<html>ok</html>"), None);
    }

    #[test]
    fn test_expect_json_flags_text_with_marker() {
        let body = b"DDoS-Guard checking your browser";
        assert_eq!(detector(true).detect(Some("text/plain"), body), Some("ddos-guard"));
        assert_eq!(detector(false).detect(Some("text/plain"), body), None);
    }
}
