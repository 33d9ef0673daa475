use std::fmt;
use url::Url;

/// Substrings of a lowercased user agent that mark scripted clients.
pub const AUTOMATION_MARKERS: &[&str] = &[
    "bot", "crawler", "spider", "scraper", "wget", "curl", "python", "java", "go-http", "node",
    "axios", "fetch", "headless", "phantom", "selenium",
];

/// The request headers the heuristic looks at.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: String,
    pub accept: Option<String>,
    pub accept_language: Option<String>,
    pub referer: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotReason {
    AutomationMarker(&'static str),
    MissingBrowserHeaders,
    ForeignReferer(String),
}

impl fmt::Display for BotReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotReason::AutomationMarker(marker) => write!(f, "automation marker in user agent: {}", marker),
            BotReason::MissingBrowserHeaders => f.write_str("missing accept or accept-language header"),
            BotReason::ForeignReferer(referer) => write!(f, "referer from another host: {}", referer),
        }
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

/// `host[:port]` of a referer, lowercased. Unparseable referers yield None.
fn referer_authority(referer: &str) -> Option<String> {
    let url = Url::parse(referer).ok()?;
    let host = url.host_str()?.to_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Returns the first reason the request looks automated, checking the user
/// agent, then the browser headers, then the referer.
pub fn detect_bot(client: &ClientInfo) -> Option<BotReason> {
    let user_agent = client.user_agent.to_lowercase();
    if let Some(marker) = AUTOMATION_MARKERS.iter().find(|m| user_agent.contains(*m)) {
        return Some(BotReason::AutomationMarker(marker));
    }

    if !present(&client.accept) || !present(&client.accept_language) {
        return Some(BotReason::MissingBrowserHeaders);
    }

    // a referer is only judged when we know which host served the request
    if let (Some(referer), Some(host)) = (client.referer.as_deref(), client.host.as_deref()) {
        let host = host.trim().to_lowercase();
        if !referer.trim().is_empty() && referer_authority(referer).as_deref() != Some(host.as_str()) {
            return Some(BotReason::ForeignReferer(referer.to_string()));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

    fn browser() -> ClientInfo {
        ClientInfo {
            user_agent: CHROME.to_string(),
            accept: Some("image/avif,image/webp,*/*".to_string()),
            accept_language: Some("zh-CN,zh;q=0.9".to_string()),
            referer: Some("https://labubu.hot/wallpapers".to_string()),
            host: Some("labubu.hot".to_string()),
        }
    }

    #[test]
    fn test_browser_passes() {
        assert_eq!(detect_bot(&browser()), None);
        let no_referer = ClientInfo { referer: None, ..browser() };
        assert_eq!(detect_bot(&no_referer), None);
    }

    #[test]
    fn test_automation_markers() {
        for agent in ["curl/8.4.0", "python-requests/2.31", "Mozilla/5.0 HeadlessChrome/120", "Googlebot/2.1"] {
            let client = ClientInfo { user_agent: agent.to_string(), ..browser() };
            assert!(
                matches!(detect_bot(&client), Some(BotReason::AutomationMarker(_))),
                "{} should be flagged",
                agent
            );
        }
    }

    #[test]
    fn test_missing_headers() {
        let client = ClientInfo { accept_language: None, ..browser() };
        assert_eq!(detect_bot(&client), Some(BotReason::MissingBrowserHeaders));
        let client = ClientInfo { accept: Some("  ".to_string()), ..browser() };
        assert_eq!(detect_bot(&client), Some(BotReason::MissingBrowserHeaders));
    }

    #[test]
    fn test_referer_must_match_host() {
        let client = ClientInfo {
            referer: Some("https://evil.example/labubu.hot".to_string()),
            ..browser()
        };
        assert!(matches!(detect_bot(&client), Some(BotReason::ForeignReferer(_))));

        let client = ClientInfo {
            referer: Some("http://localhost:3000/page".to_string()),
            host: Some("localhost:3000".to_string()),
            ..browser()
        };
        assert_eq!(detect_bot(&client), None);
    }
}
