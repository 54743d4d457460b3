//! Shared User-Agent string for catalog and media HTTP clients.

/// Browser-like User-Agent. Media hosts commonly reject unknown agents.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Default User-Agent for every request the tool makes.
///
/// `ANIDL_USER_AGENT` overrides it when set and non-empty.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    std::env::var("ANIDL_USER_AGENT")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| BROWSER_USER_AGENT.to_string())
}
