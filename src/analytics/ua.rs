//! User-agent classification into {device class, OS, browser}.

use woothee::parser::Parser;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceType {
    Mobile,
    Tablet,
    #[default]
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Desktop => "desktop",
        }
    }
}

/// Best-effort classification of a raw user-agent string.
/// OS and browser are opaque "{family} {version}" strings.
#[derive(Debug, Clone, Default)]
pub struct UaInfo {
    pub device: DeviceType,
    pub os: Option<String>,
    pub browser: Option<String>,
}

/// Classify a user-agent header value. Never fails: an absent or
/// unparseable string yields the desktop default with no OS/browser.
pub fn classify_user_agent(ua: Option<&str>) -> UaInfo {
    let Some(ua) = ua.filter(|s| !s.is_empty()) else {
        return UaInfo::default();
    };

    let parsed = Parser::new().parse(ua);

    // woothee has no tablet category, so tablets are spotted by substring
    // before falling back to its smartphone/mobilephone categories.
    let lower = ua.to_lowercase();
    let device = if lower.contains("ipad") || lower.contains("tablet") {
        DeviceType::Tablet
    } else if matches!(
        parsed.as_ref().map(|r| r.category),
        Some("smartphone") | Some("mobilephone")
    ) {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    };

    let os = parsed.as_ref().and_then(|r| {
        if r.os == "UNKNOWN" {
            None
        } else if r.os_version.is_empty() || r.os_version == "UNKNOWN" {
            Some(r.os.to_string())
        } else {
            Some(format!("{} {}", r.os, r.os_version))
        }
    });

    let browser = parsed.as_ref().and_then(|r| {
        if r.name == "UNKNOWN" {
            None
        } else if r.version.is_empty() || r.version == "UNKNOWN" {
            Some(r.name.to_string())
        } else {
            Some(format!("{} {}", r.name, r.version))
        }
    });

    UaInfo {
        device,
        os,
        browser,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";
    const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU OS 15_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.4 Mobile/15E148 Safari/604.1";
    const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    #[test]
    fn test_absent_user_agent_defaults_to_desktop() {
        let info = classify_user_agent(None);
        assert_eq!(info.device, DeviceType::Desktop);
        assert!(info.os.is_none());
        assert!(info.browser.is_none());
    }

    #[test]
    fn test_empty_user_agent_defaults_to_desktop() {
        let info = classify_user_agent(Some(""));
        assert_eq!(info.device, DeviceType::Desktop);
        assert!(info.os.is_none());
        assert!(info.browser.is_none());
    }

    #[test]
    fn test_unparseable_user_agent_is_desktop_with_no_details() {
        let info = classify_user_agent(Some("definitely not a browser"));
        assert_eq!(info.device, DeviceType::Desktop);
        assert!(info.os.is_none());
    }

    #[test]
    fn test_iphone_is_mobile() {
        let info = classify_user_agent(Some(IPHONE_UA));
        assert_eq!(info.device, DeviceType::Mobile);
        assert!(info.browser.is_some());
    }

    #[test]
    fn test_ipad_is_tablet() {
        let info = classify_user_agent(Some(IPAD_UA));
        assert_eq!(info.device, DeviceType::Tablet);
    }

    #[test]
    fn test_desktop_chrome() {
        let info = classify_user_agent(Some(CHROME_UA));
        assert_eq!(info.device, DeviceType::Desktop);
        let browser = info.browser.expect("Chrome should be recognized");
        assert!(browser.starts_with("Chrome"), "got: {browser}");
        let os = info.os.expect("Windows should be recognized");
        assert!(os.contains("Windows"), "got: {os}");
    }

    #[test]
    fn test_device_type_strings() {
        assert_eq!(DeviceType::Mobile.as_str(), "mobile");
        assert_eq!(DeviceType::Tablet.as_str(), "tablet");
        assert_eq!(DeviceType::Desktop.as_str(), "desktop");
    }
}
