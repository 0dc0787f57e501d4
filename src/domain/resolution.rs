use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target sizes a source can be transcoded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Resolution {
    /// 1280x720
    High,
    /// 854x480
    Medium,
    /// 640x360
    Low,
}

impl Resolution {
    pub const ALL: [Resolution; 3] = [Resolution::High, Resolution::Medium, Resolution::Low];

    pub fn width(self) -> u32 {
        match self {
            Resolution::High => 1280,
            Resolution::Medium => 854,
            Resolution::Low => 640,
        }
    }

    pub fn height(self) -> u32 {
        match self {
            Resolution::High => 720,
            Resolution::Medium => 480,
            Resolution::Low => 360,
        }
    }

    /// Canonical `WxH` label, as passed to the encoder.
    pub fn label(self) -> String {
        format!("{}x{}", self.width(), self.height())
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width(), self.height())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownResolution(pub String);

impl fmt::Display for UnknownResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported resolution {:?}", self.0)
    }
}

impl std::error::Error for UnknownResolution {}

impl FromStr for Resolution {
    type Err = UnknownResolution;

    /// Accepts the `WxH` labels and the `720p`-style aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1280x720" | "720p" => Ok(Resolution::High),
            "854x480" | "480p" => Ok(Resolution::Medium),
            "640x360" | "360p" => Ok(Resolution::Low),
            other => Err(UnknownResolution(other.to_string())),
        }
    }
}

impl TryFrom<String> for Resolution {
    type Error = UnknownResolution;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.label()
    }
}

/// Parses every label, failing on the first one outside the allow-list.
/// Duplicates collapse while keeping the first-seen order.
pub fn parse_all<S: AsRef<str>>(labels: &[S]) -> Result<Vec<Resolution>, UnknownResolution> {
    let mut parsed: Vec<Resolution> = Vec::with_capacity(labels.len());
    for label in labels {
        let resolution: Resolution = label.as_ref().parse()?;
        if !parsed.contains(&resolution) {
            parsed.push(resolution);
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labels_and_aliases() {
        assert_eq!("1280x720".parse::<Resolution>().unwrap(), Resolution::High);
        assert_eq!("480p".parse::<Resolution>().unwrap(), Resolution::Medium);
        assert_eq!(" 640x360 ".parse::<Resolution>().unwrap(), Resolution::Low);
    }

    #[test]
    fn rejects_unknown_label() {
        let err = "1920x1080".parse::<Resolution>().unwrap_err();
        assert_eq!(err, UnknownResolution("1920x1080".to_string()));
    }

    #[test]
    fn parse_all_fails_on_any_unknown() {
        assert!(parse_all(&["720p", "1080p"]).is_err());
    }

    #[test]
    fn parse_all_deduplicates() {
        let parsed = parse_all(&["720p", "1280x720", "360p"]).unwrap();
        assert_eq!(parsed, vec![Resolution::High, Resolution::Low]);
    }

    #[test]
    fn serializes_as_label() {
        let json = serde_json::to_string(&Resolution::Medium).unwrap();
        assert_eq!(json, "\"854x480\"");
        let back: Resolution = serde_json::from_str("\"360p\"").unwrap();
        assert_eq!(back, Resolution::Low);
    }
}
