//! Request parameters for batched generation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

/// Maximum tokens to generate per candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawMaxTokens")]
pub enum MaxTokens {
    /// Fixed limit
    Fixed(u32),
    /// Everything the model's context leaves after the prompt; single prompt only
    Auto,
}

impl Default for MaxTokens {
    fn default() -> Self {
        MaxTokens::Fixed(256)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMaxTokens {
    Int(i64),
    Text(String),
}

impl TryFrom<RawMaxTokens> for MaxTokens {
    type Error = String;

    fn try_from(raw: RawMaxTokens) -> Result<Self, Self::Error> {
        match raw {
            RawMaxTokens::Int(-1) => Ok(MaxTokens::Auto),
            RawMaxTokens::Int(n) => u32::try_from(n)
                .ok()
                .filter(|n| *n > 0)
                .map(MaxTokens::Fixed)
                .ok_or_else(|| format!("max_tokens must be positive, \"auto\" or -1, got {}", n)),
            RawMaxTokens::Text(s) => s.parse(),
        }
    }
}

impl FromStr for MaxTokens {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" | "-1" => Ok(MaxTokens::Auto),
            other => other
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .map(MaxTokens::Fixed)
                .ok_or_else(|| format!("invalid max_tokens '{}': expected a positive integer or \"auto\"", other)),
        }
    }
}

impl fmt::Display for MaxTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxTokens::Fixed(n) => write!(f, "{}", n),
            MaxTokens::Auto => write!(f, "auto"),
        }
    }
}

impl Serialize for MaxTokens {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MaxTokens::Fixed(n) => serializer.serialize_u32(*n),
            MaxTokens::Auto => serializer.serialize_str("auto"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_max_tokens() {
        assert_eq!("auto".parse::<MaxTokens>().unwrap(), MaxTokens::Auto);
        assert_eq!("-1".parse::<MaxTokens>().unwrap(), MaxTokens::Auto);
        assert_eq!("64".parse::<MaxTokens>().unwrap(), MaxTokens::Fixed(64));
        assert!("0".parse::<MaxTokens>().is_err());
        assert!("lots".parse::<MaxTokens>().is_err());
    }

    #[test]
    fn test_deserialize_max_tokens() {
        let auto: MaxTokens = serde_json::from_value(json!("auto")).unwrap();
        assert_eq!(auto, MaxTokens::Auto);

        let legacy: MaxTokens = serde_json::from_value(json!(-1)).unwrap();
        assert_eq!(legacy, MaxTokens::Auto);

        let fixed: MaxTokens = serde_json::from_value(json!(128)).unwrap();
        assert_eq!(fixed, MaxTokens::Fixed(128));

        assert!(serde_json::from_value::<MaxTokens>(json!(-5)).is_err());
    }

    #[test]
    fn test_serialize_max_tokens() {
        assert_eq!(serde_json::to_value(MaxTokens::Auto).unwrap(), json!("auto"));
        assert_eq!(serde_json::to_value(MaxTokens::Fixed(9)).unwrap(), json!(9));
    }
}
