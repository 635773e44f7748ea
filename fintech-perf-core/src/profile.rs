use crate::ConfigError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Named load intensity tier.
///
/// A profile decides both the shape of the injected traffic (see
/// [`crate::load_profile::user_injection`]) and how strict the SLA assertions are.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Smoke,
    Baseline,
    Stress,
}

impl Profile {
    pub const ALL: [Profile; 3] = [Profile::Smoke, Profile::Baseline, Profile::Stress];

    /// Parse a profile name, ignoring case and surrounding whitespace.
    ///
    /// A blank value selects [`Profile::Smoke`]. Anything else that is not a known
    /// profile is a configuration error.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(Profile::Smoke);
        }

        match value.to_ascii_lowercase().as_str() {
            "smoke" => Ok(Profile::Smoke),
            "baseline" => Ok(Profile::Baseline),
            "stress" => Ok(Profile::Stress),
            _ => Err(ConfigError::UnsupportedProfile(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Smoke => "smoke",
            Profile::Baseline => "baseline",
            Profile::Stress => "stress",
        }
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(Profile::parse("SMOKE"), Ok(Profile::Smoke));
        assert_eq!(Profile::parse(" Baseline "), Ok(Profile::Baseline));
        assert_eq!("stress".parse::<Profile>(), Ok(Profile::Stress));
    }

    #[test]
    fn blank_defaults_to_smoke() {
        assert_eq!(Profile::parse(""), Ok(Profile::Smoke));
        assert_eq!(Profile::parse("   \t"), Ok(Profile::Smoke));
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let err = Profile::parse("soak").unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedProfile("soak".to_string()));
        assert!(err.to_string().contains("smoke|baseline|stress"));
    }

    #[test]
    fn display_round_trips() {
        for profile in Profile::ALL {
            assert_eq!(Profile::parse(&profile.to_string()), Ok(profile));
        }
    }
}
