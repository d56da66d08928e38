//! Navigation guard settings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::SettingsError;

/// Which page navigations the guard lets through.
///
/// Fixed for the lifetime of a channel. Serialized as a string; the legacy
/// boolean form (`true` = allow everything, `false` = exact URL only) is
/// accepted on input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NavigationPolicy {
    /// Every navigation is allowed.
    AllowAll,
    /// Only destinations sharing the opening URL's origin.
    #[default]
    SameOrigin,
    /// Only the opening URL itself.
    ExactUrl,
}

impl NavigationPolicy {
    /// Canonical string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllowAll => "allow-all",
            Self::SameOrigin => "same-origin",
            Self::ExactUrl => "exact-url",
        }
    }
}

impl fmt::Display for NavigationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NavigationPolicy {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "allow-all" | "true" => Ok(Self::AllowAll),
            "same-origin" => Ok(Self::SameOrigin),
            "exact-url" | "false" => Ok(Self::ExactUrl),
            other => Err(SettingsError::InvalidValue {
                field: "navigation.policy".into(),
                value: other.to_string(),
            }),
        }
    }
}

impl Serialize for NavigationPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NavigationPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Ok(Self::AllowAll),
            Raw::Flag(false) => Ok(Self::ExactUrl),
            Raw::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Navigation guard settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationSettings {
    /// Policy applied to every scheduled or committed navigation.
    pub policy: NavigationPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_serializes_as_string() {
        let json = serde_json::to_value(NavigationPolicy::ExactUrl).unwrap();
        assert_eq!(json, "exact-url");
    }

    #[test]
    fn policy_accepts_legacy_booleans() {
        let allow: NavigationPolicy = serde_json::from_str("true").unwrap();
        let exact: NavigationPolicy = serde_json::from_str("false").unwrap();
        assert_eq!(allow, NavigationPolicy::AllowAll);
        assert_eq!(exact, NavigationPolicy::ExactUrl);
    }

    #[test]
    fn policy_rejects_unknown_name() {
        let err = serde_json::from_str::<NavigationPolicy>("\"anywhere\"").unwrap_err();
        assert!(err.to_string().contains("navigation.policy"));
    }

    #[test]
    fn policy_display_matches_from_str() {
        for p in [
            NavigationPolicy::AllowAll,
            NavigationPolicy::SameOrigin,
            NavigationPolicy::ExactUrl,
        ] {
            assert_eq!(p.to_string().parse::<NavigationPolicy>().unwrap(), p);
        }
    }
}
