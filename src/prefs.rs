//! Account preferences used to pick a default "to" filter.
//!
//! Precedence, first non-empty wins: local directory override
//! (`./.mailsift.toml`) → session (`$MAILSIFT_ACCOUNT`) → global config
//! (`[accounts] default`) → first configured address.

use std::path::Path;

use crate::config::{self, Config};

/// Session override environment variable.
pub const SESSION_ENV: &str = "MAILSIFT_ACCOUNT";

/// Per-directory override file name.
pub const LOCAL_FILE: &str = ".mailsift.toml";

/// Answers "which address is mine?" for the query parser.
pub trait PreferenceResolver {
    fn default_to_address(&self) -> Option<String>;
}

/// Preference layers resolved in fixed order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayeredPreferences {
    pub local: Option<String>,
    pub session: Option<String>,
    pub global: Option<String>,
    pub available: Vec<String>,
}

impl LayeredPreferences {
    /// Gather the layers from `dir/.mailsift.toml`, the environment and `config`.
    pub fn discover(config: &Config, dir: &Path) -> Self {
        let local = config::load_from(&dir.join(LOCAL_FILE)).and_then(|c| c.accounts.default);
        let session = std::env::var(SESSION_ENV).ok();
        Self {
            local,
            session,
            global: config.accounts.default.clone(),
            available: config.accounts.addresses.clone(),
        }
    }

    /// Name of the layer that supplied the address, for diagnostics.
    pub fn source(&self) -> Option<&'static str> {
        if usable(&self.local).is_some() {
            Some("local")
        } else if usable(&self.session).is_some() {
            Some("session")
        } else if usable(&self.global).is_some() {
            Some("global")
        } else if self.available.iter().any(|a| !a.trim().is_empty()) {
            Some("first available")
        } else {
            None
        }
    }
}

fn usable(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl PreferenceResolver for LayeredPreferences {
    fn default_to_address(&self) -> Option<String> {
        usable(&self.local)
            .or_else(|| usable(&self.session))
            .or_else(|| usable(&self.global))
            .or_else(|| {
                self.available
                    .iter()
                    .map(|a| a.trim())
                    .find(|a| !a.is_empty())
            })
            .map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers(local: &str, session: &str, global: &str, available: &[&str]) -> LayeredPreferences {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        LayeredPreferences {
            local: opt(local),
            session: opt(session),
            global: opt(global),
            available: available.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_precedence() {
        let p = layers("local@x.com", "session@x.com", "global@x.com", &["first@x.com"]);
        assert_eq!(p.default_to_address().as_deref(), Some("local@x.com"));
        assert_eq!(p.source(), Some("local"));

        let p = layers("", "session@x.com", "global@x.com", &["first@x.com"]);
        assert_eq!(p.default_to_address().as_deref(), Some("session@x.com"));

        let p = layers("", "", "global@x.com", &["first@x.com"]);
        assert_eq!(p.default_to_address().as_deref(), Some("global@x.com"));

        let p = layers("", "  ", "", &["", "first@x.com"]);
        assert_eq!(p.default_to_address().as_deref(), Some("first@x.com"));
        assert_eq!(p.source(), Some("first available"));
    }

    #[test]
    fn test_nothing_configured() {
        let p = LayeredPreferences::default();
        assert_eq!(p.default_to_address(), None);
        assert_eq!(p.source(), None);
    }

    #[test]
    fn test_local_file_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(LOCAL_FILE),
            "[accounts]\ndefault = \"project@work.com\"\n",
        )
        .unwrap();
        let mut config = Config::default();
        config.accounts.default = Some("me@home.net".to_string());

        let p = LayeredPreferences::discover(&config, dir.path());
        assert_eq!(p.local.as_deref(), Some("project@work.com"));
        assert_eq!(p.global.as_deref(), Some("me@home.net"));
        assert_eq!(p.default_to_address().as_deref(), Some("project@work.com"));
    }
}
