use serde::{Deserialize, Serialize};
use std::error::Error;

/// Behavioral mode of the configured entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    Friendly,
    Aggressive,
    Sarcastic,
    Logical,
}

impl Personality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Personality::Friendly => "friendly",
            Personality::Aggressive => "aggressive",
            Personality::Sarcastic => "sarcastic",
            Personality::Logical => "logical",
        }
    }

    pub fn from_str(s: &str) -> Option<Personality> {
        match s.to_lowercase().as_str() {
            "friendly" => Some(Personality::Friendly),
            "aggressive" => Some(Personality::Aggressive),
            "sarcastic" => Some(Personality::Sarcastic),
            "logical" => Some(Personality::Logical),
            _ => None,
        }
    }

    /// Unknown or missing personality strings fall back to Friendly.
    pub fn parse_or_default(s: &str) -> Personality {
        Personality::from_str(s).unwrap_or(Personality::Friendly)
    }
}

/// The user-named, personality-configured entity. Created once by the setup
/// flow and read-only for the lifetime of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    pub personality: Personality,
}

impl EntityConfig {
    pub fn new(name: &str, personality: Personality) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let name = name.trim();
        if name.is_empty() {
            return Err("entity name must not be empty".into());
        }
        Ok(Self {
            name: name.to_string(),
            personality,
        })
    }
}

/// Credentials for the remote collaborators, read from the environment.
/// Placeholder values left over from setup templates count as absent.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub gemini_api_key: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: env_key("GEMINI_API_KEY", &["your_api_key_here"]),
            supabase_url: env_key("SUPABASE_URL", &["YOUR_SUPABASE_URL"])
                .filter(|url| is_valid_url(url)),
            supabase_anon_key: env_key("SUPABASE_ANON_KEY", &["YOUR_SUPABASE_ANON_KEY"]),
        }
    }

    /// Both halves of the remote task store configuration, or neither.
    pub fn supabase(&self) -> Option<(&str, &str)> {
        match (&self.supabase_url, &self.supabase_anon_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }
}

fn env_key(name: &str, placeholders: &[&str]) -> Option<String> {
    let value = std::env::var(name).ok()?;
    let value = value.trim().to_string();
    if value.is_empty() || placeholders.iter().any(|p| value.contains(p)) {
        return None;
    }
    Some(value)
}

fn is_valid_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
