//! User preferences model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Accent color options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeColor {
    #[default]
    Blue,
    Green,
    Purple,
    Orange,
    Red,
    Teal,
}

impl ThemeColor {
    pub const ALL: [Self; 6] = [
        Self::Blue,
        Self::Green,
        Self::Purple,
        Self::Orange,
        Self::Red,
        Self::Teal,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Purple => "purple",
            Self::Orange => "orange",
            Self::Red => "red",
            Self::Teal => "teal",
        }
    }
}

impl fmt::Display for ThemeColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemeColor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|theme| theme.as_str() == wanted)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown theme: {s}")))
    }
}

const fn default_font_size() -> u32 {
    100
}

fn default_language() -> String {
    "fr".to_string()
}

/// Per-user preferences record.
///
/// Field names follow the camelCase shape stored in the remote document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Dark mode override; `None` follows the system setting
    #[serde(default)]
    pub dark_mode: Option<bool>,
    /// Accent color
    #[serde(default)]
    pub theme: ThemeColor,
    /// Font size as a percentage of the base size
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    /// Locale code
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            dark_mode: None,
            theme: ThemeColor::default(),
            font_size: default_font_size(),
            language: default_language(),
        }
    }
}

impl Preferences {
    /// Apply a single preference change. Returns whether anything changed.
    pub fn apply(&mut self, update: &PreferenceUpdate) -> bool {
        match update {
            PreferenceUpdate::DarkMode(value) => replace_if_changed(&mut self.dark_mode, *value),
            PreferenceUpdate::Theme(value) => replace_if_changed(&mut self.theme, *value),
            PreferenceUpdate::FontSize(value) => replace_if_changed(&mut self.font_size, *value),
            PreferenceUpdate::Language(value) => {
                replace_if_changed(&mut self.language, value.clone())
            }
        }
    }

    /// Remote document payload for this record.
    pub fn to_payload(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Merge a remote payload into a copy of these preferences.
    ///
    /// Known fields are applied one by one; a field holding an invalid value
    /// keeps the local value. Unknown fields (such as `updatedAt`) are ignored.
    #[must_use]
    pub fn merged_with_payload(&self, payload: &Map<String, Value>) -> Self {
        let mut merged = self.clone();
        for key in PreferenceKey::ALL {
            let Some(raw) = payload.get(key.as_str()) else {
                continue;
            };
            match PreferenceUpdate::from_json(key, raw) {
                Ok(update) => {
                    merged.apply(&update);
                }
                Err(error) => {
                    tracing::warn!("Ignoring remote preference {}: {}", key, error);
                }
            }
        }
        merged
    }

    /// JSON value of a single field, as stored under its legacy cache key.
    pub fn value_of(&self, key: PreferenceKey) -> Value {
        match key {
            PreferenceKey::DarkMode => self.dark_mode.map_or(Value::Null, Value::Bool),
            PreferenceKey::Theme => Value::String(self.theme.as_str().to_string()),
            PreferenceKey::FontSize => Value::from(self.font_size),
            PreferenceKey::Language => Value::String(self.language.clone()),
        }
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// Fixed preference keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceKey {
    DarkMode,
    Theme,
    FontSize,
    Language,
}

impl PreferenceKey {
    pub const ALL: [Self; 4] = [Self::DarkMode, Self::Theme, Self::FontSize, Self::Language];

    /// Field name in the preferences payload
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DarkMode => "darkMode",
            Self::Theme => "theme",
            Self::FontSize => "fontSize",
            Self::Language => "language",
        }
    }

    /// Standalone local cache key mirrored on every preference change.
    pub const fn legacy_cache_key(self) -> &'static str {
        match self {
            Self::DarkMode => "darkMode",
            Self::Theme => "colorTheme",
            Self::FontSize => "fontSize",
            Self::Language => "language",
        }
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreferenceKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "darkmode" => Ok(Self::DarkMode),
            "theme" | "colortheme" => Ok(Self::Theme),
            "fontsize" => Ok(Self::FontSize),
            "language" | "lang" => Ok(Self::Language),
            _ => Err(Error::InvalidInput(format!("Unknown preference: {s}"))),
        }
    }
}

/// A single preference-set operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferenceUpdate {
    DarkMode(Option<bool>),
    Theme(ThemeColor),
    FontSize(u32),
    Language(String),
}

impl PreferenceUpdate {
    pub const fn key(&self) -> PreferenceKey {
        match self {
            Self::DarkMode(_) => PreferenceKey::DarkMode,
            Self::Theme(_) => PreferenceKey::Theme,
            Self::FontSize(_) => PreferenceKey::FontSize,
            Self::Language(_) => PreferenceKey::Language,
        }
    }

    /// JSON value written to the legacy cache key and remote payload.
    pub fn to_json(&self) -> Value {
        match self {
            Self::DarkMode(value) => value.map_or(Value::Null, Value::Bool),
            Self::Theme(theme) => Value::String(theme.as_str().to_string()),
            Self::FontSize(size) => Value::from(*size),
            Self::Language(language) => Value::String(language.clone()),
        }
    }

    /// Parse a user-supplied textual value, e.g. from the command line.
    pub fn parse(key: PreferenceKey, raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        match key {
            PreferenceKey::DarkMode => match raw.to_ascii_lowercase().as_str() {
                "" | "unset" | "system" | "auto" | "null" => Ok(Self::DarkMode(None)),
                "1" | "true" | "yes" | "on" => Ok(Self::DarkMode(Some(true))),
                "0" | "false" | "no" | "off" => Ok(Self::DarkMode(Some(false))),
                _ => Err(Error::InvalidInput(format!("Invalid dark mode value: {raw}"))),
            },
            PreferenceKey::Theme => raw.parse().map(Self::Theme),
            PreferenceKey::FontSize => {
                let size = raw
                    .trim_end_matches('%')
                    .parse::<u32>()
                    .map_err(|_| Error::InvalidInput(format!("Invalid font size: {raw}")))?;
                Self::font_size(size)
            }
            PreferenceKey::Language => Self::language(raw),
        }
    }

    /// Parse a value found in a remote payload.
    pub fn from_json(key: PreferenceKey, value: &Value) -> Result<Self, Error> {
        match (key, value) {
            (PreferenceKey::DarkMode, Value::Null) => Ok(Self::DarkMode(None)),
            (PreferenceKey::DarkMode, Value::Bool(flag)) => Ok(Self::DarkMode(Some(*flag))),
            (PreferenceKey::Theme, Value::String(theme)) => theme.parse().map(Self::Theme),
            (PreferenceKey::FontSize, Value::Number(number)) => {
                let size = number
                    .as_u64()
                    .and_then(|size| u32::try_from(size).ok())
                    .ok_or_else(|| Error::InvalidInput(format!("Invalid font size: {number}")))?;
                Self::font_size(size)
            }
            (PreferenceKey::Language, Value::String(language)) => Self::language(language),
            (key, other) => Err(Error::InvalidInput(format!(
                "Unexpected value for {key}: {other}"
            ))),
        }
    }

    fn font_size(size: u32) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::InvalidInput(
                "Font size must be a positive percentage".to_string(),
            ));
        }
        Ok(Self::FontSize(size))
    }

    fn language(raw: &str) -> Result<Self, Error> {
        let language = raw.trim();
        if language.is_empty() {
            return Err(Error::InvalidInput("Language must not be empty".to_string()));
        }
        Ok(Self::Language(language.to_string()))
    }
}
