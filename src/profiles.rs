//! Per-game display profiles: a friendly name and an optional icon.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Where a profile icon comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconType {
    Upload,
    Preset,
}

impl IconType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(Self::Upload),
            "preset" => Some(Self::Preset),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Preset => "preset",
        }
    }
}

/// Display metadata for one game.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameProfile {
    pub name: String,
    #[serde(serialize_with = "icon_type_text")]
    pub icon_type: Option<IconType>,
    pub icon_value: String,
}

fn icon_type_text<S: Serializer>(icon: &Option<IconType>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(icon.map(|i| i.as_str()).unwrap_or(""))
}

impl GameProfile {
    /// Clean a raw profile object; `None` when nothing usable is left.
    fn from_fields(fields: &Map<String, Value>) -> Option<Self> {
        let name = text_field(fields, "name");
        let mut icon_type = IconType::parse(&text_field(fields, "icon_type"));
        let mut icon_value = text_field(fields, "icon_value");

        if icon_type.is_none() {
            icon_value.clear();
        }
        if icon_value.is_empty() {
            icon_type = None;
        }

        if name.is_empty() && icon_type.is_none() {
            return None;
        }

        Some(Self {
            name,
            icon_type,
            icon_value,
        })
    }
}

fn text_field(fields: &Map<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Profiles keyed by normalised game id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameProfiles {
    profiles: BTreeMap<String, GameProfile>,
}

impl GameProfiles {
    /// Parse a JSON object of profiles. Anything unreadable yields no profiles.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::default();
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                tracing::warn!("GameProfiles: ignoring invalid profile JSON: {}", e);
                Self::default()
            }
        }
    }

    /// Build from a decoded object, dropping invalid entries.
    pub fn from_value(value: &Value) -> Self {
        let mut profiles = BTreeMap::new();

        if let Value::Object(entries) = value {
            for (game_id, profile) in entries {
                let Value::Object(fields) = profile else {
                    continue;
                };
                let game_id = normalize_game_id(game_id);
                if game_id.is_empty() {
                    continue;
                }
                if let Some(profile) = GameProfile::from_fields(fields) {
                    profiles.insert(game_id, profile);
                }
            }
        }

        Self { profiles }
    }

    pub fn all(&self) -> &BTreeMap<String, GameProfile> {
        &self.profiles
    }

    pub fn get(&self, game_id: &str) -> Option<&GameProfile> {
        let game_id = normalize_game_id(game_id);
        if game_id.is_empty() {
            return None;
        }
        self.profiles.get(&game_id)
    }

    /// Serialise the normalised profiles back to a JSON object.
    pub fn encode(&self) -> String {
        serde_json::to_string(&self.profiles).unwrap_or_else(|_| "{}".to_string())
    }

    /// Name to show for a game: profile name, then catalog name, then the id.
    pub fn display_name(&self, game_id: &str, catalog: Option<&BTreeMap<String, String>>) -> String {
        if let Some(profile) = self.get(game_id) {
            if !profile.name.is_empty() {
                return profile.name.clone();
            }
        }

        let id = normalize_game_id(game_id);
        catalog
            .and_then(|games| games.get(&id))
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or(id)
    }
}

/// Profile key form of a game id.
pub fn normalize_game_id(game_id: &str) -> String {
    game_id.trim().to_lowercase()
}
