pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

pub use sqlite::SqlitePreferenceStore;

/// Platform-supplied user identifier
pub type UserId = i64;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("value kind does not match preference '{0}'")]
    InvalidValue(PreferenceField),
}

/// Per-user settings that drive message rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPreferences {
    pub shortening_credential: Option<String>,
    pub footer: Option<String>,
    pub channel_target: Option<String>,
    pub text_visible: bool,
    pub media_visible: bool,
    /// Stored for future localization, not read by the pipeline
    pub language_tag: Option<String>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            shortening_credential: None,
            footer: None,
            channel_target: None,
            text_visible: true,
            media_visible: true,
            language_tag: None,
        }
    }
}

/// The independently settable attributes of [`UserPreferences`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceField {
    ShorteningCredential,
    Footer,
    ChannelTarget,
    TextVisible,
    MediaVisible,
    LanguageTag,
}

impl PreferenceField {
    pub const ALL: [PreferenceField; 6] = [
        PreferenceField::ShorteningCredential,
        PreferenceField::Footer,
        PreferenceField::ChannelTarget,
        PreferenceField::TextVisible,
        PreferenceField::MediaVisible,
        PreferenceField::LanguageTag,
    ];

    /// Key under which the field is persisted
    pub fn key(self) -> &'static str {
        match self {
            PreferenceField::ShorteningCredential => "api_key",
            PreferenceField::Footer => "footer",
            PreferenceField::ChannelTarget => "channel",
            PreferenceField::TextVisible => "text_enabled",
            PreferenceField::MediaVisible => "picture_enabled",
            PreferenceField::LanguageTag => "language",
        }
    }

    /// Fields holding an on/off toggle rather than text
    pub fn is_flag(self) -> bool {
        matches!(
            self,
            PreferenceField::TextVisible | PreferenceField::MediaVisible
        )
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

impl std::fmt::Display for PreferenceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
}

impl FieldValue {
    /// Flags go to toggle fields, text to everything else
    pub fn fits(&self, field: PreferenceField) -> bool {
        matches!(self, FieldValue::Flag(_)) == field.is_flag()
    }

    pub fn encode(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Flag(b) => b.to_string(),
        }
    }
}

impl UserPreferences {
    /// Rebuild a record from persisted `(key, value)` pairs.
    /// Unknown keys are ignored; unparseable flags keep their default.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut prefs = UserPreferences::default();
        for (key, value) in fields {
            let Some(field) = PreferenceField::from_key(key.as_ref()) else {
                warn!("Ignoring unknown preference key '{}'", key.as_ref());
                continue;
            };
            prefs.apply(field, value.into());
        }
        prefs
    }

    fn apply(&mut self, field: PreferenceField, raw: String) {
        match field {
            PreferenceField::ShorteningCredential => self.shortening_credential = Some(raw),
            PreferenceField::Footer => self.footer = Some(raw),
            PreferenceField::ChannelTarget => self.channel_target = Some(raw),
            PreferenceField::LanguageTag => self.language_tag = Some(raw),
            PreferenceField::TextVisible => {
                if let Some(b) = parse_flag(field, &raw) {
                    self.text_visible = b;
                }
            }
            PreferenceField::MediaVisible => {
                if let Some(b) = parse_flag(field, &raw) {
                    self.media_visible = b;
                }
            }
        }
    }
}

fn parse_flag(field: PreferenceField, raw: &str) -> Option<bool> {
    match raw {
        "true" => Some(true),
        "false" => Some(false),
        other => {
            warn!("Invalid value '{}' for flag '{}', using default", other, field);
            None
        }
    }
}

/// Keyed document store holding one preference record per user.
///
/// Only single-field writes are exposed so concurrent commands from the same
/// user never overwrite each other's fields.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// `Ok(None)` when the user has never configured anything.
    async fn get(&self, user_id: UserId) -> Result<Option<UserPreferences>, StoreError>;

    /// Upsert one field, creating the record if absent.
    /// Fails with `InvalidValue` when the value kind does not fit the field.
    async fn set_field(
        &self,
        user_id: UserId,
        field: PreferenceField,
        value: FieldValue,
    ) -> Result<(), StoreError>;

    /// Remove one field. Missing field or record is not an error.
    async fn unset_field(&self, user_id: UserId, field: PreferenceField) -> Result<(), StoreError>;
}
