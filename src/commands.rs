use teloxide::utils::command::BotCommands;

use crate::preferences::{
    FieldValue, PreferenceField, PreferenceStore, StoreError, UserId, UserPreferences,
};

const SUPPORT_CONTACT: &str = "support@bdshortner.com";

/// Configuration commands understood by the bot
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "snake_case", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show the welcome message.")]
    Start,
    #[command(description = "show this help.")]
    Help,
    #[command(description = "save your shortener API key.")]
    AddApi(String),
    #[command(description = "rewrite t.me links to your channel.")]
    AddChannel(String),
    #[command(description = "stop rewriting channel links.")]
    RemoveChannel,
    #[command(description = "append a footer to every post.")]
    AddFooter(String),
    #[command(description = "remove the footer.")]
    RemoveFooter,
    #[command(description = "send only the shortened links.")]
    DisableText,
    #[command(description = "send the full post text.")]
    EnableText,
    #[command(description = "drop pictures and videos.")]
    DisablePicture,
    #[command(description = "keep pictures and videos.")]
    EnablePicture,
    #[command(description = "set your language, e.g. en or es.")]
    ChangeLanguage(String),
    #[command(rename = "getmyid", description = "show your Telegram ID.")]
    GetMyId,
    #[command(description = "show your current settings.")]
    Settings,
}

/// Run a command for `user_id` and return the reply text.
///
/// Commands missing a required argument reply with usage and leave the
/// store untouched.
pub async fn apply_command(
    store: &dyn PreferenceStore,
    user_id: UserId,
    user_name: &str,
    command: Command,
) -> Result<String, StoreError> {
    let reply = match command {
        Command::Start => format!(
            "Welcome {}!\nUse /add_api to add your API key, then forward me any post with links.",
            user_name
        ),
        Command::Help => format!(
            "{}\n\nYou can contact the support team at {}",
            Command::descriptions(),
            SUPPORT_CONTACT
        ),
        Command::AddApi(key) => {
            let key = key.trim();
            if key.is_empty() {
                return Ok("Please provide an API key like this: /add_api YOUR_API_KEY".into());
            }
            set_text(store, user_id, PreferenceField::ShorteningCredential, key).await?;
            "Your API key has been added successfully!".into()
        }
        Command::AddChannel(target) => {
            let target = target.trim();
            if target.is_empty() {
                return Ok("Please provide a channel like this: /add_channel @channel_username or https://t.me/channel_link".into());
            }
            set_text(store, user_id, PreferenceField::ChannelTarget, target).await?;
            format!("Channel {} added.", target)
        }
        Command::RemoveChannel => {
            store
                .unset_field(user_id, PreferenceField::ChannelTarget)
                .await?;
            "Channel removed successfully!".into()
        }
        Command::AddFooter(footer) => {
            let footer = footer.trim();
            if footer.is_empty() {
                return Ok(
                    "Please provide a footer text like this: /add_footer Your custom footer".into(),
                );
            }
            set_text(store, user_id, PreferenceField::Footer, footer).await?;
            format!("Footer added: {}", footer)
        }
        Command::RemoveFooter => {
            store.unset_field(user_id, PreferenceField::Footer).await?;
            "Footer removed successfully!".into()
        }
        Command::DisableText => {
            set_flag(store, user_id, PreferenceField::TextVisible, false).await?;
            "Text disabled for forwarded posts.".into()
        }
        Command::EnableText => {
            set_flag(store, user_id, PreferenceField::TextVisible, true).await?;
            "Text enabled for forwarded posts.".into()
        }
        Command::DisablePicture => {
            set_flag(store, user_id, PreferenceField::MediaVisible, false).await?;
            "Pictures and videos disabled for forwarded posts.".into()
        }
        Command::EnablePicture => {
            set_flag(store, user_id, PreferenceField::MediaVisible, true).await?;
            "Pictures and videos enabled for forwarded posts.".into()
        }
        Command::ChangeLanguage(language) => {
            let language = language.trim();
            if language.is_empty() {
                return Ok("Please provide a language like this: /change_language en".into());
            }
            set_text(store, user_id, PreferenceField::LanguageTag, language).await?;
            format!("Language changed to {}.", language)
        }
        Command::GetMyId => format!("Your Telegram ID is: {}", user_id),
        Command::Settings => {
            let prefs = store.get(user_id).await?.unwrap_or_default();
            describe(&prefs)
        }
    };
    Ok(reply)
}

async fn set_text(
    store: &dyn PreferenceStore,
    user_id: UserId,
    field: PreferenceField,
    value: &str,
) -> Result<(), StoreError> {
    store
        .set_field(user_id, field, FieldValue::Text(value.to_string()))
        .await
}

async fn set_flag(
    store: &dyn PreferenceStore,
    user_id: UserId,
    field: PreferenceField,
    value: bool,
) -> Result<(), StoreError> {
    store.set_field(user_id, field, FieldValue::Flag(value)).await
}

fn describe(prefs: &UserPreferences) -> String {
    let on_off = |b: bool| if b { "enabled" } else { "disabled" };
    let api_key = match prefs.shortening_credential.as_deref() {
        Some(key) => mask(key),
        None => "not set".to_string(),
    };
    format!(
        "Your settings:\n\
         API key: {}\n\
         Channel: {}\n\
         Footer: {}\n\
         Text: {}\n\
         Pictures: {}\n\
         Language: {}",
        api_key,
        prefs.channel_target.as_deref().unwrap_or("not set"),
        prefs.footer.as_deref().unwrap_or("not set"),
        on_off(prefs.text_visible),
        on_off(prefs.media_visible),
        prefs.language_tag.as_deref().unwrap_or("not set"),
    )
}

/// Show only the last four characters of a secret
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}
