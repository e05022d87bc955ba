use std::sync::Arc;

use anyhow::Result;
use teloxide::dispatching::HandlerExt;
use teloxide::prelude::*;
use tracing::{error, info, warn};

use crate::commands::{apply_command, Command};
use crate::config::Config;
use crate::platform::telegram;
use crate::preferences::{PreferenceStore, UserId};
use crate::transform::{MessageTransformer, TransformError};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn PreferenceStore>,
    pub transformer: MessageTransformer,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn PreferenceStore>,
        transformer: MessageTransformer,
    ) -> Self {
        Self {
            config,
            store,
            transformer,
        }
    }
}

/// Start the Telegram bot
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let bot = Bot::new(&state.config.telegram.bot_token);

    info!("Starting Telegram bot...");

    let access = state.config.clone();

    let handler = Update::filter_message()
        .filter_map(move |msg: Message| {
            let user = msg.from.as_ref()?;
            if access.is_user_allowed(user.id.0) {
                Some(msg)
            } else {
                None
            }
        })
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            dptree::filter(|msg: Message| msg.forward_origin().is_some())
                .endpoint(handle_forwarded),
        );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("bot"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0 as UserId;

    info!("Command from user {}: {:?}", user_id, cmd);

    let reply = match apply_command(state.store.as_ref(), user_id, &user.first_name, cmd).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Failed to apply command for user {}: {}", user_id, e);
            "Settings are temporarily unavailable, please try again later.".to_string()
        }
    };

    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_forwarded(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0 as UserId;

    let forwarded = telegram::forwarded_message(&msg);
    info!(
        "Forwarded post from user {} ({} link(s), media: {})",
        user_id,
        forwarded.url_spans.len(),
        forwarded.has_media
    );

    match state.transformer.transform_for_user(user_id, &forwarded).await {
        Ok(out) => telegram::deliver(&bot, &msg, &out).await?,
        Err(e) => {
            if let TransformError::StorageUnavailable(ref cause) = e {
                error!("Preference lookup failed for user {}: {}", user_id, cause);
            }
            bot.send_message(msg.chat.id, error_reply(&e)).await?;
        }
    }

    Ok(())
}

/// User-facing text for a failed transform
fn error_reply(e: &TransformError) -> String {
    match e {
        TransformError::NoCredential => "You need to set your API key using /add_api.".to_string(),
        TransformError::NoLinksFound => "No URLs found to shorten.".to_string(),
        TransformError::ShortenerFailed { url, source } => {
            format!("Could not shorten {}: {}. Please try again later.", url, source)
        }
        TransformError::StorageUnavailable(_) => {
            "Settings are temporarily unavailable, please try again later.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::StoreError;
    use crate::shortener::ShortenerError;

    #[test]
    fn test_error_replies() {
        assert!(error_reply(&TransformError::NoCredential).contains("/add_api"));
        assert_eq!(
            error_reply(&TransformError::NoLinksFound),
            "No URLs found to shorten."
        );

        let failed = TransformError::ShortenerFailed {
            url: "http://a.com".to_string(),
            source: ShortenerError::RateLimited,
        };
        let reply = error_reply(&failed);
        assert!(reply.contains("http://a.com"));
        assert!(reply.contains("rate limit"));

        let storage = TransformError::StorageUnavailable(StoreError::Unavailable("locked".into()));
        assert!(error_reply(&storage).contains("temporarily unavailable"));
    }
}
