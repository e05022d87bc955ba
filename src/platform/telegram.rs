use teloxide::prelude::*;
use teloxide::types::{MessageEntity, MessageEntityKind, MessageEntityRef};
use tracing::debug;

use crate::transform::{ForwardedMessage, TransformedMessage, UrlSpan};

/// Telegram's hard limits for a text message and a media caption
const MESSAGE_LIMIT: usize = 4000;
const CAPTION_LIMIT: usize = 1024;

fn has_media(msg: &Message) -> bool {
    msg.photo().is_some() || msg.video().is_some() || msg.animation().is_some()
}

/// Build the pipeline input from a Telegram message (text or media caption).
pub fn forwarded_message(msg: &Message) -> ForwardedMessage {
    let (text, entities) = match msg.text() {
        Some(text) => (text, msg.entities().unwrap_or_default()),
        None => (
            msg.caption().unwrap_or_default(),
            msg.caption_entities().unwrap_or_default(),
        ),
    };
    from_parts(text, entities, has_media(msg))
}

/// Entity offsets arrive in UTF-16 units; `MessageEntityRef` converts them
/// to byte ranges of `text`.
fn from_parts(text: &str, entities: &[MessageEntity], has_media: bool) -> ForwardedMessage {
    let url_spans = MessageEntityRef::parse(text, entities)
        .iter()
        .filter(|e| matches!(e.kind(), MessageEntityKind::Url))
        .map(|e| {
            let range = e.range();
            UrlSpan::new(range.start, range.len())
        })
        .collect();

    ForwardedMessage {
        text: text.to_string(),
        url_spans,
        has_media,
    }
}

/// Telegram measures caption length in UTF-16 code units
fn fits_caption(text: &str) -> bool {
    text.encode_utf16().count() <= CAPTION_LIMIT
}

/// Split long messages for Telegram's message size limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Send the transformed post back to the chat it came from.
///
/// Media is re-sent (copied) unless suppressed; a caption too long for
/// Telegram is sent as a separate text message instead.
pub async fn deliver(bot: &Bot, msg: &Message, out: &TransformedMessage) -> ResponseResult<()> {
    let chat_id = msg.chat.id;

    if has_media(msg) && !out.suppress_media {
        if fits_caption(&out.text) {
            bot.copy_message(chat_id, chat_id, msg.id)
                .caption(out.text.clone())
                .await?;
            return Ok(());
        }
        debug!("Caption too long, sending media and text separately");
        bot.copy_message(chat_id, chat_id, msg.id)
            .caption(String::new())
            .await?;
    }

    for chunk in split_message(&out.text, MESSAGE_LIMIT) {
        bot.send_message(chat_id, chunk).await?;
    }
    Ok(())
}
