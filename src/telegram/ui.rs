//! Rendering of handler replies as Telegram messages.
//!
//! All output uses HTML parse mode (never MarkdownV2). Texts longer than
//! one message are sent in several parts with the keyboard on the last, and
//! keyboards are cut at [`MAX_BUTTONS`].

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode};
use tracing::warn;

use crate::reply::{split_message, Reply, MAX_BUTTONS, MAX_MESSAGE_CHARS};
use crate::store::MediaKind;

/// Build the inline keyboard for a reply, or `None` when it has no buttons.
///
/// Rows past the [`MAX_BUTTONS`] limit are dropped, keeping the last row so
/// the way back to the menu survives.
pub fn keyboard(reply: &Reply) -> Option<InlineKeyboardMarkup> {
    if reply.keyboard.is_empty() {
        return None;
    }

    let total: usize = reply.keyboard.iter().map(Vec::len).sum();
    let mut kept: Vec<&Vec<_>> = Vec::new();
    if total <= MAX_BUTTONS {
        kept.extend(reply.keyboard.iter());
    } else {
        let (last, rest) = reply.keyboard.split_last()?;
        let mut budget = MAX_BUTTONS.saturating_sub(last.len());
        for row in rest {
            if row.len() > budget {
                break;
            }
            budget = budget.saturating_sub(row.len());
            kept.push(row);
        }
        kept.push(last);
        warn!(total, limit = MAX_BUTTONS, "keyboard truncated");
    }

    let rows = kept
        .into_iter()
        .map(|row| {
            row.iter()
                .take(MAX_BUTTONS)
                .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.action.encode()))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    Some(InlineKeyboardMarkup::new(rows))
}

/// Send a reply: the HTML text with its keyboard, then each attachment.
///
/// # Errors
///
/// Returns the first Telegram API error.
pub async fn send_reply(bot: &Bot, chat_id: ChatId, reply: &Reply) -> ResponseResult<()> {
    let chunks = split_message(&reply.text, MAX_MESSAGE_CHARS);
    let last = chunks.len().saturating_sub(1);
    for (i, chunk) in chunks.into_iter().enumerate() {
        let mut req = bot.send_message(chat_id, chunk).parse_mode(ParseMode::Html);
        if i == last {
            if let Some(markup) = keyboard(reply) {
                req = req.reply_markup(markup);
            }
        }
        req.await?;
    }

    for attachment in &reply.attachments {
        let file = InputFile::file_id(attachment.file_id.clone());
        match attachment.kind {
            MediaKind::Photo => {
                bot.send_photo(chat_id, file).await?;
            }
            MediaKind::Video => {
                bot.send_video(chat_id, file).await?;
            }
        }
    }
    Ok(())
}
