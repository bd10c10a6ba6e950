//! Push notifications over the Bot API.

use async_trait::async_trait;
use teloxide::prelude::*;

use crate::notify::{Notifier, NotifyError};
use crate::reply::Reply;

use super::ui;

/// [`Notifier`] that delivers to a user's private chat with the bot.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    /// Wrap a bot handle.
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, user_id: i64, message: &Reply) -> Result<(), NotifyError> {
        ui::send_reply(&self.bot, ChatId(user_id), message)
            .await
            .map_err(|e| NotifyError::Delivery {
                user_id,
                reason: e.to_string(),
            })
    }
}
