//! Telegram adapter: bot dispatcher, reply rendering, and push delivery.
//!
//! Incoming updates are reduced to command text, free text, uploaded media,
//! or button [`Action`](crate::reply::Action)s and handed to
//! [`crate::handlers`]. Whatever [`Reply`](crate::reply::Reply) comes back is
//! rendered by [`ui::send_reply`].

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use tracing::{debug, info, warn};

use crate::handlers::{self, ChatUser, HandlerContext};
use crate::reply::Action;
use crate::store::MediaKind;

pub mod commands;
pub mod notifier;
pub mod ui;

pub use self::notifier::TelegramNotifier;

// ---------------------------------------------------------------------------
// Shared state for handler injection
// ---------------------------------------------------------------------------

/// Shared dependencies injected into teloxide handlers via `dptree::deps!`.
#[derive(Clone)]
struct SharedState {
    ctx: HandlerContext,
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Run the bot until Ctrl+C.
///
/// # Errors
///
/// Currently infallible once the dispatcher starts; kept as `Result` so
/// startup checks can be added without changing callers.
pub async fn run_telegram(bot: Bot, ctx: HandlerContext) -> anyhow::Result<()> {
    if let Err(e) = bot.set_my_commands(commands::bot_commands()).await {
        warn!(error = %e, "failed to publish bot commands");
    }

    let shared = SharedState { ctx };

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    info!("telegram dispatcher starting");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![shared])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("telegram dispatcher stopped");
    Ok(())
}

fn chat_user(user: &teloxide::types::User) -> ChatUser {
    ChatUser {
        // teloxide uses u64 for user IDs; the store uses i64.
        id: i64::try_from(user.id.0).unwrap_or(0),
        name: user.full_name(),
        username: user.username.clone(),
    }
}

// ---------------------------------------------------------------------------
// Message handler
// ---------------------------------------------------------------------------

/// Handle an incoming message: command, free text, photo, or video.
async fn handle_message(bot: Bot, msg: Message, state: SharedState) -> ResponseResult<()> {
    let user = match msg.from {
        Some(ref user) => chat_user(user),
        None => return Ok(()),
    };
    let ctx = &state.ctx;

    debug!(user_id = user.id, "telegram message received");

    if let Err(e) = ctx
        .store
        .ensure_user(user.id, &user.name, user.username.as_deref())
        .await
    {
        warn!(user_id = user.id, error = %e, "failed to record user");
    }

    let reply = if let Some(text) = msg.text() {
        if text.starts_with('/') {
            handlers::run_command(ctx, &user, text).await
        } else {
            handlers::run_text(ctx, &user, text).await
        }
    } else if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        // Largest size comes last.
        handlers::run_media(ctx, &user, MediaKind::Photo, &photo.file.id).await
    } else if let Some(video) = msg.video() {
        handlers::run_media(ctx, &user, MediaKind::Video, &video.file.id).await
    } else {
        debug!(user_id = user.id, "unsupported message type, ignoring");
        return Ok(());
    };

    ui::send_reply(&bot, msg.chat.id, &reply).await
}

// ---------------------------------------------------------------------------
// Callback query handler
// ---------------------------------------------------------------------------

/// Handle an inline keyboard press.
async fn handle_callback(bot: Bot, query: CallbackQuery, state: SharedState) -> ResponseResult<()> {
    let user = chat_user(&query.from);

    let Some(action) = query.data.as_deref().and_then(Action::parse) else {
        bot.answer_callback_query(&query.id)
            .text("Unknown action")
            .await?;
        return Ok(());
    };

    debug!(user_id = user.id, action = %action.encode(), "telegram callback received");

    let reply = handlers::run_action(&state.ctx, &user, action).await;
    bot.answer_callback_query(&query.id).await?;

    let chat_id = query
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(user.id));
    ui::send_reply(&bot, chat_id, &reply).await
}
