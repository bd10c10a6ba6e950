//! Command handlers.
//!
//! Every handler takes a [`HandlerContext`] and the acting user, talks to
//! the store, fires notifications, and returns a [`Reply`]. Nothing here
//! knows about Telegram: the adapter feeds in command text, button
//! [`Action`]s, and uploaded media, and sends back whatever comes out.

pub mod admin;
pub mod commands;
pub mod menu;
pub mod stats;
pub mod tasks;
pub mod wizard;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use tracing::warn;

use crate::config::Config;
use crate::notify::Notifier;
use crate::permissions::Actor;
use crate::reply::{escape_html, Action, Button, MenuItem, Reply};
use crate::store::{Store, StoreError};

use self::wizard::WizardStore;

pub use self::commands::run_command;

/// Shared dependencies of every handler. Cheap to clone.
#[derive(Clone)]
pub struct HandlerContext {
    /// Persistence.
    pub store: Store,
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Outbound notifications.
    pub notifier: Arc<dyn Notifier>,
    /// In-progress task creation wizards, keyed by user.
    pub wizards: Arc<WizardStore>,
}

impl HandlerContext {
    /// Build a context with an empty wizard store.
    pub fn new(store: Store, config: Arc<Config>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            config,
            notifier,
            wizards: Arc::new(WizardStore::default()),
        }
    }

    /// Load the permission snapshot of `user_id`.
    pub async fn actor(&self, user_id: i64) -> Result<Actor, StoreError> {
        Actor::load(&self.store, &self.config, user_id).await
    }

    /// The current moment in the configured local time.
    pub fn now_local(&self) -> NaiveDateTime {
        self.config.reminders.local_naive(Utc::now())
    }

    /// Today's date in the configured local time.
    pub fn today(&self) -> NaiveDate {
        self.now_local().date()
    }

    /// Maximum number of tasks in one list.
    pub fn list_limit(&self) -> usize {
        self.config.tasks.list_limit
    }
}

/// The person behind an update, as the transport reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    /// Transport user id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Handle, if any.
    pub username: Option<String>,
}

/// Why a handler could not do what was asked.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The actor lacks the rights for this action.
    #[error("{0}")]
    Denied(&'static str),

    /// Bad arguments or wrong moment for the action.
    #[error("{0}")]
    Invalid(String),

    /// The store failed or rejected the change.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type of every handler.
pub type HandlerResult<T = Reply> = Result<T, HandlerError>;

/// Turn a handler error into a user-facing reply.
///
/// Caller mistakes are explained; internal failures are logged and shown
/// as a short apology.
pub fn error_reply(err: &HandlerError) -> Reply {
    let text = match err {
        HandlerError::Denied(reason) => format!("\u{26D4} {reason}"),
        HandlerError::Invalid(reason) => format!("\u{26A0} {}", escape_html(reason)),
        HandlerError::Store(StoreError::NotFound { entity, id }) => {
            format!("\u{2753} {entity} #{id} not found.")
        }
        HandlerError::Store(
            e @ (StoreError::Conflict(_) | StoreError::Validation(_) | StoreError::MediaLimit),
        ) => format!("\u{26A0} {}", escape_html(&e.to_string())),
        HandlerError::Store(e) => {
            warn!(error = %e, "handler failed");
            "\u{274C} Something went wrong. Please try again later.".to_owned()
        }
    };
    Reply::text(text).with_button(home_button())
}

/// Unwrap a handler result into a reply.
pub fn respond(result: HandlerResult) -> Reply {
    result.unwrap_or_else(|e| error_reply(&e))
}

/// Log a notification failure. The action that triggered it still stands.
pub(crate) fn notify_failed(err: crate::notify::NotifyError) -> usize {
    warn!(error = %err, "notification failed");
    0
}

/// Button back to the role menu.
pub fn home_button() -> Button {
    Button::new("\u{1F3E0} Menu", Action::Menu(MenuItem::Home))
}

/// Handle a button press.
pub async fn run_action(ctx: &HandlerContext, user: &ChatUser, action: Action) -> Reply {
    let uid = user.id;
    let result = match action {
        Action::Menu(item) => open_menu(ctx, user, item).await,
        Action::View(id) => tasks::task_detail(ctx, uid, id).await,
        Action::Media(id) => tasks::task_media(ctx, uid, id).await,
        Action::Accept(id) => tasks::accept(ctx, uid, id).await,
        Action::Decline(id) => tasks::decline(ctx, uid, id).await,
        Action::ChooseMine(id) => tasks::choose_my_status(ctx, uid, id).await,
        Action::SetMine(id, status) => tasks::set_my_status(ctx, uid, id, status).await,
        Action::ChooseTask(id) => tasks::choose_task_status(ctx, uid, id).await,
        Action::SetTask(id, status) => tasks::set_task_status(ctx, uid, id, status).await,
        Action::DeleteAsk(id) => tasks::delete_ask(ctx, uid, id).await,
        Action::DeleteConfirm(id) => tasks::delete_task(ctx, uid, id).await,
        Action::UsersPage(page) => admin::users(ctx, uid, page_index(page)).await,
        Action::GroupsPage(page) => admin::groups(ctx, uid, page_index(page)).await,
        Action::UserTasks(target) => tasks::assignee_tasks(ctx, uid, target, None).await,
        Action::Approve(id) => admin::approve(ctx, uid, id).await,
        Action::Reject(id) => admin::reject(ctx, uid, id).await,
        Action::WizardToggle(_)
        | Action::WizardDate(_)
        | Action::WizardTime(_)
        | Action::WizardPage(_)
        | Action::WizardBack
        | Action::WizardForward
        | Action::WizardSkip
        | Action::WizardNext
        | Action::WizardConfirm
        | Action::WizardCancel => wizard::wizard_action(ctx, uid, action).await,
    };
    respond(result)
}

fn page_index(page: u32) -> usize {
    usize::try_from(page).unwrap_or(usize::MAX)
}

async fn open_menu(ctx: &HandlerContext, user: &ChatUser, item: MenuItem) -> HandlerResult {
    let uid = user.id;
    match item {
        MenuItem::Home => menu::start(ctx, user).await,
        MenuItem::MyTasks => tasks::my_tasks(ctx, uid).await,
        MenuItem::Created => tasks::created_tasks(ctx, uid).await,
        MenuItem::GroupTasks => tasks::group_tasks(ctx, uid, None).await,
        MenuItem::AllTasks => tasks::all_tasks(ctx, uid).await,
        MenuItem::Archive => tasks::archive(ctx, uid).await,
        MenuItem::NewTask => wizard::new_task(ctx, uid).await,
        MenuItem::Requests => admin::requests(ctx, uid).await,
        MenuItem::Groups => admin::groups(ctx, uid, 0).await,
        MenuItem::Users => admin::users(ctx, uid, 0).await,
        MenuItem::Stats => stats::stats(ctx, uid, None).await,
        MenuItem::Help => menu::help(ctx, uid).await,
        MenuItem::Register => menu::register(ctx, user).await,
    }
}

/// Handle free text that is not a command.
///
/// Text feeds the creation wizard when one is open; otherwise the user is
/// pointed at the menu.
pub async fn run_text(ctx: &HandlerContext, user: &ChatUser, text: &str) -> Reply {
    match wizard::wizard_text(ctx, user.id, text).await {
        Some(result) => respond(result),
        None => Reply::text("Use the menu below or /help to see what I can do.")
            .with_button(home_button()),
    }
}

/// Handle an uploaded photo or video.
pub async fn run_media(
    ctx: &HandlerContext,
    user: &ChatUser,
    kind: crate::store::MediaKind,
    file_id: &str,
) -> Reply {
    match wizard::wizard_media(ctx, user.id, kind, file_id).await {
        Some(result) => respond(result),
        None => Reply::text("Media can only be attached while creating a task.")
            .with_button(home_button()),
    }
}
