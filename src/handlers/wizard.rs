//! Step-by-step task creation.
//!
//! One draft per user, held in memory until it is confirmed or cancelled.
//! Steps: title, description (skippable), date, time, assignees, media
//! (skippable), confirm. Invalid input repeats the current step. Back
//! returns to the previous step with its value kept; forward is offered up
//! to the furthest step already reached.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Days, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use super::{home_button, notify_failed, HandlerContext, HandlerError, HandlerResult};
use crate::lifecycle;
use crate::notify;
use crate::permissions::{self, Actor};
use crate::reply::{escape_html, paginate, Action, Button, Reply};
use crate::store::{
    MediaKind, NewMedia, NewTask, User, MAX_DESCRIPTION_CHARS, MAX_MEDIA_PER_TASK,
    MAX_TITLE_CHARS,
};

/// Quick-pick offsets offered on the date step, in days from today.
const QUICK_DATES: [(u8, &str); 4] = [(0, "Today"), (1, "Tomorrow"), (2, "In 2 days"), (7, "In a week")];

/// Quick-pick hours per keyboard row on the time step.
const HOURS_PER_ROW: usize = 4;

/// Where a draft currently is. Ordered as the wizard walks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    /// Waiting for the title.
    Title,
    /// Waiting for the description.
    Description,
    /// Waiting for the due date.
    Date,
    /// Waiting for the due time.
    Time,
    /// Choosing assignees.
    Assignees,
    /// Collecting photos and videos.
    Media,
    /// Waiting for confirmation.
    Confirm,
}

impl Step {
    fn prev(self) -> Option<Self> {
        match self {
            Self::Title => None,
            Self::Description => Some(Self::Title),
            Self::Date => Some(Self::Description),
            Self::Time => Some(Self::Date),
            Self::Assignees => Some(Self::Time),
            Self::Media => Some(Self::Assignees),
            Self::Confirm => Some(Self::Media),
        }
    }

    fn next(self) -> Option<Self> {
        match self {
            Self::Title => Some(Self::Description),
            Self::Description => Some(Self::Date),
            Self::Date => Some(Self::Time),
            Self::Time => Some(Self::Assignees),
            Self::Assignees => Some(Self::Media),
            Self::Media => Some(Self::Confirm),
            Self::Confirm => None,
        }
    }
}

/// A task being composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Current step.
    pub step: Step,
    /// Furthest step reached so far.
    pub furthest: Step,
    /// Page of the assignee picker.
    pub page: usize,
    /// Title.
    pub title: String,
    /// Description, possibly empty.
    pub description: String,
    /// Due date, `YYYY-MM-DD`.
    pub due_date: String,
    /// Due time, `HH:MM`.
    pub due_time: String,
    /// Chosen assignees, in selection order.
    pub assignees: Vec<i64>,
    /// Collected media.
    pub media: Vec<NewMedia>,
}

impl Default for Draft {
    fn default() -> Self {
        Self {
            step: Step::Title,
            furthest: Step::Title,
            page: 0,
            title: String::new(),
            description: String::new(),
            due_date: String::new(),
            due_time: String::new(),
            assignees: Vec::new(),
            media: Vec::new(),
        }
    }
}

/// Drafts keyed by user id.
#[derive(Debug, Default)]
pub struct WizardStore {
    drafts: Mutex<HashMap<i64, Draft>>,
}

impl WizardStore {
    /// A copy of the user's draft, if any.
    pub fn get(&self, user_id: i64) -> Option<Draft> {
        self.drafts.lock().ok()?.get(&user_id).cloned()
    }

    /// Store or replace the user's draft.
    pub fn put(&self, user_id: i64, draft: Draft) {
        if let Ok(mut drafts) = self.drafts.lock() {
            drafts.insert(user_id, draft);
        }
    }

    /// Drop the user's draft. Returns whether one existed.
    pub fn remove(&self, user_id: i64) -> bool {
        match self.drafts.lock() {
            Ok(mut drafts) => drafts.remove(&user_id).is_some(),
            Err(_) => false,
        }
    }

    /// Whether the user is composing a task.
    pub fn is_active(&self, user_id: i64) -> bool {
        self.get(user_id).is_some()
    }
}

impl Draft {
    /// Move to `step` and remember how far the draft got.
    fn go(&mut self, step: Step) {
        self.step = step;
        self.furthest = self.furthest.max(step);
    }
}

/// Back, forward (when a later step was reached before), and cancel.
fn nav_row(draft: &Draft) -> Vec<Button> {
    let mut row = Vec::new();
    if draft.step.prev().is_some() {
        row.push(Button::new("\u{2B05} Back", Action::WizardBack));
    }
    if draft.step < draft.furthest {
        row.push(Button::new("\u{27A1} Forward", Action::WizardForward));
    }
    row.push(Button::new("\u{274C} Cancel", Action::WizardCancel));
    row
}

/// Refuse a due moment that is not in the future.
fn check_due(date: &str, time: &str, now: NaiveDateTime) -> Result<(), String> {
    let due = lifecycle::due_datetime(date, time).map_err(|e| e.to_string())?;
    if due <= now {
        return Err("That time has already passed. Pick a later one.".to_owned());
    }
    Ok(())
}

/// Whole hours offered on the time step. Hours already past are left out
/// when the task is due today.
fn quick_hours(due_date: &str, now: NaiveDateTime) -> Vec<u8> {
    (1..=24u8)
        .filter(|h| check_due(due_date, &format!("{h:02}:00"), now).is_ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

fn with_error(reply: Reply, error: Option<&str>) -> Reply {
    match error {
        Some(e) => Reply {
            text: format!("\u{26A0} {}\n\n{}", escape_html(e), reply.text),
            ..reply
        },
        None => reply,
    }
}

fn title_prompt(draft: &Draft) -> Reply {
    Reply::text("\u{2795} <b>New task</b>\n\nStep 1/6: send the task title.").with_row(nav_row(draft))
}

fn description_prompt(draft: &Draft) -> Reply {
    Reply::text(format!(
        "Step 2/6: send a description (up to {MAX_DESCRIPTION_CHARS} characters), or skip."
    ))
    .with_button(Button::new("\u{23ED} Skip", Action::WizardSkip))
    .with_row(nav_row(draft))
}

fn date_prompt(today: NaiveDate, draft: &Draft) -> Reply {
    let row = QUICK_DATES
        .iter()
        .map(|(days, label)| {
            let date = today
                .checked_add_days(Days::new(u64::from(*days)))
                .map(|d| d.format("%d.%m").to_string())
                .unwrap_or_default();
            Button::new(format!("{label} ({date})"), Action::WizardDate(*days))
        })
        .collect();
    Reply::text("Step 3/6: pick a due date or send it as YYYY-MM-DD.")
        .with_row(row)
        .with_row(nav_row(draft))
}

fn time_prompt(draft: &Draft, now: NaiveDateTime) -> Reply {
    let mut reply = Reply::text(format!(
        "\u{1F4C5} Due date: {}\nStep 4/6: pick a due time or send it as HH:MM (24:00 means end of day).",
        draft.due_date
    ));
    let hours = quick_hours(&draft.due_date, now);
    for chunk in hours.chunks(HOURS_PER_ROW) {
        let row = chunk
            .iter()
            .map(|h| Button::new(format!("{h:02}:00"), Action::WizardTime(*h)))
            .collect();
        reply = reply.with_row(row);
    }
    reply.with_row(nav_row(draft))
}

fn assignee_prompt(users: &[User], draft: &Draft) -> Reply {
    let page = paginate(users, draft.page);
    let mut text = String::from(
        "Step 5/6: choose assignees. Leave everyone unticked to publish an open task \
         that the first volunteer takes.",
    );
    if !page.label().is_empty() {
        text.push_str(&format!("\n{}", page.label()));
    }
    let mut reply = Reply::text(text);
    for user in page.items {
        let ticked = draft.assignees.contains(&user.user_id);
        let label = format!("{} {}", if ticked { "\u{2705}" } else { "\u{25AB}" }, user.name);
        reply = reply.with_button(Button::new(label, Action::WizardToggle(user.user_id)));
    }
    let next = if draft.assignees.is_empty() {
        "\u{27A1} Continue as open task"
    } else {
        "\u{27A1} Continue"
    };
    reply
        .with_row(page.nav_row(Action::WizardPage))
        .with_button(Button::new(next, Action::WizardNext))
        .with_row(nav_row(draft))
}

fn media_prompt(draft: &Draft) -> Reply {
    Reply::text(format!(
        "Step 6/6: send photos or videos (up to {MAX_MEDIA_PER_TASK}). Attached: {}.",
        draft.media.len()
    ))
    .with_row(vec![
        Button::new("\u{27A1} Done", Action::WizardNext),
        Button::new("\u{23ED} Skip", Action::WizardSkip),
    ])
    .with_row(nav_row(draft))
}

async fn confirm_prompt(ctx: &HandlerContext, draft: &Draft) -> HandlerResult {
    let mut names = Vec::new();
    for id in &draft.assignees {
        let name = ctx
            .store
            .get_user(*id)
            .await?
            .map(|u| u.name)
            .unwrap_or_else(|| format!("user {id}"));
        names.push(escape_html(&name));
    }
    let assignees = if names.is_empty() {
        "nobody (open task)".to_owned()
    } else {
        names.join(", ")
    };
    let description = if draft.description.is_empty() {
        "\u{2014}".to_owned()
    } else {
        escape_html(&draft.description)
    };

    Ok(Reply::text(format!(
        "<b>Check the new task</b>\n\n\
         \u{1F4DD} <b>{}</b>\n{description}\n\n\
         \u{1F4C5} Due: {} {}\n\u{1F465} Assignees: {assignees}\n\u{1F4CE} Media: {}",
        escape_html(&draft.title),
        draft.due_date,
        draft.due_time,
        draft.media.len()
    ))
    .with_button(Button::new("\u{2705} Create", Action::WizardConfirm))
    .with_row(nav_row(draft)))
}

async fn prompt_for(ctx: &HandlerContext, actor: &Actor, draft: &Draft) -> HandlerResult {
    match draft.step {
        Step::Title => Ok(title_prompt(draft)),
        Step::Description => Ok(description_prompt(draft)),
        Step::Date => Ok(date_prompt(ctx.today(), draft)),
        Step::Time => Ok(time_prompt(draft, ctx.now_local())),
        Step::Assignees => {
            let users = permissions::assignable_users(&ctx.store, actor).await?;
            Ok(assignee_prompt(&users, draft))
        }
        Step::Media => Ok(media_prompt(draft)),
        Step::Confirm => confirm_prompt(ctx, draft).await,
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Start a new draft, replacing any unfinished one.
pub async fn new_task(ctx: &HandlerContext, user_id: i64) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    if !permissions::can_create_task(&actor) {
        return Err(HandlerError::Denied("Only registered users can create tasks."));
    }
    let draft = Draft::default();
    let reply = title_prompt(&draft);
    ctx.wizards.put(user_id, draft);
    debug!(user_id, "task wizard started");
    Ok(reply)
}

/// Abort the draft.
pub fn cancel(ctx: &HandlerContext, user_id: i64) -> Reply {
    if ctx.wizards.remove(user_id) {
        Reply::text("\u{274C} Task creation cancelled.").with_button(home_button())
    } else {
        Reply::text("Nothing to cancel.").with_button(home_button())
    }
}

/// Feed typed text to the draft. `None` when the user has no draft.
pub async fn wizard_text(
    ctx: &HandlerContext,
    user_id: i64,
    text: &str,
) -> Option<HandlerResult> {
    let draft = ctx.wizards.get(user_id)?;
    Some(advance_with_text(ctx, user_id, draft, text.trim()).await)
}

async fn advance_with_text(
    ctx: &HandlerContext,
    user_id: i64,
    mut draft: Draft,
    text: &str,
) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    let error = match draft.step {
        Step::Title => {
            if text.is_empty() {
                Some("The title must not be empty.".to_owned())
            } else if text.chars().count() > MAX_TITLE_CHARS {
                Some(format!("The title is limited to {MAX_TITLE_CHARS} characters."))
            } else {
                draft.title = text.to_owned();
                draft.go(Step::Description);
                None
            }
        }
        Step::Description => {
            if text.chars().count() > MAX_DESCRIPTION_CHARS {
                Some(format!(
                    "The description is limited to {MAX_DESCRIPTION_CHARS} characters."
                ))
            } else {
                draft.description = text.to_owned();
                draft.go(Step::Date);
                None
            }
        }
        Step::Date => match accept_date(ctx.today(), text) {
            Ok(date) => {
                draft.due_date = date;
                draft.go(Step::Time);
                None
            }
            Err(e) => Some(e),
        },
        Step::Time => match accept_time(&draft.due_date, text, ctx.now_local()) {
            Ok(time) => {
                draft.due_time = time;
                draft.go(Step::Assignees);
                None
            }
            Err(e) => Some(e),
        },
        Step::Assignees => Some("Use the buttons to choose assignees.".to_owned()),
        Step::Media => Some("Send a photo or video, or press Done.".to_owned()),
        Step::Confirm => Some("Press Create or Cancel.".to_owned()),
    };

    let reply = prompt_for(ctx, &actor, &draft).await?;
    ctx.wizards.put(user_id, draft);
    Ok(with_error(reply, error.as_deref()))
}

fn accept_date(today: NaiveDate, text: &str) -> Result<String, String> {
    let date = lifecycle::parse_due_date(text).map_err(|e| e.to_string())?;
    if date < today {
        return Err("The due date is in the past.".to_owned());
    }
    Ok(date.format("%Y-%m-%d").to_string())
}

fn accept_time(due_date: &str, text: &str, now: NaiveDateTime) -> Result<String, String> {
    let time = lifecycle::parse_due_time(text).map_err(|e| e.to_string())?;
    check_due(due_date, &time, now)?;
    Ok(time)
}

/// Attach an uploaded file. `None` when the user has no draft.
pub async fn wizard_media(
    ctx: &HandlerContext,
    user_id: i64,
    kind: MediaKind,
    file_id: &str,
) -> Option<HandlerResult> {
    let mut draft = ctx.wizards.get(user_id)?;
    if draft.step != Step::Media {
        return Some(Err(HandlerError::Invalid(
            "Media can be added at the last step, after choosing assignees.".to_owned(),
        )));
    }
    if draft.media.len() >= MAX_MEDIA_PER_TASK {
        return Some(Err(HandlerError::Invalid(format!(
            "A task holds at most {MAX_MEDIA_PER_TASK} media files."
        ))));
    }
    draft.media.push(NewMedia {
        kind,
        file_id: file_id.to_owned(),
    });
    let reply = media_prompt(&draft);
    ctx.wizards.put(user_id, draft);
    Some(Ok(reply))
}

/// Handle a wizard button.
pub async fn wizard_action(ctx: &HandlerContext, user_id: i64, action: Action) -> HandlerResult {
    if action == Action::WizardCancel {
        return Ok(cancel(ctx, user_id));
    }
    let Some(mut draft) = ctx.wizards.get(user_id) else {
        return Err(HandlerError::Invalid(
            "This task draft has expired. Start again with /new.".to_owned(),
        ));
    };
    let actor = ctx.actor(user_id).await?;

    let error = match (draft.step, &action) {
        (_, Action::WizardBack) => match draft.step.prev() {
            Some(step) => {
                draft.step = step;
                None
            }
            None => Some("This is the first step.".to_owned()),
        },
        (_, Action::WizardForward) => forward(ctx, &mut draft),
        (Step::Description, Action::WizardSkip) => {
            draft.go(Step::Date);
            None
        }
        (Step::Date, Action::WizardDate(days)) => {
            match ctx.today().checked_add_days(Days::new(u64::from(*days))) {
                Some(date) => {
                    draft.due_date = date.format("%Y-%m-%d").to_string();
                    draft.go(Step::Time);
                    None
                }
                None => Some("That date is out of range.".to_owned()),
            }
        }
        (Step::Time, Action::WizardTime(hour)) if (1..=24).contains(hour) => {
            match accept_time(&draft.due_date, &format!("{hour:02}:00"), ctx.now_local()) {
                Ok(time) => {
                    draft.due_time = time;
                    draft.go(Step::Assignees);
                    None
                }
                Err(e) => Some(e),
            }
        }
        (Step::Assignees, Action::WizardPage(page)) => {
            draft.page = usize::try_from(*page).unwrap_or(0);
            None
        }
        (Step::Assignees, Action::WizardToggle(target)) => {
            let allowed = permissions::assignable_users(&ctx.store, &actor)
                .await?
                .iter()
                .any(|u| u.user_id == *target);
            if !allowed {
                Some("You cannot assign tasks to this user.".to_owned())
            } else {
                if let Some(pos) = draft.assignees.iter().position(|id| id == target) {
                    draft.assignees.remove(pos);
                } else {
                    draft.assignees.push(*target);
                }
                None
            }
        }
        (Step::Assignees, Action::WizardNext) => {
            draft.go(Step::Media);
            None
        }
        (Step::Media, Action::WizardNext | Action::WizardSkip) => {
            draft.go(Step::Confirm);
            None
        }
        (Step::Confirm, Action::WizardConfirm) => {
            match check_due(&draft.due_date, &draft.due_time, ctx.now_local()) {
                Ok(()) => return confirm(ctx, &actor, draft).await,
                Err(e) => {
                    draft.step = Step::Time;
                    Some(e)
                }
            }
        }
        _ => Some("That button belongs to another step.".to_owned()),
    };

    let reply = prompt_for(ctx, &actor, &draft).await?;
    ctx.wizards.put(user_id, draft);
    Ok(with_error(reply, error.as_deref()))
}

/// Step forward to a step reached before. The due moment is checked again
/// when leaving the time step, since the date may have changed.
fn forward(ctx: &HandlerContext, draft: &mut Draft) -> Option<String> {
    if draft.step >= draft.furthest {
        return Some("There is no later step yet.".to_owned());
    }
    if draft.step == Step::Time {
        if let Err(e) = check_due(&draft.due_date, &draft.due_time, ctx.now_local()) {
            return Some(e);
        }
    }
    if let Some(step) = draft.step.next() {
        draft.step = step;
    }
    None
}

/// Pick the task's group.
///
/// The creator's first administered group, else their first group, else the
/// first assignee's first group. Without any of these the task has no group.
async fn resolve_group(
    ctx: &HandlerContext,
    actor: &Actor,
    assignees: &[i64],
) -> HandlerResult<Option<i64>> {
    if let Some(g) = actor.admin_groups.iter().next() {
        return Ok(Some(*g));
    }
    if let Some(g) = actor.member_groups.iter().next() {
        return Ok(Some(*g));
    }
    if let Some(first) = assignees.first() {
        let groups = ctx.store.user_groups(*first).await?;
        return Ok(groups.first().map(|g| g.group_id));
    }
    Ok(None)
}

async fn confirm(ctx: &HandlerContext, actor: &Actor, draft: Draft) -> HandlerResult {
    let user_id = actor.user_id;
    if !permissions::can_create_task(actor) {
        ctx.wizards.remove(user_id);
        return Err(HandlerError::Denied("Only registered users can create tasks."));
    }

    let allowed: Vec<i64> = permissions::assignable_users(&ctx.store, actor)
        .await?
        .into_iter()
        .map(|u| u.user_id)
        .collect();
    let assignees: Vec<i64> = draft
        .assignees
        .iter()
        .copied()
        .filter(|id| allowed.contains(id))
        .collect();

    let group_id = resolve_group(ctx, actor, &assignees).await?;
    let new = NewTask {
        title: draft.title,
        description: draft.description,
        due_date: draft.due_date,
        due_time: draft.due_time,
        group_id,
        created_by: user_id,
        assignees,
        media: draft.media,
    };
    let task_id = ctx.store.create_task(&new).await?;
    ctx.wizards.remove(user_id);

    let task = ctx.store.require_task(task_id).await?;
    let delivered = notify::task_created(&ctx.store, &ctx.config, &*ctx.notifier, &task)
        .await
        .unwrap_or_else(notify_failed);
    info!(task_id, user_id, group_id, delivered, "task created");

    Ok(Reply::text(format!(
        "\u{2705} Task #{task_id} <b>{}</b> created.",
        escape_html(&task.title)
    ))
    .with_button(Button::new("\u{1F4CB} View task", Action::View(task_id)))
    .with_button(home_button()))
}
