//! Transport-neutral replies: HTML text plus a grid of action buttons.
//!
//! Handlers and notifications produce [`Reply`] values; the Telegram adapter
//! turns them into messages with inline keyboards. Button payloads are
//! [`Action`]s encoded into compact callback strings that fit Telegram's
//! 64-byte callback data limit. Long listings are cut into pages of
//! [`PAGE_SIZE`] entries and long texts into chunks of at most
//! [`MAX_MESSAGE_CHARS`] characters.

use crate::lifecycle::TaskStatus;
use crate::store::MediaKind;

/// Longest message text the transport accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Most inline buttons the transport accepts on one message.
pub const MAX_BUTTONS: usize = 100;

/// Entries per page in paginated listings.
pub const PAGE_SIZE: usize = 10;

/// Escape special HTML characters in user-provided text.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Shorten text to at most `max_chars` characters, appending an ellipsis.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.push('\u{2026}');
    out
}

/// Split message text into chunks of at most `max_chars` characters.
///
/// Cuts fall on line breaks where possible. A single longer line is cut
/// hard, but never inside an HTML entity such as `&amp;`. Whitespace-only
/// chunks are dropped.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let len = line.chars().count();
        if current_len.saturating_add(len) > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if len > max_chars {
            chunks.extend(hard_split(line, max_chars));
        } else {
            current.push_str(line);
            current_len = current_len.saturating_add(len);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
        .into_iter()
        .map(|c| c.trim_end().to_owned())
        .filter(|c| !c.is_empty())
        .collect()
}

fn hard_split(line: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let mut end = start.saturating_add(max_chars).min(chars.len());
        if end < chars.len() {
            let window = &chars[start..end];
            if let Some(amp) = window.iter().rposition(|c| *c == '&') {
                if amp > 0 && !window[amp..].contains(&';') {
                    end = start.saturating_add(amp);
                }
            }
        }
        pieces.push(chars[start..end].iter().collect());
        start = end;
    }
    pieces
}

/// One page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page<'a, T> {
    /// Entries on this page.
    pub items: &'a [T],
    /// Zero-based page number, clamped to the last page.
    pub index: usize,
    /// Number of pages, at least one.
    pub count: usize,
}

/// Take page `page` of `items`, [`PAGE_SIZE`] entries per page.
pub fn paginate<T>(items: &[T], page: usize) -> Page<'_, T> {
    let count = items.len().div_ceil(PAGE_SIZE).max(1);
    let index = page.min(count.saturating_sub(1));
    let start = index.saturating_mul(PAGE_SIZE).min(items.len());
    let end = start.saturating_add(PAGE_SIZE).min(items.len());
    Page {
        items: &items[start..end],
        index,
        count,
    }
}

impl<T> Page<'_, T> {
    /// Offset of the first entry on this page.
    pub fn offset(&self) -> usize {
        self.index.saturating_mul(PAGE_SIZE)
    }

    /// Previous and next buttons. Empty when everything fits on one page.
    pub fn nav_row(&self, to: impl Fn(u32) -> Action) -> Vec<Button> {
        let mut row = Vec::new();
        if self.index > 0 {
            let prev = u32::try_from(self.index.saturating_sub(1)).unwrap_or(u32::MAX);
            row.push(Button::new("\u{25C0} Previous", to(prev)));
        }
        if self.index.saturating_add(1) < self.count {
            let next = u32::try_from(self.index.saturating_add(1)).unwrap_or(u32::MAX);
            row.push(Button::new("Next \u{25B6}", to(next)));
        }
        row
    }

    /// `Page 2/3`, or empty for a single page.
    pub fn label(&self) -> String {
        if self.count <= 1 {
            return String::new();
        }
        format!("Page {}/{}", self.index.saturating_add(1), self.count)
    }
}

/// A message to show a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// HTML body.
    pub text: String,
    /// Button rows.
    pub keyboard: Vec<Vec<Button>>,
    /// Photos and videos sent after the text.
    pub attachments: Vec<Attachment>,
}

/// A stored media file to resend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Photo or video.
    pub kind: MediaKind,
    /// Transport file id.
    pub file_id: String,
}

impl Reply {
    /// Plain reply without buttons.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Append a row of buttons.
    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.keyboard.push(row);
        }
        self
    }

    /// Append one button on its own row.
    pub fn with_button(self, button: Button) -> Self {
        self.with_row(vec![button])
    }

    /// Attach media files.
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments.extend(attachments);
        self
    }

    /// Every action on the keyboard, row by row.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.keyboard.iter().flatten().map(|b| &b.action)
    }
}

/// A labelled button carrying an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Visible label.
    pub label: String,
    /// What pressing it does.
    pub action: Action,
}

impl Button {
    /// Create a button.
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Main-menu destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    /// Back to the role menu.
    Home,
    /// Tasks assigned to me.
    MyTasks,
    /// Tasks I created.
    Created,
    /// Tasks of groups I administer.
    GroupTasks,
    /// Every task (super admin).
    AllTasks,
    /// Completed and cancelled tasks.
    Archive,
    /// Start the creation wizard.
    NewTask,
    /// Registration requests (super admin).
    Requests,
    /// Groups overview.
    Groups,
    /// Users overview.
    Users,
    /// My statistics.
    Stats,
    /// Command help.
    Help,
    /// Ask for registration.
    Register,
}

impl MenuItem {
    const TABLE: [(MenuItem, &'static str); 13] = [
        (MenuItem::Home, "home"),
        (MenuItem::MyTasks, "my"),
        (MenuItem::Created, "created"),
        (MenuItem::GroupTasks, "group"),
        (MenuItem::AllTasks, "all"),
        (MenuItem::Archive, "archive"),
        (MenuItem::NewTask, "new"),
        (MenuItem::Requests, "requests"),
        (MenuItem::Groups, "groups"),
        (MenuItem::Users, "users"),
        (MenuItem::Stats, "stats"),
        (MenuItem::Help, "help"),
        (MenuItem::Register, "register"),
    ];

    /// Short code used in callback data.
    pub fn code(&self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(item, _)| item == self)
            .map(|(_, code)| *code)
            .unwrap_or("home")
    }

    /// Parse a short code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(item, _)| *item)
    }
}

/// Something a button press asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open a menu.
    Menu(MenuItem),
    /// Show task details.
    View(i64),
    /// Show a task's media.
    Media(i64),
    /// Claim an open task or start an assigned one.
    Accept(i64),
    /// Decline a task.
    Decline(i64),
    /// Offer status choices for my assignment.
    ChooseMine(i64),
    /// Set my assignment status.
    SetMine(i64, TaskStatus),
    /// Offer task-level status choices (editors).
    ChooseTask(i64),
    /// Override the task status (editors).
    SetTask(i64, TaskStatus),
    /// Ask to delete a task.
    DeleteAsk(i64),
    /// Confirm deletion.
    DeleteConfirm(i64),
    /// Show one page of the users listing.
    UsersPage(u32),
    /// Show one page of the groups listing.
    GroupsPage(u32),
    /// Active tasks of one assignee.
    UserTasks(i64),
    /// Approve a registration request.
    Approve(i64),
    /// Reject a registration request.
    Reject(i64),
    /// Wizard: toggle an assignee.
    WizardToggle(i64),
    /// Wizard: pick a quick date (days from today).
    WizardDate(u8),
    /// Wizard: pick a quick due time (whole hour, 1 to 24).
    WizardTime(u8),
    /// Wizard: show another page of assignable users.
    WizardPage(u32),
    /// Wizard: return to the previous step.
    WizardBack,
    /// Wizard: return to a step already filled in.
    WizardForward,
    /// Wizard: skip the optional step.
    WizardSkip,
    /// Wizard: finish the current step.
    WizardNext,
    /// Wizard: create the task.
    WizardConfirm,
    /// Wizard: abort.
    WizardCancel,
}

fn status_code(status: TaskStatus) -> char {
    match status {
        TaskStatus::Pending => 'p',
        TaskStatus::InProgress => 'i',
        TaskStatus::Completed => 'c',
        TaskStatus::Cancelled => 'x',
    }
}

fn status_from_code(code: &str) -> Option<TaskStatus> {
    match code {
        "p" => Some(TaskStatus::Pending),
        "i" => Some(TaskStatus::InProgress),
        "c" => Some(TaskStatus::Completed),
        "x" => Some(TaskStatus::Cancelled),
        _ => None,
    }
}

impl Action {
    /// Encode as compact callback data, e.g. `v:42` or `sm:42:c`.
    pub fn encode(&self) -> String {
        match self {
            Self::Menu(item) => format!("m:{}", item.code()),
            Self::View(id) => format!("v:{id}"),
            Self::Media(id) => format!("md:{id}"),
            Self::Accept(id) => format!("ac:{id}"),
            Self::Decline(id) => format!("dc:{id}"),
            Self::ChooseMine(id) => format!("cm:{id}"),
            Self::SetMine(id, s) => format!("sm:{id}:{}", status_code(*s)),
            Self::ChooseTask(id) => format!("ct:{id}"),
            Self::SetTask(id, s) => format!("st:{id}:{}", status_code(*s)),
            Self::DeleteAsk(id) => format!("dl:{id}"),
            Self::DeleteConfirm(id) => format!("dy:{id}"),
            Self::UsersPage(page) => format!("up:{page}"),
            Self::GroupsPage(page) => format!("gp:{page}"),
            Self::UserTasks(id) => format!("ut:{id}"),
            Self::Approve(id) => format!("ra:{id}"),
            Self::Reject(id) => format!("rr:{id}"),
            Self::WizardToggle(id) => format!("wt:{id}"),
            Self::WizardDate(days) => format!("wd:{days}"),
            Self::WizardTime(hour) => format!("wh:{hour}"),
            Self::WizardPage(page) => format!("wp:{page}"),
            Self::WizardBack => "wb".to_owned(),
            Self::WizardForward => "wf".to_owned(),
            Self::WizardSkip => "ws".to_owned(),
            Self::WizardNext => "wn".to_owned(),
            Self::WizardConfirm => "wc".to_owned(),
            Self::WizardCancel => "wx".to_owned(),
        }
    }

    /// Parse callback data produced by [`Action::encode`].
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.split(':');
        let tag = parts.next()?;
        let id = |p: Option<&str>| p.and_then(|s| s.parse::<i64>().ok());

        let action = match tag {
            "m" => Self::Menu(MenuItem::from_code(parts.next()?)?),
            "v" => Self::View(id(parts.next())?),
            "md" => Self::Media(id(parts.next())?),
            "ac" => Self::Accept(id(parts.next())?),
            "dc" => Self::Decline(id(parts.next())?),
            "cm" => Self::ChooseMine(id(parts.next())?),
            "sm" => {
                let task = id(parts.next())?;
                Self::SetMine(task, status_from_code(parts.next()?)?)
            }
            "ct" => Self::ChooseTask(id(parts.next())?),
            "st" => {
                let task = id(parts.next())?;
                Self::SetTask(task, status_from_code(parts.next()?)?)
            }
            "dl" => Self::DeleteAsk(id(parts.next())?),
            "dy" => Self::DeleteConfirm(id(parts.next())?),
            "up" => Self::UsersPage(parts.next()?.parse().ok()?),
            "gp" => Self::GroupsPage(parts.next()?.parse().ok()?),
            "ut" => Self::UserTasks(id(parts.next())?),
            "ra" => Self::Approve(id(parts.next())?),
            "rr" => Self::Reject(id(parts.next())?),
            "wt" => Self::WizardToggle(id(parts.next())?),
            "wd" => Self::WizardDate(parts.next()?.parse().ok()?),
            "wh" => Self::WizardTime(parts.next()?.parse().ok()?),
            "wp" => Self::WizardPage(parts.next()?.parse().ok()?),
            "wb" => Self::WizardBack,
            "wf" => Self::WizardForward,
            "ws" => Self::WizardSkip,
            "wn" => Self::WizardNext,
            "wc" => Self::WizardConfirm,
            "wx" => Self::WizardCancel,
            _ => return None,
        };

        if parts.next().is_some() {
            return None;
        }
        Some(action)
    }
}
