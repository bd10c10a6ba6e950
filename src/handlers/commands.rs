//! Slash command parsing and routing.

use super::tasks::EditField;
use super::{admin, menu, respond, stats, tasks, wizard, ChatUser, HandlerContext, HandlerError};
use crate::lifecycle::TaskStatus;
use crate::reply::{escape_html, Action, Reply};

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start`, `/menu`
    Start,
    /// `/help`
    Help,
    /// `/register`
    Register,
    /// `/cancel`
    Cancel,
    /// `/new`, `/create_task`
    New,
    /// `/skip` inside the wizard
    Skip,
    /// `/done` inside the wizard
    Done,
    /// `/my_tasks`, `/tasks`
    MyTasks,
    /// `/created`
    Created,
    /// `/list_tasks`: the widest active list the actor may see
    ListTasks,
    /// `/group_tasks [group]`
    GroupTasks(Option<i64>),
    /// `/all_tasks`
    AllTasks,
    /// `/archive`
    Archive,
    /// `/task <id>`
    Task(i64),
    /// `/accept <id>`
    Accept(i64),
    /// `/decline <id>`
    Decline(i64),
    /// `/status <id> <status>`
    MyStatus(i64, TaskStatus),
    /// `/task_status <id> <status>`
    TaskStatus(i64, TaskStatus),
    /// `/edit <id> <field> <value>`
    Edit(i64, EditField, String),
    /// `/delete <id>`
    Delete(i64),
    /// `/assign <task> <user>`
    Assign(i64, i64),
    /// `/unassign <task> <user>`
    Unassign(i64, i64),
    /// `/requests`
    Requests,
    /// `/approve <request>`
    Approve(i64),
    /// `/reject <request>`
    Reject(i64),
    /// `/groups`
    Groups,
    /// `/group_add <name>`
    GroupAdd(String),
    /// `/group_rename <group> <name>`
    GroupRename(i64, String),
    /// `/group_delete <group>`
    GroupDelete(i64),
    /// `/group_admin_add <group> <user>`
    GroupAdminAdd(i64, i64),
    /// `/group_admin_remove <group> <user>`
    GroupAdminRemove(i64, i64),
    /// `/member_add <group> <user>`, `/add_worker`
    MemberAdd(i64, i64),
    /// `/user_add <group> <user> <name>`, `/add_user`
    UserAdd(i64, i64, String),
    /// `/user_tasks <user> [group]`, `/tasks_of`
    UserTasks(i64, Option<i64>),
    /// `/member_remove <group> <user>`, `/remove_worker`
    MemberRemove(i64, i64),
    /// `/users`, `/list_workers`
    Users,
    /// `/user_name <user> <name>`
    UserName(i64, String),
    /// `/ban <user>`
    Ban(i64),
    /// `/unban <user>`
    Unban(i64),
    /// `/user_delete <user>`
    UserDelete(i64),
    /// `/stats [user]`, `/view_stats [user]`
    Stats(Option<i64>),
    /// `/my_stats`
    MyStats,
}

/// Why a command could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not a command we know.
    Unknown(String),
    /// Known command, wrong arguments. Holds the usage line.
    Usage(&'static str),
}

struct Args<'a> {
    rest: &'a str,
    usage: &'static str,
}

impl<'a> Args<'a> {
    fn word(&mut self) -> Result<&'a str, ParseError> {
        let trimmed = self.rest.trim_start();
        if trimmed.is_empty() {
            return Err(ParseError::Usage(self.usage));
        }
        let (word, rest) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        self.rest = rest;
        Ok(word)
    }

    fn id(&mut self) -> Result<i64, ParseError> {
        self.word()?
            .trim_start_matches('#')
            .parse()
            .map_err(|_| ParseError::Usage(self.usage))
    }

    fn optional_id(&mut self) -> Result<Option<i64>, ParseError> {
        if self.rest.trim().is_empty() {
            return Ok(None);
        }
        self.id().map(Some)
    }

    fn status(&mut self) -> Result<TaskStatus, ParseError> {
        TaskStatus::parse(self.word()?).map_err(|_| ParseError::Usage(self.usage))
    }

    fn text(&mut self) -> Result<String, ParseError> {
        let text = self.rest.trim();
        if text.is_empty() {
            return Err(ParseError::Usage(self.usage));
        }
        self.rest = "";
        Ok(text.to_owned())
    }
}

/// Parse `/name args`. A `@botname` suffix on the name is ignored.
pub fn parse_command(text: &str) -> Result<Command, ParseError> {
    let without_slash = text.trim().strip_prefix('/').unwrap_or(text.trim());
    let (full, rest) = without_slash
        .split_once(char::is_whitespace)
        .unwrap_or((without_slash, ""));
    let name = full.split('@').next().unwrap_or(full);

    let mut a = |usage: &'static str| Args { rest, usage };

    let command = match name {
        "start" | "menu" => Command::Start,
        "help" => Command::Help,
        "register" => Command::Register,
        "cancel" => Command::Cancel,
        "new" | "create_task" => Command::New,
        "skip" => Command::Skip,
        "done" => Command::Done,
        "my_tasks" | "tasks" => Command::MyTasks,
        "created" => Command::Created,
        "list_tasks" => Command::ListTasks,
        "group_tasks" => Command::GroupTasks(a("/group_tasks [group id]").optional_id()?),
        "all_tasks" => Command::AllTasks,
        "archive" => Command::Archive,
        "task" => Command::Task(a("/task <id>").id()?),
        "accept" => Command::Accept(a("/accept <task id>").id()?),
        "decline" => Command::Decline(a("/decline <task id>").id()?),
        "status" => {
            let mut args = a("/status <task id> <pending|in_progress|completed>");
            Command::MyStatus(args.id()?, args.status()?)
        }
        "task_status" => {
            let mut args = a("/task_status <task id> <pending|in_progress|completed|cancelled>");
            Command::TaskStatus(args.id()?, args.status()?)
        }
        "edit" => {
            let usage = "/edit <task id> <title|description|date|time> <value>";
            let mut args = a(usage);
            let id = args.id()?;
            let field = EditField::parse(args.word()?).ok_or(ParseError::Usage(usage))?;
            Command::Edit(id, field, args.text()?)
        }
        "delete" => Command::Delete(a("/delete <task id>").id()?),
        "assign" => {
            let mut args = a("/assign <task id> <user id>");
            Command::Assign(args.id()?, args.id()?)
        }
        "unassign" => {
            let mut args = a("/unassign <task id> <user id>");
            Command::Unassign(args.id()?, args.id()?)
        }
        "requests" => Command::Requests,
        "approve" => Command::Approve(a("/approve <request id>").id()?),
        "reject" => Command::Reject(a("/reject <request id>").id()?),
        "groups" => Command::Groups,
        "group_add" => Command::GroupAdd(a("/group_add <name>").text()?),
        "group_rename" => {
            let mut args = a("/group_rename <group id> <name>");
            Command::GroupRename(args.id()?, args.text()?)
        }
        "group_delete" => Command::GroupDelete(a("/group_delete <group id>").id()?),
        "group_admin_add" => {
            let mut args = a("/group_admin_add <group id> <user id>");
            Command::GroupAdminAdd(args.id()?, args.id()?)
        }
        "group_admin_remove" => {
            let mut args = a("/group_admin_remove <group id> <user id>");
            Command::GroupAdminRemove(args.id()?, args.id()?)
        }
        "member_add" | "add_worker" => {
            let mut args = a("/member_add <group id> <user id>");
            Command::MemberAdd(args.id()?, args.id()?)
        }
        "user_add" | "add_user" => {
            let mut args = a("/user_add <group id> <telegram id> <name>");
            Command::UserAdd(args.id()?, args.id()?, args.text()?)
        }
        "user_tasks" | "tasks_of" => {
            let mut args = a("/user_tasks <user id> [group id]");
            Command::UserTasks(args.id()?, args.optional_id()?)
        }
        "member_remove" | "remove_worker" => {
            let mut args = a("/member_remove <group id> <user id>");
            Command::MemberRemove(args.id()?, args.id()?)
        }
        "users" | "list_workers" => Command::Users,
        "user_name" => {
            let mut args = a("/user_name <user id> <name>");
            Command::UserName(args.id()?, args.text()?)
        }
        "ban" => Command::Ban(a("/ban <user id>").id()?),
        "unban" => Command::Unban(a("/unban <user id>").id()?),
        "user_delete" => Command::UserDelete(a("/user_delete <user id>").id()?),
        "stats" | "view_stats" => Command::Stats(a("/stats [user id]").optional_id()?),
        "my_stats" => Command::MyStats,
        other => return Err(ParseError::Unknown(other.to_owned())),
    };
    Ok(command)
}

/// Parse and run a slash command, returning the reply.
pub async fn run_command(ctx: &HandlerContext, user: &ChatUser, text: &str) -> Reply {
    let command = match parse_command(text) {
        Ok(command) => command,
        Err(ParseError::Unknown(name)) => {
            return Reply::text(format!(
                "Unknown command: /{}. Send /help for the list.",
                escape_html(&name)
            ))
        }
        Err(ParseError::Usage(usage)) => {
            return Reply::text(format!("Usage: <code>{}</code>", escape_html(usage)))
        }
    };
    execute(ctx, user, command).await
}

/// Run an already parsed command.
pub async fn execute(ctx: &HandlerContext, user: &ChatUser, command: Command) -> Reply {
    let uid = user.id;
    let result = match command {
        Command::Start => menu::start(ctx, user).await,
        Command::Help => menu::help(ctx, uid).await,
        Command::Register => menu::register(ctx, user).await,
        Command::Cancel => Ok(wizard::cancel(ctx, uid)),
        Command::New => wizard::new_task(ctx, uid).await,
        Command::Skip => wizard::wizard_action(ctx, uid, Action::WizardSkip).await,
        Command::Done => wizard::wizard_action(ctx, uid, Action::WizardNext).await,
        Command::MyTasks => tasks::my_tasks(ctx, uid).await,
        Command::Created => tasks::created_tasks(ctx, uid).await,
        Command::ListTasks => list_tasks(ctx, uid).await,
        Command::GroupTasks(group) => tasks::group_tasks(ctx, uid, group).await,
        Command::AllTasks => tasks::all_tasks(ctx, uid).await,
        Command::Archive => tasks::archive(ctx, uid).await,
        Command::Task(id) => tasks::task_detail(ctx, uid, id).await,
        Command::Accept(id) => tasks::accept(ctx, uid, id).await,
        Command::Decline(id) => tasks::decline(ctx, uid, id).await,
        Command::MyStatus(id, status) => tasks::set_my_status(ctx, uid, id, status).await,
        Command::TaskStatus(id, status) => tasks::set_task_status(ctx, uid, id, status).await,
        Command::Edit(id, field, value) => tasks::edit_task(ctx, uid, id, field, &value).await,
        Command::Delete(id) => tasks::delete_ask(ctx, uid, id).await,
        Command::Assign(id, target) => tasks::assign(ctx, uid, id, target).await,
        Command::Unassign(id, target) => tasks::unassign(ctx, uid, id, target).await,
        Command::Requests => admin::requests(ctx, uid).await,
        Command::Approve(id) => admin::approve(ctx, uid, id).await,
        Command::Reject(id) => admin::reject(ctx, uid, id).await,
        Command::Groups => admin::groups(ctx, uid, 0).await,
        Command::GroupAdd(name) => admin::group_add(ctx, uid, &name).await,
        Command::GroupRename(id, name) => admin::group_rename(ctx, uid, id, &name).await,
        Command::GroupDelete(id) => admin::group_delete(ctx, uid, id).await,
        Command::GroupAdminAdd(g, u) => admin::group_admin_add(ctx, uid, g, u).await,
        Command::GroupAdminRemove(g, u) => admin::group_admin_remove(ctx, uid, g, u).await,
        Command::MemberAdd(g, u) => admin::member_add(ctx, uid, g, u).await,
        Command::MemberRemove(g, u) => admin::member_remove(ctx, uid, g, u).await,
        Command::UserAdd(g, u, name) => admin::user_add(ctx, uid, g, u, &name).await,
        Command::UserTasks(u, g) => tasks::assignee_tasks(ctx, uid, u, g).await,
        Command::Users => admin::users(ctx, uid, 0).await,
        Command::UserName(id, name) => admin::user_name(ctx, uid, id, &name).await,
        Command::Ban(id) => admin::ban(ctx, uid, id).await,
        Command::Unban(id) => admin::unban(ctx, uid, id).await,
        Command::UserDelete(id) => admin::user_delete(ctx, uid, id).await,
        Command::Stats(target) => stats::stats(ctx, uid, target).await,
        Command::MyStats => stats::stats(ctx, uid, Some(uid)).await,
    };
    respond(result)
}

async fn list_tasks(ctx: &HandlerContext, user_id: i64) -> Result<Reply, HandlerError> {
    let actor = ctx.actor(user_id).await?;
    if actor.is_super_admin {
        tasks::all_tasks(ctx, user_id).await
    } else if actor.is_any_group_admin() {
        tasks::group_tasks(ctx, user_id, None).await
    } else {
        tasks::created_tasks(ctx, user_id).await
    }
}
