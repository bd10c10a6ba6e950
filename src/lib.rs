//! taskdesk: task assignment for organisational groups over Telegram.
//!
//! Super admins manage users and groups, group admins and super admins create
//! and assign tasks, workers accept, decline and report progress. State lives
//! in SQLite; the bot, the reminder loop and a read-only dashboard share it.
//!
//! See `DESIGN.md` for the architecture.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod store;

pub mod lifecycle;
pub mod permissions;

pub mod handlers;
pub mod notify;
pub mod reply;

pub mod dashboard;
pub mod reminders;
pub mod telegram;
