//! Telegram UI rendering tests.

use teloxide::types::InlineKeyboardButtonKind;

use taskdesk::lifecycle::TaskStatus;
use taskdesk::reply::{Action, Button, MenuItem, Reply};
use taskdesk::telegram::ui::keyboard;

fn callback_data(kind: &InlineKeyboardButtonKind) -> &str {
    match kind {
        InlineKeyboardButtonKind::CallbackData(data) => data,
        other => panic!("expected callback data, got {other:?}"),
    }
}

#[test]
fn buttons_carry_encoded_actions() {
    let reply = Reply::text("Task #7").with_row(vec![
        Button::new("Start", Action::SetMine(7, TaskStatus::InProgress)),
        Button::new("Decline", Action::Decline(7)),
    ]);
    let markup = keyboard(&reply).expect("keyboard");
    let row = &markup.inline_keyboard[0];
    assert_eq!(row[0].text, "Start");

    for (button, action) in row
        .iter()
        .zip([Action::SetMine(7, TaskStatus::InProgress), Action::Decline(7)])
    {
        let data = callback_data(&button.kind);
        assert_eq!(Action::parse(data), Some(action));
    }
}

#[test]
fn callback_data_fits_telegram_limit() {
    let actions = [
        Action::Menu(MenuItem::Requests),
        Action::SetTask(i64::MAX, TaskStatus::InProgress),
        Action::WizardToggle(i64::MAX),
        Action::DeleteConfirm(i64::MAX),
    ];
    for action in actions {
        assert!(action.encode().len() <= 64, "{action:?} encodes too long");
    }
}

#[test]
fn plain_replies_have_no_markup() {
    assert!(keyboard(&Reply::text("done")).is_none());
}
