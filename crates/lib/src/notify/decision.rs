//! Whether a received message gets a user-visible notification.

use crate::notify::observer::MessageObserver;
use crate::probe::AppState;

/// Suppress only when the app is in the foreground and a registered observer declines
/// foreground notifications.
pub fn should_present(state: AppState, observer: Option<&dyn MessageObserver>) -> bool {
    match observer {
        _ if state != AppState::Foreground => true,
        None => true,
        Some(o) => o.wants_foreground_notification(),
    }
}
