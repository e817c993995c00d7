//! User-visible notification: the presentation policy, the presenter seam, and the observer
//! the host application may register.

mod decision;
mod observer;
mod presenter;

pub use decision::should_present;
pub use observer::{MessageObserver, ObserverSlot};
pub use presenter::{ConsolePresenter, NotificationPresenter};
