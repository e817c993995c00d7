//! Notification presenter seam and the console implementation used by the CLI.

use crate::message::InboundMessage;
use async_trait::async_trait;

/// Renders a user-visible notification for a message.
#[async_trait]
pub trait NotificationPresenter: Send + Sync {
    async fn present(
        &self,
        message: &InboundMessage,
        channel_id: Option<&str>,
        icon: Option<i64>,
    ) -> anyhow::Result<()>;
}

/// Prints a one-line notification to stdout, built from the `title` and `body` data keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolePresenter;

impl ConsolePresenter {
    pub fn render(message: &InboundMessage, channel_id: Option<&str>, icon: Option<i64>) -> String {
        let mut line = format!("[{}]", channel_id.unwrap_or("default"));
        if let Some(icon) = icon {
            line.push_str(&format!(" icon={}", icon));
        }
        match (message.get("title"), message.get("body")) {
            (Some(t), Some(b)) => line.push_str(&format!(" {}: {}", t, b)),
            (Some(t), None) => line.push_str(&format!(" {}", t)),
            (None, Some(b)) => line.push_str(&format!(" {}", b)),
            (None, None) => line.push_str(" (new message)"),
        }
        line
    }
}

#[async_trait]
impl NotificationPresenter for ConsolePresenter {
    async fn present(
        &self,
        message: &InboundMessage,
        channel_id: Option<&str>,
        icon: Option<i64>,
    ) -> anyhow::Result<()> {
        println!("{}", Self::render(message, channel_id, icon));
        Ok(())
    }
}
