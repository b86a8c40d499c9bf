use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use tracing::{info, warn};

use crate::commands::{self, CommandHandler};
use crate::platform::{DeliveryError, IncomingMessage, Outbound};

#[async_trait]
impl Outbound for Bot {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        self.send_message(ChatId(chat_id), text.to_string())
            .await
            .map(|_| ())
            .map_err(|e| DeliveryError {
                chat_id,
                reason: e.to_string(),
            })
    }
}

/// Publish the command list so Telegram clients show it in the menu
pub async fn register_commands(bot: &Bot) {
    let menu: Vec<BotCommand> = commands::menu()
        .map(|(command, description)| {
            BotCommand::new(command.trim_start_matches('/'), description)
        })
        .collect();

    match bot.set_my_commands(menu).await {
        Ok(_) => info!("Registered bot command menu"),
        Err(e) => warn!("Failed to register bot command menu: {}", e),
    }
}

/// Run the Telegram long-polling loop until shutdown
pub async fn run(handler: Arc<CommandHandler>, bot: Bot) {
    info!("Starting Telegram platform...");

    let tree = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, tree)
        .dependencies(dptree::deps![handler])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    handler: Arc<CommandHandler>,
) -> ResponseResult<()> {
    if let Some(incoming) = incoming_from(&msg) {
        handler.dispatch(&incoming, &bot).await;
    }
    Ok(())
}

/// Map a Telegram message to an `IncomingMessage`. Stickers, photos and
/// other non-text messages map to `None` and get no reply.
fn incoming_from(msg: &Message) -> Option<IncomingMessage> {
    let text = msg.text()?;

    // Chat username, falling back to the sender's first name
    let sender_name = msg
        .chat
        .username()
        .map(str::to_string)
        .or_else(|| msg.from.as_ref().map(|user| user.first_name.clone()))
        .unwrap_or_default();

    Some(IncomingMessage {
        chat_id: msg.chat.id.0,
        sender_name,
        text: text.to_string(),
    })
}
