use chrono::{Local, NaiveDate};
use tracing::{error, info};

use crate::platform::{IncomingMessage, Outbound};
use crate::rates::{Currency, RateService};

/// Commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Usd,
    Eur,
    Help,
    Unknown,
}

/// Command texts, matched exactly, with their menu descriptions.
const COMMAND_TABLE: &[(&str, Command, &str)] = &[
    ("/start", Command::Start, "приветствие и список команд"),
    ("/usd", Command::Usd, "курс доллара"),
    ("/eur", Command::Eur, "курс евро"),
    ("/help", Command::Help, "получение помощи"),
];

impl Command {
    pub fn parse(text: &str) -> Self {
        COMMAND_TABLE
            .iter()
            .find(|(command, _, _)| *command == text)
            .map(|(_, command, _)| *command)
            .unwrap_or(Command::Unknown)
    }
}

/// `(command, description)` pairs for the platform's command menu.
pub fn menu() -> impl Iterator<Item = (&'static str, &'static str)> {
    COMMAND_TABLE
        .iter()
        .map(|(command, _, description)| (*command, *description))
}

pub const AUTHOR_BLOCK: &str = "___________________________________\n\
     Автор: Кадыркулов Ызаат\n\
     Специалист в области информационных технологий\n\
     и программирования.\n\
     ___________________________________";

pub const HELP_TEXT: &str = "Фон информации о боте.\n\n\
     Используйте команды, чтобы получить текущие обменные курсы:\n\
     /usd - курс доллара\n\
     /eur - курс евро\n";

pub const UNKNOWN_TEXT: &str = "Напишите правильную команду!";

pub fn start_text(user_name: &str) -> String {
    format!(
        "Добро пожаловать в бот, {user_name}\n\
         {AUTHOR_BLOCK}\n\n\
         Здесь вы можете ознакомиться с официальными курсами, установленными \
         Центральным банком Российской Федерации на сегодняшний день.\n\n\
         Для этого используйте команды:\n\n\
         /usd - курс доллара\n\
         /eur - курс евро\n\n\
         Дополнительные команды:\n\
         /help - получение помощи\n"
    )
}

pub fn rate_text(currency: Currency, date: NaiveDate, value: &str) -> String {
    match currency {
        Currency::Usd => format!("Курс доллара на {date} составляет {value} рублей."),
        Currency::Eur => format!("Курс евро на {date} составляет {value} рублей."),
    }
}

pub fn apology_text(currency: Currency) -> &'static str {
    match currency {
        Currency::Usd => "Не удалось получить текущий курс доллара. Попробуйте позже",
        Currency::Eur => "Не удалось получить текущий курс евро. Попробуйте позже",
    }
}

/// Turns chat messages into replies. Holds no per-chat state.
pub struct CommandHandler {
    rates: RateService,
}

impl CommandHandler {
    pub fn new(rates: RateService) -> Self {
        Self { rates }
    }

    /// Build the reply for `msg`, dating rate replies with today's local date.
    pub async fn handle(&self, msg: &IncomingMessage) -> String {
        self.handle_on(msg, Local::now().date_naive()).await
    }

    /// Build the reply for `msg` as of `today`. Rate failures are logged and
    /// answered with an apology; this never fails.
    pub async fn handle_on(&self, msg: &IncomingMessage, today: NaiveDate) -> String {
        match Command::parse(&msg.text) {
            Command::Start => start_text(&msg.sender_name),
            Command::Usd => self.rate_reply(Currency::Usd, today).await,
            Command::Eur => self.rate_reply(Currency::Eur, today).await,
            Command::Help => HELP_TEXT.to_string(),
            Command::Unknown => UNKNOWN_TEXT.to_string(),
        }
    }

    async fn rate_reply(&self, currency: Currency, today: NaiveDate) -> String {
        match self.rates.current_rate(currency).await {
            Ok(value) => rate_text(currency, today, &value),
            Err(e) => {
                error!(
                    "Failed to get {} rate ({}): {:#}",
                    currency,
                    self.rates.query_for(currency).currency_id,
                    e
                );
                apology_text(currency).to_string()
            }
        }
    }

    /// Reply to `msg` through `outbound`. Delivery failures are logged and
    /// dropped.
    pub async fn dispatch(&self, msg: &IncomingMessage, outbound: &dyn Outbound) {
        info!(
            "Message from {} in chat {}: {}",
            msg.sender_name, msg.chat_id, msg.text
        );

        let reply = self.handle(msg).await;
        if let Err(e) = outbound.send_text(msg.chat_id, &reply).await {
            error!("Failed to deliver reply: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::platform::DeliveryError;
    use crate::rates::testing::{default_queries, feed_with, StaticFeed};

    fn handler(feed: StaticFeed) -> (CommandHandler, Arc<StaticFeed>) {
        let feed = Arc::new(feed);
        let (usd, eur) = default_queries();
        let rates = RateService::new(feed.clone(), usd, eur);
        (CommandHandler::new(rates), feed)
    }

    fn message(text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: 42,
            sender_name: "Ivan".to_string(),
            text: text.to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    #[derive(Default)]
    struct RecordingOutbound {
        sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl Outbound for RecordingOutbound {
        async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    struct FailingOutbound;

    #[async_trait]
    impl Outbound for FailingOutbound {
        async fn send_text(&self, chat_id: i64, _text: &str) -> Result<(), DeliveryError> {
            Err(DeliveryError {
                chat_id,
                reason: "Forbidden: bot was blocked by the user".to_string(),
            })
        }
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Run `fut` on a fresh runtime and return whatever it logged.
    fn capture_logs<F: std::future::Future<Output = ()>>(fut: F) -> String {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        tracing::subscriber::with_default(subscriber, || rt.block_on(fut));
        logs.contents()
    }

    #[test]
    fn test_parse_recognized_commands() {
        assert_eq!(Command::parse("/start"), Command::Start);
        assert_eq!(Command::parse("/usd"), Command::Usd);
        assert_eq!(Command::parse("/eur"), Command::Eur);
        assert_eq!(Command::parse("/help"), Command::Help);
    }

    #[test]
    fn test_parse_is_exact_match_only() {
        for text in [
            "", "/random", "/USD", " /usd", "/usd ", "/usd@some_bot", "usd", "/usd\n/eur", "hello",
        ] {
            assert_eq!(Command::parse(text), Command::Unknown, "{text:?}");
        }
    }

    #[test]
    fn test_menu_lists_every_command() {
        let commands: Vec<&str> = menu().map(|(command, _)| command).collect();
        assert_eq!(commands, vec!["/start", "/usd", "/eur", "/help"]);
    }

    #[tokio::test]
    async fn test_start_greets_sender_with_author_block() {
        let (handler, feed) = handler(StaticFeed::failing());
        let reply = handler.handle(&message("/start")).await;

        assert!(reply.starts_with("Добро пожаловать в бот, Ivan\n"));
        assert!(reply.contains(AUTHOR_BLOCK));
        assert!(reply.contains("/usd - курс доллара"));
        assert!(reply.contains("/help - получение помощи"));
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test]
    async fn test_usd_reply_embeds_date_and_value() {
        let (handler, feed) = handler(StaticFeed::ok(&feed_with("91.0", "99.1")));
        let reply = handler.handle_on(&message("/usd"), today()).await;

        assert_eq!(reply, "Курс доллара на 2026-10-18 составляет 91.0 рублей.");
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn test_eur_reply_keeps_feed_formatting() {
        let (handler, _) = handler(StaticFeed::ok(&feed_with("91,0", "99,1234")));
        let reply = handler.handle_on(&message("/eur"), today()).await;

        assert_eq!(reply, "Курс евро на 2026-10-18 составляет 99,1234 рублей.");
    }

    #[tokio::test]
    async fn test_every_rate_request_fetches_fresh_feed() {
        let (handler, feed) = handler(StaticFeed::ok(&feed_with("91.0", "99.1")));
        handler.handle(&message("/usd")).await;
        handler.handle(&message("/usd")).await;
        handler.handle(&message("/eur")).await;
        assert_eq!(feed.calls(), 3);
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_apology() {
        let (handler, _) = handler(StaticFeed::failing());

        assert_eq!(
            handler.handle(&message("/usd")).await,
            "Не удалось получить текущий курс доллара. Попробуйте позже"
        );
        assert_eq!(
            handler.handle(&message("/eur")).await,
            "Не удалось получить текущий курс евро. Попробуйте позже"
        );
    }

    #[tokio::test]
    async fn test_malformed_feed_becomes_apology() {
        let (handler, _) = handler(StaticFeed::ok("<ValCurs><Valute ID=\"R01235\">"));
        assert_eq!(handler.handle(&message("/usd")).await, apology_text(Currency::Usd));
    }

    #[tokio::test]
    async fn test_missing_currency_gives_empty_value() {
        // A feed without the requested currency is not an error: the value is empty
        let xml = "<ValCurs><Valute ID=\"R01010\"><Value>60,1</Value></Valute></ValCurs>";
        let (handler, _) = handler(StaticFeed::ok(xml));
        let reply = handler.handle_on(&message("/usd"), today()).await;
        assert_eq!(reply, "Курс доллара на 2026-10-18 составляет  рублей.");
    }

    #[tokio::test]
    async fn test_help_and_unknown_replies() {
        let (handler, feed) = handler(StaticFeed::failing());

        assert_eq!(handler.handle(&message("/help")).await, HELP_TEXT);
        assert_eq!(handler.handle(&message("/random")).await, UNKNOWN_TEXT);
        assert_eq!(handler.handle(&message("")).await, UNKNOWN_TEXT);
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_sends_reply_to_origin_chat() {
        let (handler, _) = handler(StaticFeed::failing());
        let outbound = RecordingOutbound::default();

        handler.dispatch(&message("/random"), &outbound).await;

        let sent = outbound.sent.lock().unwrap();
        assert_eq!(sent.as_slice(), &[(42, UNKNOWN_TEXT.to_string())]);
    }

    #[test]
    fn test_dispatch_logs_and_swallows_delivery_failure() {
        let (handler, _) = handler(StaticFeed::failing());

        let logs = capture_logs(async {
            handler.dispatch(&message("/help"), &FailingOutbound).await;
        });

        assert!(logs.contains("Failed to deliver reply"));
        assert!(logs.contains("bot was blocked by the user"));
    }

    #[test]
    fn test_rate_failure_is_logged() {
        let (handler, _) = handler(StaticFeed::failing());

        let logs = capture_logs(async {
            let reply = handler.handle(&message("/eur")).await;
            assert_eq!(reply, apology_text(Currency::Eur));
        });

        assert!(logs.contains("Failed to get EUR rate (R01239)"));
        assert!(logs.contains("status 503"));
    }
}
