//! Telegram front end: commands, link requests, polling loop.
//!
//! Each inbound message is handled on its own task. Two limits apply:
//!
//! - a requester has at most one request in flight; a second link from the
//!   same user is turned away while the first runs, since both would share
//!   the `temp-{requester}` workspace;
//! - at most `max_concurrent_requests` downloads run at once across all
//!   users; further requests wait for a slot after being acknowledged.
//!
//! Requesters only ever see the fixed messages below. Failure details go to
//! the log, tagged with the stage that failed.

use crate::config::{BotConfig, PipelineConfig};
use crate::convert::download_book;
use crate::delivery::{Delivery, TransferShDelivery};
use crate::error::Vatlib2PdfError;
use crate::pipeline::link;
use crate::progress::PipelineProgressCallback;
use crate::telegram::{ChatSink, Message, TelegramClient, User};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub const INFO_TEXT: &str = "This is a bot created to download books in PDF format from the \
Digital Vatican Library website: https://digi.vatlib.it/\n\
Just send a link and if it is valid the bot will convert the book in pdf format and send it to you.";

pub const INVALID_LINK_REPLY: &str = "The message does not contain any valid link.";

pub const ACKNOWLEDGEMENT: &str = "Trying to process your request, do not send more messages \
and wait for a confirmation message.\n\
If the book has a lot of pages this could take a while (5-20 minutes), please wait...";

pub const ASSEMBLING_NOTICE: &str = "Pages downloaded, creating PDF...";

pub const FAILURE_REPLY: &str = "For some reason i could not download the book you requested.";

pub const BUSY_REPLY: &str =
    "Your previous request is still being processed, please wait for it to finish.";

const POLL_ERROR_PAUSE: Duration = Duration::from_secs(5);

pub fn start_reply(full_name: &str) -> String {
    format!("Hi {full_name}!\n Send me a link to download a book.")
}

pub fn success_reply(location: &str) -> String {
    format!("Here's your download link:\n{location}")
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Start,
    Info,
    Unknown(&'a str),
    /// Plain text; treated as a link request.
    Text(&'a str),
}

/// `/start`, `/start@SomeBot` and `/start arg` are all `Start`.
fn parse_command(text: &str) -> Command<'_> {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Command::Text(text);
    };
    let word = rest.split_whitespace().next().unwrap_or("");
    let name = word.split('@').next().unwrap_or("");
    match name {
        "start" => Command::Start,
        "info" => Command::Info,
        _ => Command::Unknown(word),
    }
}

/// Requesters with a request currently running.
#[derive(Debug, Default)]
struct InFlight {
    active: Mutex<HashSet<String>>,
}

impl InFlight {
    /// Register `requester`; `None` when they already have a request running.
    fn try_claim(self: &Arc<Self>, requester: &str) -> Option<InFlightGuard> {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if !active.insert(requester.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            registry: Arc::clone(self),
            requester: requester.to_string(),
        })
    }
}

struct InFlightGuard {
    registry: Arc<InFlight>,
    requester: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut active = self
            .registry
            .active
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        active.remove(&self.requester);
    }
}

/// Forwards the "assembly started" event to the chat handler.
struct ChatProgress {
    notes: mpsc::UnboundedSender<&'static str>,
}

impl PipelineProgressCallback for ChatProgress {
    fn on_assembly_start(&self, _total_pages: usize) {
        let _ = self.notes.send(ASSEMBLING_NOTICE);
    }
}

/// Message handling, independent of how messages arrive.
pub struct Bot {
    sink: Arc<dyn ChatSink>,
    delivery: Arc<dyn Delivery>,
    pipeline: PipelineConfig,
    in_flight: Arc<InFlight>,
    limiter: Arc<Semaphore>,
}

impl Bot {
    pub fn new(
        sink: Arc<dyn ChatSink>,
        delivery: Arc<dyn Delivery>,
        pipeline: PipelineConfig,
        max_concurrent_requests: usize,
    ) -> Self {
        Self {
            sink,
            delivery,
            pipeline,
            in_flight: Arc::new(InFlight::default()),
            limiter: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
        }
    }

    /// Dispatch one inbound message.
    pub async fn handle_message(&self, message: &Message) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let chat_id = message.chat.id;

        match parse_command(text) {
            Command::Start => {
                let name = message
                    .from
                    .as_ref()
                    .map(User::full_name)
                    .unwrap_or_default();
                self.say(chat_id, &start_reply(&name)).await;
            }
            Command::Info => self.say(chat_id, INFO_TEXT).await,
            Command::Unknown(cmd) => debug!("Ignoring command {}", cmd),
            Command::Text(text) => {
                // Channel posts carry no sender.
                let requester = message
                    .from
                    .as_ref()
                    .map(|u| u.id)
                    .unwrap_or(chat_id)
                    .to_string();
                self.handle_link(chat_id, &requester, text).await;
            }
        }
    }

    /// Process a link request from `requester`, replying into `chat_id`.
    pub async fn handle_link(&self, chat_id: i64, requester: &str, text: &str) {
        let link = match link::validate(text, &self.pipeline.base_url) {
            Ok(link) => link,
            Err(e) => {
                debug!("Rejected message from {}: {}", requester, e);
                self.say(chat_id, &e.to_string()).await;
                return;
            }
        };

        let Some(_claim) = self.in_flight.try_claim(requester) else {
            info!("Requester {} already has a request running", requester);
            self.say(chat_id, BUSY_REPLY).await;
            return;
        };

        self.say(chat_id, ACKNOWLEDGEMENT).await;

        let Ok(_permit) = self.limiter.acquire().await else {
            self.say(chat_id, FAILURE_REPLY).await;
            return;
        };

        let (notes_tx, mut notes) = mpsc::unbounded_channel();
        let mut pipeline = self.pipeline.clone();
        pipeline.progress_callback = Some(Arc::new(ChatProgress { notes: notes_tx }));

        let request = download_book(&link, requester, &pipeline, self.delivery.as_ref());
        tokio::pin!(request);
        let result = loop {
            tokio::select! {
                result = &mut request => break result,
                Some(note) = notes.recv() => self.say(chat_id, note).await,
            }
        };
        while let Ok(note) = notes.try_recv() {
            self.say(chat_id, note).await;
        }

        match result {
            Ok(outcome) => {
                self.say(chat_id, &success_reply(&outcome.receipt.location))
                    .await
            }
            // Already logged with its stage by download_book.
            Err(_) => self.say(chat_id, FAILURE_REPLY).await,
        }
    }

    async fn say(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.sink.reply(chat_id, text).await {
            warn!("Could not reply to chat {}: {}", chat_id, e);
        }
    }
}

/// Poll Telegram until Ctrl-C, handling each message on its own task.
///
/// On shutdown, running requests are aborted; their workspaces are removed
/// as the tasks unwind.
pub async fn run(config: &BotConfig, pipeline: PipelineConfig) -> Result<(), Vatlib2PdfError> {
    let client = Arc::new(TelegramClient::new(config)?);
    let delivery = Arc::new(TransferShDelivery::new(
        &config.upload_endpoint,
        config.upload_timeout(),
    )?);
    let bot = Arc::new(Bot::new(
        client.clone(),
        delivery,
        pipeline,
        config.max_concurrent_requests,
    ));

    info!(
        "Bot started (max {} concurrent requests), polling for messages",
        config.max_concurrent_requests
    );
    poll_until(&client, bot, interrupted()).await;
    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the signal cannot be watched.
async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received, shutting down"),
        Err(e) => {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// The polling loop, stopped by `shutdown` at any await point, including the
/// pause after a failed poll.
async fn poll_until(
    client: &TelegramClient,
    bot: Arc<Bot>,
    shutdown: impl std::future::Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut offset = 0i64;

    loop {
        let polled = tokio::select! {
            _ = &mut shutdown => break,
            polled = client.get_updates(offset) => polled,
        };

        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                if e.is_panic() {
                    error!("Request task panicked: {}", e);
                }
            }
        }

        match polled {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    if let Some(message) = update.message {
                        let bot = Arc::clone(&bot);
                        tasks.spawn(async move { bot.handle_message(&message).await });
                    }
                }
            }
            Err(e) => {
                warn!("Polling failed: {}", e);
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(POLL_ERROR_PAUSE) => {}
                }
            }
        }
    }

    if !tasks.is_empty() {
        info!("Aborting {} running request(s)", tasks.len());
    }
    tasks.shutdown().await;
}
