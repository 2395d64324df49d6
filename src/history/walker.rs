use crate::error::{FetchFailure, HistoryError, PermanentFailure, WarnCode};
use crate::history::bucketer::DateBucketer;
use crate::history::fetcher::PageFetcher;
use crate::history::model::{
    ChatRef, Checkpoint, DayClock, MessageMark, Page, WalkResult,
};
use crate::history::warn::{self, WarnEvent};
use crate::history::writer::BucketSink;
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Largest page the remote API serves.
pub const MAX_PAGE_SIZE: usize = 100;

pub const CANCELLED_REASON: &str = "cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts allowed for one request after a transient failure.
    pub budget: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * (attempt + 1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Caller-side abort, observed between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct WalkSettings {
    pub page_size: usize,
    pub retry: RetryPolicy,
    pub clock: DayClock,
}

#[derive(Debug, Clone)]
pub struct WalkOutcome {
    pub result: WalkResult,
    pub messages_consumed: u64,
    pub pages_fetched: u64,
    /// First message consumed by this walk.
    pub newest: Option<MessageMark>,
}

enum WalkState {
    Fetching,
    Bucketing(Page),
    Done,
    Interrupted { reason: String },
}

pub struct HistoryWalker<F> {
    fetcher: F,
    chat: ChatRef,
    settings: WalkSettings,
    cancel: CancelToken,
}

impl<F: PageFetcher> HistoryWalker<F> {
    pub fn new(fetcher: F, chat: ChatRef, settings: WalkSettings) -> Result<Self, HistoryError> {
        if settings.page_size == 0 || settings.page_size > MAX_PAGE_SIZE {
            return Err(HistoryError::Configuration(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                settings.page_size
            )));
        }
        if chat.chat_id.trim().is_empty() {
            return Err(HistoryError::Configuration(
                "chat reference has an empty chat id".to_string(),
            ));
        }
        Ok(Self {
            fetcher,
            chat,
            settings,
            cancel: CancelToken::default(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn chat(&self) -> &ChatRef {
        &self.chat
    }

    /// Walks from the newest message (or from `resume`) to exhaustion.
    ///
    /// `remaining` bounds the walk by a known message count. Buckets reach
    /// `sink` newest day first. A mid-walk fault ends in
    /// [`WalkResult::Interrupted`] with everything consumed so far already
    /// handed to `sink`; a fault before anything was consumed on a fresh walk
    /// is [`HistoryError::NothingFetched`].
    pub fn walk(
        &self,
        resume: Option<&Checkpoint>,
        remaining: Option<u64>,
        sink: &mut dyn BucketSink,
    ) -> Result<WalkOutcome> {
        let mut bucketer = DateBucketer::new(self.settings.clock);
        let mut cursor: Option<String> = resume.map(|c| c.cursor.clone());
        let mut last: Option<MessageMark> = resume.map(|c| MessageMark {
            id: c.cursor.clone(),
            date_key: c.date_key,
        });
        let mut newest: Option<MessageMark> = None;
        let mut remaining = remaining;
        let mut consumed = 0u64;
        let mut pages = 0u64;
        let mut state = WalkState::Fetching;

        loop {
            state = match state {
                WalkState::Fetching => {
                    if remaining == Some(0) {
                        WalkState::Done
                    } else if self.cancel.is_cancelled() {
                        WalkState::Interrupted {
                            reason: CANCELLED_REASON.to_string(),
                        }
                    } else {
                        match self.fetch_with_retry(cursor.as_deref()) {
                            Ok(page) if page.is_exhausted(cursor.as_deref()) => WalkState::Done,
                            Ok(page) => {
                                pages += 1;
                                WalkState::Bucketing(page)
                            }
                            Err(PermanentFailure::Exhausted) => WalkState::Done,
                            Err(PermanentFailure::Fault { reason }) => {
                                WalkState::Interrupted { reason }
                            }
                        }
                    }
                }
                WalkState::Bucketing(page) => {
                    let take = match remaining {
                        Some(left) => page.len().min(usize::try_from(left).unwrap_or(usize::MAX)),
                        None => page.len(),
                    };
                    for message in page.messages.into_iter().take(take) {
                        let mark = MessageMark {
                            id: message.id.clone(),
                            date_key: self.settings.clock.day_of(&message),
                        };
                        bucketer.accept(message);
                        while let Some(bucket) = bucketer.flush_ready() {
                            sink.append_bucket(&bucket)?;
                        }
                        if newest.is_none() {
                            newest = Some(mark.clone());
                        }
                        last = Some(mark);
                        consumed += 1;
                    }
                    cursor = last.as_ref().map(|m| m.id.clone());
                    remaining = remaining.map(|left| left.saturating_sub(take as u64));
                    WalkState::Fetching
                }
                WalkState::Done => {
                    if let Some(bucket) = bucketer.finish() {
                        sink.append_bucket(&bucket)?;
                    }
                    return Ok(WalkOutcome {
                        result: WalkResult::Completed,
                        messages_consumed: consumed,
                        pages_fetched: pages,
                        newest,
                    });
                }
                WalkState::Interrupted { reason } => {
                    if let Some(bucket) = bucketer.finish() {
                        sink.append_bucket(&bucket)?;
                    }
                    let chat = self.chat.to_string();
                    let Some(mark) = last else {
                        return Err(HistoryError::NothingFetched(reason).into());
                    };
                    warn::emit(WarnEvent {
                        action: "checkpoint",
                        chat: &chat,
                        cursor: &mark.id,
                        reason: &reason,
                        ..WarnEvent::new(WarnCode::W003WalkInterrupted, "walk")
                    });
                    let checkpoint = Checkpoint {
                        chat: self.chat.clone(),
                        cursor: mark.id,
                        date_key: mark.date_key,
                        failure_reason: reason,
                    };
                    return Ok(WalkOutcome {
                        result: WalkResult::Interrupted(checkpoint),
                        messages_consumed: consumed,
                        pages_fetched: pages,
                        newest,
                    });
                }
            };
        }
    }

    /// Retries the identical request on transient failures.
    ///
    /// A spent budget is promoted to a fault. Exhaustion only counts as the
    /// normal end of the feed when it is the answer to a first attempt.
    fn fetch_with_retry(&self, cursor: Option<&str>) -> Result<Page, PermanentFailure> {
        let chat = self.chat.to_string();
        let budget = self.settings.retry.budget;
        let mut attempt = 0u32;
        loop {
            let failure = match self
                .fetcher
                .fetch(&self.chat, cursor, self.settings.page_size)
            {
                Ok(page) => return Ok(page),
                Err(failure) => failure,
            };
            match failure {
                FetchFailure::Permanent(PermanentFailure::Exhausted) if attempt > 0 => {
                    return Err(PermanentFailure::Fault {
                        reason: "feed reported exhaustion while a retry was pending".to_string(),
                    });
                }
                FetchFailure::Permanent(permanent) => return Err(permanent),
                FetchFailure::Transient { reason } => {
                    let retry = format!("{}/{budget}", attempt + 1);
                    if attempt >= budget {
                        warn::emit(WarnEvent {
                            action: "promote",
                            chat: &chat,
                            cursor: cursor.unwrap_or_default(),
                            retry: &retry,
                            reason: &reason,
                            ..WarnEvent::new(WarnCode::W002RetryBudgetSpent, "fetch")
                        });
                        return Err(PermanentFailure::Fault {
                            reason: format!("retry budget of {budget} spent: {reason}"),
                        });
                    }
                    warn::emit(WarnEvent {
                        action: "retry",
                        chat: &chat,
                        cursor: cursor.unwrap_or_default(),
                        retry: &retry,
                        reason: &reason,
                        ..WarnEvent::new(WarnCode::W001FetchRetry, "fetch")
                    });
                    thread::sleep(self.settings.retry.delay_for(attempt));
                    attempt += 1;
                }
            }
        }
    }
}
