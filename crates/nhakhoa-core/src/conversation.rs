//! Booking conversation state machine
//!
//! A turn is split in two so a UI can keep drawing while the request is out:
//! [`Conversation::begin_turn`] validates the input, echoes it to the
//! transcript and returns the request to send; [`Conversation::finish_turn`]
//! folds the reply (or the transport error) back into the state and returns
//! the side effects the UI has to carry out. [`Conversation::submit_turn`]
//! does both for callers that can simply await.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::api::{BookingApi, BookingFor, BookingReply, BookingRequest};
use crate::error::{BookingError, Result};
use crate::reply::{decode, TurnOutcome};
use crate::reservation::ReservationWindow;
use crate::state::{HistoryEntry, Message};

pub const GREETING: &str = "Xin chào! Tôi là trợ lý đặt lịch của Nha khoa. \
Bạn muốn đặt lịch khám vào ngày giờ nào, cho dịch vụ gì?";
pub const FALLBACK_REPLY: &str = "Tôi đã ghi nhận thông tin của bạn. Bạn cần hỗ trợ thêm gì không?";
pub const APOLOGY: &str = "Xin lỗi, đã có lỗi xảy ra khi xử lý yêu cầu của bạn. Vui lòng thử lại.";
pub const PAYMENT_HANDOFF: &str = "Lịch hẹn của bạn đã được giữ chỗ. Đang chuyển bạn đến trang thanh toán...";
pub const BOOKING_CONFIRMED: &str = "Lịch hẹn của bạn đã được xác nhận! Đang chuyển bạn đến danh sách lịch hẹn...";
pub const PAYMENT_NOTICE: &str = "Đặt lịch thành công! Vui lòng hoàn tất thanh toán.";
pub const BOOKED_NOTICE: &str = "Đặt lịch thành công!";

/// How long the final bot line stays visible before handing off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub payment_delay: Duration,
    pub appointments_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            payment_delay: Duration::from_millis(1500),
            appointments_delay: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Payment { payment_id: String },
    Appointments,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledNavigation {
    pub target: Navigation,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A transient toast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// What happened to the reservation countdown during a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountdownChange {
    #[default]
    Unchanged,
    Restart(DateTime<Utc>),
    Cleared,
}

/// Side effects of a finished turn, for the UI to carry out
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TurnEffects {
    pub notices: Vec<Notice>,
    pub navigation: Option<ScheduledNavigation>,
    pub countdown: CountdownChange,
}

/// Returned by [`Conversation::begin_turn`]; hand `id` back to
/// [`Conversation::finish_turn`] together with the reply.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingTurn {
    pub id: u64,
    pub request: BookingRequest,
}

#[derive(Debug, Clone)]
struct PendingTurn {
    id: u64,
    user_text: String,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    transcript: Vec<Message>,
    history: Vec<HistoryEntry>,
    booking_context: Option<Value>,
    is_new_conversation: bool,
    reservation: ReservationWindow,
    pending: Option<PendingTurn>,
    next_turn_id: u64,
    pacing: Pacing,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self::with_pacing(Pacing::default())
    }

    pub fn with_pacing(pacing: Pacing) -> Self {
        Self {
            transcript: vec![Message::bot(GREETING)],
            history: Vec::new(),
            booking_context: None,
            is_new_conversation: true,
            reservation: ReservationWindow::default(),
            pending: None,
            next_turn_id: 1,
            pacing,
        }
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn booking_context(&self) -> Option<&Value> {
        self.booking_context.as_ref()
    }

    pub fn is_new_conversation(&self) -> bool {
        self.is_new_conversation
    }

    pub fn reservation(&self) -> &ReservationWindow {
        &self.reservation
    }

    pub fn is_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    /// Id of the turn whose reply is being awaited
    pub fn pending_turn_id(&self) -> Option<u64> {
        self.pending.as_ref().map(|pending| pending.id)
    }

    /// Validate and echo the user's text, and build the request for it.
    pub fn begin_turn(&mut self, text: &str) -> Result<OutgoingTurn> {
        if text.trim().is_empty() {
            return Err(BookingError::EmptyInput);
        }
        if self.pending.is_some() {
            return Err(BookingError::Busy);
        }

        let id = self.next_turn_id;
        self.next_turn_id += 1;

        self.transcript.push(Message::user(text));
        self.pending = Some(PendingTurn {
            id,
            user_text: text.to_string(),
        });

        let request = BookingRequest {
            text: text.to_string(),
            booking_for: BookingFor::Myself,
            conversation_history: self.history.clone(),
            booking_context: self.booking_context.clone(),
            is_new_conversation: self.is_new_conversation,
        };

        tracing::info!(
            turn = id,
            history_len = request.conversation_history.len(),
            has_context = request.booking_context.is_some(),
            is_new = request.is_new_conversation,
            "booking turn submitted"
        );

        Ok(OutgoingTurn { id, request })
    }

    pub fn finish_turn(&mut self, id: u64, result: Result<BookingReply>) -> TurnEffects {
        self.finish_turn_at(id, result, Utc::now())
    }

    /// [`Conversation::finish_turn`] with an explicit clock
    pub fn finish_turn_at(
        &mut self,
        id: u64,
        result: Result<BookingReply>,
        now: DateTime<Utc>,
    ) -> TurnEffects {
        let pending = match self.pending.take() {
            Some(pending) if pending.id == id => pending,
            other => {
                // reply to a turn from before a reset
                self.pending = other;
                tracing::debug!(turn = id, "dropping stale booking reply");
                return TurnEffects::default();
            }
        };

        match result {
            Ok(reply) => self.apply_reply(&pending.user_text, reply, now),
            Err(e) => {
                tracing::warn!(turn = id, error = %e, "booking turn failed");
                self.fail(e.to_string())
            }
        }
    }

    pub async fn submit_turn<A>(&mut self, api: &A, text: &str) -> Result<TurnEffects>
    where
        A: BookingApi + ?Sized,
    {
        let turn = self.begin_turn(text)?;
        let result = api.send(&turn.request).await;
        Ok(self.finish_turn(turn.id, result))
    }

    pub fn start_new_conversation(&mut self) {
        tracing::info!("starting new booking conversation");
        self.transcript = vec![Message::bot(GREETING)];
        self.history.clear();
        self.booking_context = None;
        self.is_new_conversation = true;
        self.reservation.clear();
        self.pending = None;
    }

    /// Countdown tick; returns the remaining whole seconds.
    pub fn tick_countdown(&mut self, now: DateTime<Utc>) -> u64 {
        let was_active = self.reservation.is_active();
        let remaining = self.reservation.tick(now);
        if was_active && !self.reservation.is_active() {
            tracing::info!("reservation hold expired");
        }
        remaining
    }

    fn apply_reply(&mut self, user_text: &str, reply: BookingReply, now: DateTime<Utc>) -> TurnEffects {
        let decoded = decode(reply);
        tracing::info!(outcome = ?decoded.outcome, "booking reply decoded");

        let mut effects = TurnEffects::default();

        let bot_text = match (&decoded.bot_message, &decoded.outcome) {
            (Some(message), _) => Some(message.clone()),
            (None, TurnOutcome::Informational | TurnOutcome::NeedsMoreInfo) => {
                Some(FALLBACK_REPLY.to_string())
            }
            (None, _) => None,
        };
        if let Some(text) = &bot_text {
            self.transcript.push(Message::bot(text.clone()));
        }

        match decoded.history {
            Some(history) => {
                tracing::debug!(len = history.len(), "adopting server conversation history");
                self.history = history;
            }
            None => {
                if let Some(text) = &bot_text {
                    self.history.push(HistoryEntry::user(user_text));
                    self.history.push(HistoryEntry::assistant(text.clone()));
                }
            }
        }

        let succeeded = matches!(
            decoded.outcome,
            TurnOutcome::PaymentRequired { .. }
                | TurnOutcome::Booked
                | TurnOutcome::Informational
                | TurnOutcome::NeedsMoreInfo
        );
        if succeeded {
            self.is_new_conversation = false;
        }

        if let Some(context) = decoded.booking_context {
            self.booking_context = Some(context);
        }

        let was_active = self.reservation.is_active();
        self.reservation.set(decoded.reservation_expires_at, now);
        effects.countdown = match self.reservation.expires_at() {
            Some(at) => CountdownChange::Restart(at),
            None if was_active => CountdownChange::Cleared,
            None => CountdownChange::Unchanged,
        };

        match decoded.outcome {
            TurnOutcome::PaymentRequired { payment_id } => {
                effects.notices.push(Notice::success(PAYMENT_NOTICE));
                self.transcript.push(Message::bot(PAYMENT_HANDOFF));
                self.booking_context = None;
                tracing::info!(%payment_id, "appointment awaiting payment");
                effects.navigation = Some(ScheduledNavigation {
                    target: Navigation::Payment { payment_id },
                    delay: self.pacing.payment_delay,
                });
            }
            TurnOutcome::Booked => {
                effects.notices.push(Notice::success(BOOKED_NOTICE));
                self.transcript.push(Message::bot(BOOKING_CONFIRMED));
                self.booking_context = None;
                tracing::info!("appointment booked without payment");
                effects.navigation = Some(ScheduledNavigation {
                    target: Navigation::Appointments,
                    delay: self.pacing.appointments_delay,
                });
            }
            TurnOutcome::Informational | TurnOutcome::NeedsMoreInfo | TurnOutcome::SoftFailure => {}
            TurnOutcome::HardFailure { reason } => {
                tracing::warn!(%reason, "booking turn rejected");
                let failed = self.fail(BookingError::Rejected(reason).to_string());
                effects.notices.extend(failed.notices);
            }
        }

        effects
    }

    fn fail(&mut self, reason: String) -> TurnEffects {
        self.transcript.push(Message::bot(APOLOGY));
        TurnEffects {
            notices: vec![Notice::error(reason)],
            ..TurnEffects::default()
        }
    }
}
