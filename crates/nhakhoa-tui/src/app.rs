use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use nhakhoa_core::{
    BookingApi, BookingError, BookingReply, Config, Conversation, CountdownChange, CountdownTimer,
    Navigation, Notice, NoticeLevel, Pacing, TurnEffects,
};
use tokio::sync::mpsc;

use crate::tui::{AppEvent, ScopedTask};

const TOAST_TTL: Duration = Duration::from_secs(4);
pub const EMPTY_INPUT_NOTICE: &str = "Vui lòng nhập nội dung tin nhắn";
pub const HOLD_EXPIRED_NOTICE: &str = "Đã hết thời gian giữ chỗ. Vui lòng chọn lại khung giờ.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Chat,
    /// Handed off to a page of the clinic website
    Handoff(Navigation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub notice: Notice,
    pub shown_at: Instant,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    // Booking conversation
    pub conversation: Conversation,
    api: Arc<dyn BookingApi>,
    turn_task: Option<ScopedTask>,
    countdown: Option<CountdownTimer>,
    pending_navigation: Option<ScopedTask>,
    events: mpsc::UnboundedSender<AppEvent>,

    // Composer
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars
    pub validation_notice: Option<&'static str>,

    // Transcript view
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Toasts and animation
    pub toasts: Vec<Toast>,
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub config: Config,
}

impl App {
    pub fn new(config: Config, api: Arc<dyn BookingApi>, events: mpsc::UnboundedSender<AppEvent>) -> Self {
        let pacing = Pacing {
            payment_delay: config.payment_redirect_delay(),
            appointments_delay: config.appointments_redirect_delay(),
        };

        Self {
            should_quit: false,
            screen: Screen::Chat,
            input_mode: InputMode::Editing,

            conversation: Conversation::with_pacing(pacing),
            api,
            turn_task: None,
            countdown: None,
            pending_navigation: None,
            events,

            input: String::new(),
            cursor: 0,
            validation_notice: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            toasts: Vec::new(),
            animation_frame: 0,

            config,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.conversation.is_in_flight()
    }

    /// Send the composer contents as the next turn
    pub fn submit(&mut self) {
        let text = self.input.clone();
        let turn = match self.conversation.begin_turn(&text) {
            Ok(turn) => turn,
            Err(BookingError::EmptyInput) => {
                self.validation_notice = Some(EMPTY_INPUT_NOTICE);
                return;
            }
            Err(BookingError::Busy) => return,
            Err(e) => {
                self.push_toast(Notice::error(e.to_string()));
                return;
            }
        };

        self.input.clear();
        self.cursor = 0;
        self.validation_notice = None;
        self.scroll_to_bottom();

        let api = Arc::clone(&self.api);
        let tx = self.events.clone();
        let id = turn.id;
        let request = turn.request;
        self.turn_task = Some(ScopedTask::spawn(async move {
            let result = api.send(&request).await;
            let _ = tx.send(AppEvent::TurnFinished { id, result });
        }));
    }

    pub fn finish_turn(&mut self, id: u64, result: nhakhoa_core::Result<BookingReply>) {
        // a reply from before a reset must not cancel the turn now in flight
        if self.conversation.pending_turn_id() == Some(id) {
            self.turn_task = None;
        }
        let effects = self.conversation.finish_turn(id, result);
        self.apply_effects(effects);
        self.scroll_to_bottom();
    }

    fn apply_effects(&mut self, effects: TurnEffects) {
        for notice in effects.notices {
            self.push_toast(notice);
        }

        match effects.countdown {
            CountdownChange::Restart(expires_at) => {
                tracing::debug!(%expires_at, "restarting reservation countdown");
                let tx = self.events.clone();
                self.countdown = Some(CountdownTimer::spawn(expires_at, move |remaining| {
                    let _ = tx.send(AppEvent::Countdown(remaining));
                }));
            }
            CountdownChange::Cleared => self.countdown = None,
            CountdownChange::Unchanged => {}
        }

        if let Some(navigation) = effects.navigation {
            tracing::info!(destination = ?navigation.target, delay_ms = navigation.delay.as_millis() as u64, "scheduling handoff");
            self.pending_navigation = Some(ScopedTask::send_after(
                navigation.delay,
                self.events.clone(),
                AppEvent::Navigate(navigation.target),
            ));
        }
    }

    pub fn on_countdown(&mut self, reported: u64) {
        self.on_countdown_at(reported, Utc::now());
    }

    fn on_countdown_at(&mut self, reported: u64, now: DateTime<Utc>) {
        let was_active = self.conversation.reservation().is_active();
        let remaining = self.conversation.tick_countdown(now);
        tracing::trace!(reported, remaining, "reservation countdown tick");
        if remaining == 0 {
            if let Some(timer) = self.countdown.take() {
                tracing::debug!(expires_at = %timer.expires_at(), "reservation countdown stopped");
            }
            if was_active {
                self.push_toast(Notice::error(HOLD_EXPIRED_NOTICE));
            }
        }
    }

    pub fn navigate(&mut self, target: Navigation) {
        self.pending_navigation = None;
        tracing::info!(url = %self.handoff_url(&target), "handing off to clinic website");
        self.screen = Screen::Handoff(target);
        self.input_mode = InputMode::Normal;
    }

    /// A handoff is scheduled but has not fired yet
    pub fn handoff_pending(&self) -> bool {
        self.pending_navigation.is_some()
    }

    pub fn handoff_url(&self, target: &Navigation) -> String {
        match target {
            Navigation::Payment { payment_id } => self.config.payment_url(payment_id),
            Navigation::Appointments => self.config.appointments_url(),
        }
    }

    pub fn start_new_conversation(&mut self) {
        self.conversation.start_new_conversation();
        if self.turn_task.take().is_some() {
            tracing::info!("abandoning in-flight booking turn");
        }
        self.countdown = None;
        self.input.clear();
        self.cursor = 0;
        self.validation_notice = None;
        self.chat_scroll = 0;
        self.screen = Screen::Chat;
        self.input_mode = InputMode::Editing;
    }

    pub fn push_toast(&mut self, notice: Notice) {
        if notice.level == NoticeLevel::Error {
            tracing::warn!(text = %notice.text, "error notice");
        }
        self.toasts.push(Toast {
            notice,
            shown_at: Instant::now(),
        });
    }

    /// Tick animation frame and drop stale toasts (called by Tick event)
    pub fn tick(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.toasts.retain(|t| t.shown_at.elapsed() < TOAST_TTL);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.transcript_lines().saturating_sub(self.visible_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    /// Scroll chat to bottom so the latest line (or "typing...") is visible
    pub fn scroll_to_bottom(&mut self) {
        let total_lines = self.transcript_lines();
        let visible_height = self.visible_height();
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    fn transcript_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in self.conversation.transcript() {
            total_lines = total_lines.saturating_add(2); // role line + blank line after
            for line in msg.text.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let wrapped = line.chars().count() / wrap_width + 1;
                total_lines = total_lines.saturating_add(u16::try_from(wrapped).unwrap_or(u16::MAX));
            }
        }

        if self.is_busy() {
            total_lines = total_lines.saturating_add(2); // role line + "typing..."
        }
        total_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nhakhoa_core::{BookingReplyData, BookingRequest, Speaker};

    struct EchoApi;

    #[async_trait]
    impl BookingApi for EchoApi {
        async fn send(&self, request: &BookingRequest) -> nhakhoa_core::Result<BookingReply> {
            Ok(BookingReply {
                success: Some(true),
                message: Some(format!("Bạn vừa nói: {}", request.text)),
                data: None,
            })
        }
    }

    fn app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (App::new(Config::default(), Arc::new(EchoApi), tx), rx)
    }

    #[tokio::test]
    async fn test_empty_submit_shows_validation_notice() {
        let (mut app, mut rx) = app();
        app.input = "   ".to_string();
        app.submit();

        assert_eq!(app.validation_notice, Some(EMPTY_INPUT_NOTICE));
        assert_eq!(app.conversation.transcript().len(), 1);
        assert!(!app.is_busy());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_submit_round_trip_through_event_channel() {
        let (mut app, mut rx) = app();
        app.input = "mai 9h".to_string();
        app.cursor = 6;
        app.submit();

        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);
        assert!(app.is_busy());

        // a second Enter while waiting does nothing
        app.input = "nữa".to_string();
        app.submit();
        assert_eq!(app.input, "nữa");

        match rx.recv().await {
            Some(AppEvent::TurnFinished { id, result }) => app.finish_turn(id, result),
            other => panic!("unexpected event {other:?}"),
        }

        assert!(!app.is_busy());
        let last = app.conversation.transcript().last().unwrap();
        assert_eq!(last.role, Speaker::Bot);
        assert_eq!(last.text, "Bạn vừa nói: mai 9h");
    }

    #[tokio::test]
    async fn test_navigate_switches_to_handoff_and_new_conversation_returns() {
        let (mut app, _rx) = app();
        app.navigate(Navigation::Payment { payment_id: "pay_1".to_string() });

        assert_eq!(app.screen, Screen::Handoff(Navigation::Payment { payment_id: "pay_1".to_string() }));
        assert_eq!(
            app.handoff_url(&Navigation::Payment { payment_id: "pay_1".to_string() }),
            "http://localhost:3000/payment/pay_1"
        );

        app.start_new_conversation();
        assert_eq!(app.screen, Screen::Chat);
        assert_eq!(app.input_mode, InputMode::Editing);
    }

    #[tokio::test]
    async fn test_stale_reply_after_reset_keeps_new_turn_alive() {
        let (mut app, mut rx) = app();
        app.input = "lần một".to_string();
        app.submit();
        let stale = match rx.recv().await {
            Some(AppEvent::TurnFinished { id, result }) => (id, result),
            other => panic!("unexpected event {other:?}"),
        };

        app.start_new_conversation();
        app.input = "lần hai".to_string();
        app.submit();

        // the earlier reply is handled before the new task has run
        app.finish_turn(stale.0, stale.1);
        assert!(app.is_busy());
        assert!(app.turn_task.is_some());

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("second turn never replied");
        match event {
            Some(AppEvent::TurnFinished { id, result }) => app.finish_turn(id, result),
            other => panic!("unexpected event {other:?}"),
        }

        assert!(!app.is_busy());
        assert!(app.turn_task.is_none());
        assert_eq!(app.conversation.transcript().last().unwrap().text, "Bạn vừa nói: lần hai");
    }

    #[tokio::test]
    async fn test_active_hold_reaching_zero_raises_toast() {
        let (mut app, _rx) = app();
        let expires_at = Utc::now() + chrono::Duration::minutes(10);
        let reply = BookingReply {
            success: Some(true),
            message: Some("Đã giữ chỗ 9h sáng mai".to_string()),
            data: Some(BookingReplyData {
                needs_more_info: Some(true),
                reservation_expires_at: Some(expires_at.to_rfc3339()),
                ..BookingReplyData::default()
            }),
        };

        let turn = app.conversation.begin_turn("mai 9h").unwrap();
        app.finish_turn(turn.id, Ok(reply));
        assert!(app.conversation.reservation().is_active());
        assert!(app.countdown.is_some());

        app.on_countdown_at(0, expires_at + chrono::Duration::seconds(1));

        assert!(!app.conversation.reservation().is_active());
        assert!(app.countdown.is_none());
        assert_eq!(app.toasts.len(), 1);
        assert_eq!(app.toasts[0].notice, Notice::error(HOLD_EXPIRED_NOTICE));
    }

    #[test]
    fn test_transcript_lines_saturates_on_huge_message() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(Config::default(), Arc::new(EchoApi), tx);
        app.chat_width = 1;
        let turn = app.conversation.begin_turn("dài").unwrap();
        let reply = BookingReply {
            success: Some(true),
            message: Some("a".repeat(200_000)),
            data: None,
        };
        app.conversation.finish_turn(turn.id, Ok(reply));

        assert_eq!(app.transcript_lines(), u16::MAX);
    }

    #[tokio::test]
    async fn test_countdown_at_zero_without_hold_is_silent() {
        let (mut app, _rx) = app();
        app.on_countdown(0);
        assert!(app.toasts.is_empty());
    }
}
