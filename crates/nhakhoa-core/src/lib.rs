pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod reply;
pub mod reservation;
pub mod state;

// Re-export main types for convenience
pub use api::{BookingApi, BookingClient, BookingReply, BookingReplyData, BookingRequest};
pub use config::Config;
pub use conversation::{
    Conversation, CountdownChange, Navigation, Notice, NoticeLevel, OutgoingTurn, Pacing,
    ScheduledNavigation, TurnEffects,
};
pub use error::{BookingError, Result};
pub use reply::{decode, DecodedReply, TurnOutcome};
pub use reservation::{CountdownTimer, ReservationWindow};
pub use state::{HistoryEntry, HistoryRole, Message, Speaker};
