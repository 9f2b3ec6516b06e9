pub mod booking;

use async_trait::async_trait;

use crate::error::Result;

pub use booking::{
    BookingClient, BookingFor, BookingReply, BookingReplyData, BookingRequest, ParsedData,
    PaymentInfo,
};

/// The booking endpoint as seen by the conversation
#[async_trait]
pub trait BookingApi: Send + Sync {
    async fn send(&self, request: &BookingRequest) -> Result<BookingReply>;
}
