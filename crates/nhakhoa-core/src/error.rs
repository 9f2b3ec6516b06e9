use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Please type a message before sending")]
    EmptyInput,

    #[error("A booking request is already in progress")]
    Busy,

    #[error("Could not reach the booking service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Booking service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected reply from the booking service: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Booking failed: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, BookingError>;
