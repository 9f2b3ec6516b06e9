//! Decoding of booking endpoint replies
//!
//! The endpoint signals its decision through a loose bag of optional fields.
//! [`decode`] turns that bag into a [`DecodedReply`] once, right after the
//! network call, so the conversation only ever matches on [`TurnOutcome`].

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::api::BookingReply;
use crate::state::HistoryEntry;

/// What the booking service decided for this turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Appointment created and held until the patient pays
    PaymentRequired { payment_id: String },
    /// Appointment created, nothing to pay
    Booked,
    /// Answered without booking anything (off-topic, clinic info, ...)
    Informational,
    /// The assistant asked a clarifying question
    NeedsMoreInfo,
    /// Reported failure, but with a message the patient can respond to
    SoftFailure,
    /// Failure with nothing to show the patient
    HardFailure { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReply {
    pub bot_message: Option<String>,
    pub history: Option<Vec<HistoryEntry>>,
    pub booking_context: Option<Value>,
    pub reservation_expires_at: Option<DateTime<Utc>>,
    pub outcome: TurnOutcome,
}

pub fn decode(reply: BookingReply) -> DecodedReply {
    let success = reply.success.unwrap_or(false);
    let data = reply.data.unwrap_or_default();
    let parsed = data.parsed_data.unwrap_or_default();

    let bot_message = non_blank(data.follow_up_question).or_else(|| non_blank(reply.message));

    let history = data.conversation_history.or(parsed.conversation_history);
    let booking_context = parsed.booking_context.filter(|ctx| !ctx.is_null());
    let reservation_expires_at = data
        .reservation_expires_at
        .as_deref()
        .and_then(parse_expiry);

    let appointment = data.appointment.filter(|a| !a.is_null());
    let payment_id = data
        .payment
        .as_ref()
        .and_then(|p| p.reference())
        .map(str::to_string);

    let outcome = match (success, appointment) {
        (true, Some(_)) if data.require_payment == Some(true) => match payment_id {
            Some(payment_id) => TurnOutcome::PaymentRequired { payment_id },
            None => failure(
                &bot_message,
                "appointment requires payment but no payment reference was returned",
            ),
        },
        (true, Some(_)) => TurnOutcome::Booked,
        (true, None) if data.needs_more_info == Some(true) => TurnOutcome::NeedsMoreInfo,
        (true, None) => TurnOutcome::Informational,
        (false, _) => failure(&bot_message, "booking service returned no reply"),
    };

    DecodedReply {
        bot_message,
        history,
        booking_context,
        reservation_expires_at,
        outcome,
    }
}

fn failure(bot_message: &Option<String>, reason: &str) -> TurnOutcome {
    if bot_message.is_some() {
        TurnOutcome::SoftFailure
    } else {
        TurnOutcome::HardFailure {
            reason: reason.to_string(),
        }
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!(value = raw, error = %e, "ignoring unparseable reservation expiry");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reply(json: &str) -> DecodedReply {
        decode(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_needs_more_info_uses_follow_up_question() {
        let decoded = reply(
            r#"{"success":true,"message":"ok","data":{"needsMoreInfo":true,"followUpQuestion":"Bạn muốn khám với bác sĩ nào?"}}"#,
        );
        assert_eq!(decoded.outcome, TurnOutcome::NeedsMoreInfo);
        assert_eq!(decoded.bot_message.as_deref(), Some("Bạn muốn khám với bác sĩ nào?"));
    }

    #[test]
    fn test_message_used_when_follow_up_is_blank() {
        let decoded = reply(r#"{"success":true,"message":"Phòng khám mở cửa 8h","data":{"followUpQuestion":"  "}}"#);
        assert_eq!(decoded.outcome, TurnOutcome::Informational);
        assert_eq!(decoded.bot_message.as_deref(), Some("Phòng khám mở cửa 8h"));
    }

    #[test]
    fn test_payment_required_with_document_id() {
        let decoded = reply(
            r#"{"success":true,"data":{"appointment":{"_id":"apt_1"},"requirePayment":true,"payment":{"_id":"pay_42"}}}"#,
        );
        assert_eq!(
            decoded.outcome,
            TurnOutcome::PaymentRequired { payment_id: "pay_42".to_string() }
        );
    }

    #[test]
    fn test_payment_required_without_reference_is_a_failure() {
        let decoded = reply(r#"{"success":true,"data":{"appointment":{},"requirePayment":true}}"#);
        assert!(matches!(decoded.outcome, TurnOutcome::HardFailure { .. }));

        let decoded = reply(
            r#"{"success":true,"message":"Vui lòng thử lại","data":{"appointment":{},"requirePayment":true,"payment":{}}}"#,
        );
        assert_eq!(decoded.outcome, TurnOutcome::SoftFailure);
    }

    #[test]
    fn test_booked_when_payment_not_required() {
        let decoded = reply(r#"{"success":true,"data":{"appointment":{"_id":"apt_1"},"requirePayment":false}}"#);
        assert_eq!(decoded.outcome, TurnOutcome::Booked);
    }

    #[test]
    fn test_null_appointment_is_not_a_booking() {
        let decoded = reply(r#"{"success":true,"data":{"appointment":null,"requirePayment":true}}"#);
        assert_eq!(decoded.outcome, TurnOutcome::Informational);
    }

    #[test]
    fn test_failure_with_and_without_message() {
        assert_eq!(
            reply(r#"{"success":false,"message":"Khung giờ này đã kín"}"#).outcome,
            TurnOutcome::SoftFailure
        );
        assert!(matches!(reply(r#"{"success":false}"#).outcome, TurnOutcome::HardFailure { .. }));
        assert!(matches!(reply("{}").outcome, TurnOutcome::HardFailure { .. }));
    }

    #[test]
    fn test_top_level_history_preferred_over_parsed_data() {
        let decoded = reply(
            r#"{"success":true,"data":{
                "conversationHistory":[{"role":"user","content":"a"}],
                "parsedData":{"conversationHistory":[{"role":"user","content":"b"}],"bookingContext":{"date":"2026-10-20"}}
            }}"#,
        );
        assert_eq!(decoded.history, Some(vec![HistoryEntry::user("a")]));
        assert_eq!(decoded.booking_context, Some(serde_json::json!({"date":"2026-10-20"})));
    }

    #[test]
    fn test_history_falls_back_to_parsed_data() {
        let decoded = reply(
            r#"{"success":true,"data":{"parsedData":{"conversationHistory":[{"role":"assistant","content":"b"}]}}}"#,
        );
        assert_eq!(decoded.history, Some(vec![HistoryEntry::assistant("b")]));
        assert_eq!(decoded.booking_context, None);
    }

    #[test]
    fn test_reservation_expiry_parsing() {
        let decoded = reply(r#"{"success":true,"data":{"reservationExpiresAt":"2026-10-19T10:05:00.000Z"}}"#);
        assert_eq!(
            decoded.reservation_expires_at,
            Some(Utc.with_ymd_and_hms(2026, 10, 19, 10, 5, 0).unwrap())
        );

        let decoded = reply(r#"{"success":true,"data":{"reservationExpiresAt":"tomorrow"}}"#);
        assert_eq!(decoded.reservation_expires_at, None);
    }
}
