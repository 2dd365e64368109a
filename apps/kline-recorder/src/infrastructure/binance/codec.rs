//! Kline Codec
//!
//! Decodes one combined-stream JSON frame into a `KlineRecord`. Only the
//! symbol, the close price and the event time are retained; the event
//! time is reduced from milliseconds to whole seconds.

use crate::application::ports::{DecodeError, EventDecoder};
use crate::domain::kline::{KlineRecord, RawPayload};

use super::messages::CombinedStreamEnvelope;

/// JSON decoder for the Binance combined kline stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct KlineJsonDecoder;

impl KlineJsonDecoder {
    /// Create a new decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the frame is not JSON, lacks `data.s`,
    /// `data.E` or `data.k.c`, has an empty symbol, or carries a price that
    /// is not a string holding a finite decimal.
    pub fn decode_text(&self, text: &str) -> Result<KlineRecord, DecodeError> {
        let envelope: CombinedStreamEnvelope =
            serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        let data = envelope.data.ok_or(DecodeError::MissingField("data"))?;

        let symbol = data.symbol.ok_or(DecodeError::MissingField("data.s"))?;
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(DecodeError::EmptyField("data.s"));
        }

        let event_time_ms = data
            .event_time_ms
            .ok_or(DecodeError::MissingField("data.E"))?;

        let close = data
            .kline
            .ok_or(DecodeError::MissingField("data.k"))?
            .close
            .ok_or(DecodeError::MissingField("data.k.c"))?;
        let close_price = parse_price(&close)?;

        Ok(KlineRecord::from_millis(
            symbol.to_string(),
            close_price,
            event_time_ms,
        ))
    }
}

impl EventDecoder for KlineJsonDecoder {
    fn decode(&self, payload: &RawPayload) -> Result<KlineRecord, DecodeError> {
        self.decode_text(payload.as_str())
    }
}

fn parse_price(raw: &str) -> Result<f64, DecodeError> {
    let invalid = || DecodeError::InvalidNumber {
        field: "data.k.c",
        value: raw.to_string(),
    };

    let price = raw.trim().parse::<f64>().map_err(|_| invalid())?;

    if price.is_finite() {
        Ok(price)
    } else {
        Err(invalid())
    }
}
