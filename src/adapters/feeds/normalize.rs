//! Market-channel message normalization.
//!
//! Frames arrive as one JSON object or an array of them, with prices
//! either nested per side or flattened. Everything is reduced here to
//! `FeedMessage`; nothing downstream looks at raw JSON.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

const INSTRUMENT_KEYS: [&str; 6] = ["asset_id", "token_id", "asset", "market_id", "market", "id"];
const CONTROL_TYPES: [&str; 5] = [
    "subscribed",
    "error",
    "last_trade_price",
    "tick_size_change",
    "pong",
];

/// Normalized feed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    PriceUpdate {
        instrument: String,
        yes: Decimal,
        no: Decimal,
    },
    Unrecognized(&'static str),
}

/// Normalize one text frame into zero or more messages.
pub fn normalize(text: &str) -> Vec<FeedMessage> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => items.iter().map(normalize_value).collect(),
        Ok(value) => vec![normalize_value(&value)],
        Err(_) => vec![FeedMessage::Unrecognized("invalid json")],
    }
}

fn normalize_value(value: &Value) -> FeedMessage {
    let Value::Object(obj) = value else {
        return FeedMessage::Unrecognized("not an object");
    };

    let kind = obj
        .get("event_type")
        .or_else(|| obj.get("type"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if CONTROL_TYPES.contains(&kind) {
        return FeedMessage::Unrecognized("control message");
    }

    let Some(instrument) = INSTRUMENT_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(as_id))
    else {
        return FeedMessage::Unrecognized("missing instrument id");
    };

    let yes = side_mid(obj, "yes");
    let no = side_mid(obj, "no");
    if yes.is_zero() && no.is_zero() {
        return FeedMessage::Unrecognized("no usable prices");
    }

    FeedMessage::PriceUpdate { instrument, yes, no }
}

/// Mid price of one side, from nested or flat fields. Zero when absent.
fn side_mid(obj: &Map<String, Value>, side: &str) -> Decimal {
    if let Some(Value::Object(nested)) = obj.get(side) {
        let bid = first_decimal(nested, &["best_bid", "bid"]);
        let ask = first_decimal(nested, &["best_ask", "ask"]);
        let mid = mid_of(bid, ask);
        if !mid.is_zero() {
            return mid;
        }
        return first_decimal(nested, &["price", "mid"]);
    }

    if let Some(direct) = obj.get(side).and_then(as_decimal) {
        return direct.max(Decimal::ZERO);
    }

    let bid = first_decimal(obj, &[format!("{side}_bid").as_str(), format!("{side}_best_bid").as_str()]);
    let ask = first_decimal(obj, &[format!("{side}_ask").as_str(), format!("{side}_best_ask").as_str()]);
    let mid = mid_of(bid, ask);
    if !mid.is_zero() {
        return mid;
    }
    first_decimal(obj, &[format!("{side}_price").as_str(), format!("{side}_mid").as_str()])
}

/// Average when both sides are quoted, otherwise whichever side is.
fn mid_of(bid: Decimal, ask: Decimal) -> Decimal {
    match (bid > Decimal::ZERO, ask > Decimal::ZERO) {
        (true, true) => (bid + ask) / Decimal::TWO,
        (true, false) => bid,
        (false, true) => ask,
        (false, false) => Decimal::ZERO,
    }
}

fn first_decimal(obj: &Map<String, Value>, keys: &[&str]) -> Decimal {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(as_decimal))
        .filter(|d| *d > Decimal::ZERO)
        .unwrap_or(Decimal::ZERO)
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => parse_decimal(s),
        Value::Number(n) => parse_decimal(&n.to_string()),
        _ => None,
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn update(instrument: &str, yes: Decimal, no: Decimal) -> FeedMessage {
        FeedMessage::PriceUpdate {
            instrument: instrument.to_string(),
            yes,
            no,
        }
    }

    #[test]
    fn test_nested_sides_average_bid_and_ask() {
        let text = r#"{"asset_id":"tok1","yes":{"best_bid":"0.44","best_ask":"0.46"},"no":{"bid":0.49,"ask":0.51}}"#;
        assert_eq!(normalize(text), vec![update("tok1", dec!(0.45), dec!(0.50))]);
    }

    #[test]
    fn test_flat_fields_and_one_sided_quote() {
        let text = r#"{"token_id":"tok2","yes_bid":0.30,"no_ask":"0.65"}"#;
        assert_eq!(normalize(text), vec![update("tok2", dec!(0.30), dec!(0.65))]);
    }

    #[test]
    fn test_array_frame_yields_one_message_each() {
        let text = r#"[{"market":"m1","yes_price":"0.4","no_price":"0.5"},{"type":"subscribed"}]"#;
        let messages = normalize(text);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], update("m1", dec!(0.4), dec!(0.5)));
        assert_eq!(messages[1], FeedMessage::Unrecognized("control message"));
    }

    #[test]
    fn test_unusable_frames_are_unrecognized() {
        assert_eq!(normalize("not json"), vec![FeedMessage::Unrecognized("invalid json")]);
        assert_eq!(
            normalize(r#"{"yes_bid":0.5}"#),
            vec![FeedMessage::Unrecognized("missing instrument id")]
        );
        assert_eq!(
            normalize(r#"{"asset_id":"x","yes":{"bid":0},"no":{}}"#),
            vec![FeedMessage::Unrecognized("no usable prices")]
        );
        assert_eq!(normalize("42"), vec![FeedMessage::Unrecognized("not an object")]);
    }
}
