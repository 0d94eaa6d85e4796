//! Inbound message decoding and transaction field extraction
//!
//! Decoding is strict only at the envelope level: a frame that is not a JSON
//! object is rejected. Everything below the envelope is best-effort; missing
//! or wrongly typed fields fall back to defaults and never fail the message.

use serde_json::Value;

use super::errors::DecodeError;

/// Request id used for the stream subscription
pub const SUBSCRIPTION_ID: &str = "dashboard_subscription";

/// Request id used for the one-shot server info query
pub const SERVER_INFO_ID: &str = "server_info";

/// Placeholder for absent type and result labels
pub const UNKNOWN: &str = "Unknown";

/// Decoded upstream envelope, dispatched on by the session read loop
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// `type == "transaction"`; payload kept whole for the parser
    Transaction(Value),
    /// `type == "ledgerClosed"`
    LedgerClosed { ledger_index: u64 },
    /// Response to the server info request (the `result` body)
    ServerInfo(Value),
    /// Anything else: subscription acks, unknown stream kinds, error replies
    Other {
        kind: Option<String>,
        id: Option<String>,
        error: Option<String>,
    },
}

/// Decode one raw text frame
pub fn decode_message(text: &str) -> Result<InboundMessage, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    Ok(classify_envelope(value))
}

fn classify_envelope(value: Value) -> InboundMessage {
    let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);

    match kind.as_deref() {
        Some("transaction") => return InboundMessage::Transaction(value),
        Some("ledgerClosed") => {
            let ledger_index = value.get("ledger_index").and_then(Value::as_u64).unwrap_or(0);
            return InboundMessage::LedgerClosed { ledger_index };
        }
        _ => {}
    }

    let id = value.get("id").and_then(Value::as_str).map(str::to_owned);
    if id.as_deref() == Some(SERVER_INFO_ID) {
        if let Some(result) = value.get("result") {
            return InboundMessage::ServerInfo(result.clone());
        }
    }

    let error = value.get("error").and_then(Value::as_str).map(str::to_owned);
    InboundMessage::Other { kind, id, error }
}

/// Transaction fields extracted from a validated stream message, before
/// whale classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTransaction {
    pub tx_type: String,
    pub source_account: String,
    pub destination_account: String,
    pub amount_drops: u64,
    pub result: String,
    pub ledger_index: u64,
}

/// Extract a transaction from a `transaction` stream message.
///
/// Returns `None` when the message is not marked `validated: true`.
pub fn parse_transaction(message: &Value) -> Option<ParsedTransaction> {
    // Only a JSON boolean counts; `1` or `"true"` are treated as unvalidated
    let validated = message.get("validated").and_then(Value::as_bool).unwrap_or(false);
    if !validated {
        return None;
    }

    // API v2 streams carry the body under `tx_json`
    let tx = message.get("transaction").or_else(|| message.get("tx_json"));
    let meta = message.get("meta");

    let tx_type = str_field(tx, "TransactionType").unwrap_or(UNKNOWN).to_string();

    let amount_drops = if tx_type == "Payment" {
        tx.and_then(|body| body.get("Amount").or_else(|| body.get("DeliverMax")))
            .map(parse_native_drops)
            .unwrap_or(0)
    } else {
        0
    };

    Some(ParsedTransaction {
        source_account: str_field(tx, "Account").unwrap_or_default().to_string(),
        destination_account: str_field(tx, "Destination").unwrap_or_default().to_string(),
        result: str_field(meta, "TransactionResult").unwrap_or(UNKNOWN).to_string(),
        ledger_index: message.get("ledger_index").and_then(Value::as_u64).unwrap_or(0),
        tx_type,
        amount_drops,
    })
}

/// Native amounts are decimal strings of drops; issued currencies are
/// objects and are deliberately not valued.
fn parse_native_drops(amount: &Value) -> u64 {
    match amount {
        Value::String(drops) => drops.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}

fn str_field<'a>(object: Option<&'a Value>, key: &str) -> Option<&'a str> {
    object.and_then(|o| o.get(key)).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payment(amount: Value) -> Value {
        json!({
            "type": "transaction",
            "validated": true,
            "ledger_index": 91_000_123u64,
            "transaction": {
                "TransactionType": "Payment",
                "Account": "rSource",
                "Destination": "rDest",
                "Amount": amount,
            },
            "meta": { "TransactionResult": "tesSUCCESS" }
        })
    }

    #[test]
    fn test_parse_large_payment() {
        let parsed = parse_transaction(&payment(json!("12000000000"))).unwrap();
        assert_eq!(parsed.tx_type, "Payment");
        assert_eq!(parsed.source_account, "rSource");
        assert_eq!(parsed.destination_account, "rDest");
        assert_eq!(parsed.amount_drops, 12_000_000_000);
        assert_eq!(parsed.result, "tesSUCCESS");
        assert_eq!(parsed.ledger_index, 91_000_123);
    }

    #[test]
    fn test_unparseable_amount_still_produces_record() {
        let parsed = parse_transaction(&payment(json!("abc"))).unwrap();
        assert_eq!(parsed.amount_drops, 0);

        let parsed = parse_transaction(&payment(json!("-5"))).unwrap();
        assert_eq!(parsed.amount_drops, 0);
    }

    #[test]
    fn test_issued_currency_not_valued() {
        let amount = json!({ "currency": "USD", "issuer": "rIssuer", "value": "1000000" });
        let parsed = parse_transaction(&payment(amount)).unwrap();
        assert_eq!(parsed.amount_drops, 0);
    }

    #[test]
    fn test_unvalidated_is_skipped() {
        let mut msg = payment(json!("1000"));
        msg["validated"] = json!(false);
        assert!(parse_transaction(&msg).is_none());

        msg.as_object_mut().unwrap().remove("validated");
        assert!(parse_transaction(&msg).is_none());

        msg["validated"] = json!(1);
        assert!(parse_transaction(&msg).is_none());
        msg["validated"] = json!("true");
        assert!(parse_transaction(&msg).is_none());
    }

    #[test]
    fn test_missing_fields_default() {
        let parsed = parse_transaction(&json!({ "validated": true })).unwrap();
        assert_eq!(parsed.tx_type, UNKNOWN);
        assert_eq!(parsed.result, UNKNOWN);
        assert!(parsed.source_account.is_empty());
        assert!(parsed.destination_account.is_empty());
        assert_eq!(parsed.amount_drops, 0);
        assert_eq!(parsed.ledger_index, 0);
    }

    #[test]
    fn test_non_payment_amount_ignored() {
        let msg = json!({
            "validated": true,
            "transaction": { "TransactionType": "OfferCreate", "Amount": "5000000000" }
        });
        assert_eq!(parse_transaction(&msg).unwrap().amount_drops, 0);
    }

    #[test]
    fn test_api_v2_envelope() {
        let msg = json!({
            "validated": true,
            "tx_json": {
                "TransactionType": "Payment",
                "Account": "rA",
                "DeliverMax": "2500000",
            }
        });
        let parsed = parse_transaction(&msg).unwrap();
        assert_eq!(parsed.source_account, "rA");
        assert_eq!(parsed.amount_drops, 2_500_000);
    }

    #[test]
    fn test_decode_dispatch_kinds() {
        assert!(matches!(
            decode_message(r#"{"type":"transaction","validated":true}"#).unwrap(),
            InboundMessage::Transaction(_)
        ));
        assert_eq!(
            decode_message(r#"{"type":"ledgerClosed","ledger_index":42}"#).unwrap(),
            InboundMessage::LedgerClosed { ledger_index: 42 }
        );
        assert!(matches!(
            decode_message(r#"{"id":"server_info","result":{"info":{}}}"#).unwrap(),
            InboundMessage::ServerInfo(_)
        ));
        assert_eq!(
            decode_message(r#"{"id":"dashboard_subscription","status":"success","type":"response"}"#)
                .unwrap(),
            InboundMessage::Other {
                kind: Some("response".to_string()),
                id: Some(SUBSCRIPTION_ID.to_string()),
                error: None,
            }
        );
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(decode_message("{oops"), Err(DecodeError::InvalidJson(_))));
        assert!(matches!(decode_message("[1,2,3]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(decode_message(""), Err(DecodeError::InvalidJson(_))));
    }
}
