//! Parsing of node answers to a submission
//!
//! Every parser looks for the success field first. Only when it is missing does it look for an
//! error the node embedded in an otherwise successful answer; such an error is a
//! [`Error::Rejected`]. An answer with neither is [`Error::Malformed`] and may be retried.
//!
//! [`classify_answer`] puts the HTTP status next to the parsed body: a client error status with
//! a body the node wrote is a rejection, however the body is shaped.

use reqwest::StatusCode;
use serde_json::Value;

use crate::{Error, Result};

const EXCERPT_LEN: usize = 120;

/// Ripple server states that say nothing about the transaction itself
const RIPPLE_NODE_ERRORS: [&str; 6] = [
    "tooBusy",
    "noNetwork",
    "noCurrent",
    "noClosed",
    "slowDown",
    "amendmentBlocked",
];

fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(EXCERPT_LEN) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_owned(),
    }
}

fn malformed(body: &str) -> Error {
    Error::Malformed(excerpt(body))
}

/// Message of an error object embedded in a JSON answer
fn embedded_error(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    match error {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        Value::Object(fields) => ["message", "what", "name"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
            .map(str::to_owned)
            .or_else(|| Some(error.to_string())),
        other => Some(other.to_string()),
    }
}

/// Message of a REST error object, `{"code": 400, "message": "..."}`
fn coded_message(value: &Value) -> Option<String> {
    let code = value.get("code")?.as_i64()?;
    if code == 0 || code == 200 {
        return None;
    }
    value
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .map(str::to_owned)
}

/// Transaction hash from a JSON-RPC `eth_sendRawTransaction` answer
pub fn parse_rpc_response(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body)?;
    if let Some(id) = value.get("result").and_then(Value::as_str) {
        return Ok(id.to_owned());
    }
    match embedded_error(&value) {
        Some(message) => Err(Error::Rejected(message)),
        None => Err(malformed(body)),
    }
}

/// Transaction hash from a rippled `submit` answer
pub fn parse_ripple_submit(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body)?;
    let Some(result) = value.get("result") else {
        return Err(malformed(body));
    };

    if let Some(code) = result.get("engine_result_code").and_then(Value::as_i64) {
        if code == 0 {
            return result
                .pointer("/tx_json/hash")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| malformed(body));
        }
        let message = result
            .get("engine_result_message")
            .or_else(|| result.get("engine_result"))
            .and_then(Value::as_str)
            .unwrap_or("transaction not applied");
        return Err(Error::Rejected(message.to_owned()));
    }

    let Some(error) = result.get("error").and_then(Value::as_str) else {
        return Err(malformed(body));
    };
    if RIPPLE_NODE_ERRORS.contains(&error) {
        return Err(Error::Unavailable(error.to_owned()));
    }
    match result.get("error_exception").and_then(Value::as_str) {
        Some(exception) => Err(Error::Rejected(format!("{error} - {exception}"))),
        None => Err(Error::Rejected(error.to_owned())),
    }
}

/// Transaction id from a raw submission endpoint
///
/// Understands a bare hex id, an object carrying the id under one of the usual keys, and the
/// list of results an order-book node answers with.
pub fn parse_raw_response(body: &str) -> Result<String> {
    let trimmed = body.trim();
    if !trimmed.starts_with(['{', '[']) {
        let id = trimmed.trim_matches('"');
        return if !id.is_empty() && id.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(id.to_owned())
        } else {
            Err(malformed(body))
        };
    }

    let value: Value = serde_json::from_str(trimmed)?;
    if let Value::Array(results) = &value {
        let Some(first) = results.first() else {
            return Err(malformed(body));
        };
        if first.get("ok").and_then(Value::as_bool) == Some(false) {
            let log = first.get("log").and_then(Value::as_str).unwrap_or("not ok");
            return Err(Error::Rejected(log.to_owned()));
        }
        return first
            .get("hash")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| malformed(body));
    }

    const ID_POINTERS: [&str; 6] = [
        "/txid",
        "/hash",
        "/transaction_id",
        "/result",
        "/tx/hash",
        "/data/transaction_hash",
    ];
    if let Some(id) = ID_POINTERS
        .iter()
        .find_map(|pointer| value.pointer(pointer).and_then(Value::as_str))
    {
        return Ok(id.to_owned());
    }
    match embedded_error(&value).or_else(|| coded_message(&value)) {
        Some(message) => Err(Error::Rejected(message)),
        None => Err(malformed(body)),
    }
}

/// Outcome of a submission, given the HTTP status and the body the endpoint answered with
///
/// Overload statuses and unparsable error pages stay retryable. A 4xx other than 408 and 429
/// carrying a body is the node refusing the transaction, which every other node would repeat.
pub fn classify_answer(
    status: u16,
    endpoint: &str,
    body: &str,
    parse: fn(&str) -> Result<String>,
) -> Result<String> {
    let transient = || Error::Status {
        endpoint: endpoint.to_owned(),
        status,
    };
    let code = StatusCode::from_u16(status).map_err(|_| transient())?;
    if matches!(
        code,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    ) {
        return Err(transient());
    }

    match parse(body) {
        Err(err) if !code.is_success() && err.is_retryable() => {
            let refused = code.is_client_error()
                && code != StatusCode::REQUEST_TIMEOUT
                && !body.trim().is_empty();
            if refused {
                Err(Error::Rejected(excerpt(body)))
            } else {
                Err(transient())
            }
        }
        answer => answer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b";

    #[test]
    fn test_rpc_success() {
        let body = format!(r#"{{"jsonrpc":"2.0","id":1,"result":"{HASH}"}}"#);
        assert_eq!(parse_rpc_response(&body).unwrap(), HASH);
    }

    #[test]
    fn test_rpc_embedded_error_is_rejection() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low"}}"#;
        let err = parse_rpc_response(body).unwrap_err();
        assert!(matches!(&err, Error::Rejected(m) if m == "nonce too low"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rpc_without_result_or_error_is_malformed() {
        let err = parse_rpc_response(r#"{"jsonrpc":"2.0","id":1}"#).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
        assert!(err.is_retryable());

        let err = parse_rpc_response("<html>Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_ripple_submit() {
        let ok = r#"{"result":{"engine_result":"tesSUCCESS","engine_result_code":0,
            "engine_result_message":"The transaction was applied.","status":"success",
            "tx_json":{"hash":"C53ECF838647FA5A4C780377025FEC7999AB4182590510CA461444B207AB74A9"}}}"#;
        assert_eq!(
            parse_ripple_submit(ok).unwrap(),
            "C53ECF838647FA5A4C780377025FEC7999AB4182590510CA461444B207AB74A9"
        );

        let rejected = r#"{"result":{"engine_result":"tecUNFUNDED_PAYMENT","engine_result_code":104,
            "engine_result_message":"Insufficient XRP balance to send.","tx_json":{"hash":"AB"}}}"#;
        assert!(matches!(
            parse_ripple_submit(rejected),
            Err(Error::Rejected(m)) if m == "Insufficient XRP balance to send."
        ));

        let invalid = r#"{"result":{"error":"invalidTransaction","error_exception":"fails local checks","status":"error"}}"#;
        assert!(matches!(
            parse_ripple_submit(invalid),
            Err(Error::Rejected(m)) if m == "invalidTransaction - fails local checks"
        ));

        let busy = r#"{"result":{"error":"tooBusy","status":"error"}}"#;
        let err = parse_ripple_submit(busy).unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_raw_response_shapes() {
        let txid = "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16";
        assert_eq!(parse_raw_response(txid).unwrap(), txid);
        assert_eq!(parse_raw_response(&format!("{txid}\n")).unwrap(), txid);
        assert_eq!(
            parse_raw_response(&format!(r#"{{"tx":{{"hash":"{txid}"}}}}"#)).unwrap(),
            txid
        );
        assert_eq!(
            parse_raw_response(&format!(r#"{{"transaction_id":"{txid}","processed":{{}}}}"#))
                .unwrap(),
            txid
        );
        assert_eq!(
            parse_raw_response(&format!(r#"[{{"code":0,"hash":"{txid}","ok":true}}]"#)).unwrap(),
            txid
        );

        assert!(matches!(
            parse_raw_response(r#"[{"code":65546,"log":"insufficient fund","ok":false}]"#),
            Err(Error::Rejected(m)) if m == "insufficient fund"
        ));
        assert!(matches!(
            parse_raw_response(
                r#"{"code":500,"message":"Internal Service Error","error":{"code":3040005,"name":"expired_tx_exception","what":"Expired Transaction"}}"#
            ),
            Err(Error::Rejected(m)) if m == "Expired Transaction"
        ));
        assert!(matches!(
            parse_raw_response("Service Unavailable"),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_coded_rest_error_is_rejection() {
        let body = r#"{"code":400,"failed_tx_index":0,"message":"signature verification failed","success_tx_results":[]}"#;
        let err = parse_raw_response(body).unwrap_err();
        assert!(matches!(&err, Error::Rejected(m) if m == "signature verification failed"));
        assert!(!err.is_retryable());

        assert!(matches!(
            parse_raw_response(r#"{"code":0,"message":"ok"}"#),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_classify_answer_by_status() {
        let plain = "sendrawtransaction RPC error: {\"code\":-26,\"message\":\"bad-txns-inputs-missingorspent\"}";
        let err = classify_answer(400, "node", plain, parse_raw_response).unwrap_err();
        assert!(matches!(&err, Error::Rejected(m) if m.starts_with("sendrawtransaction RPC error")));

        for status in [408, 429, 500, 503] {
            let err = classify_answer(status, "node", plain, parse_raw_response).unwrap_err();
            assert!(matches!(err, Error::Status { status: s, .. } if s == status));
        }
        assert!(matches!(
            classify_answer(400, "node", "  ", parse_raw_response),
            Err(Error::Status { status: 400, .. })
        ));

        let txid = "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16";
        assert_eq!(classify_answer(200, "node", txid, parse_raw_response).unwrap(), txid);
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let long = "x".repeat(500);
        assert_eq!(excerpt(&long).len(), EXCERPT_LEN + 3);
    }
}
