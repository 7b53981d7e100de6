//! Provider status vocabularies and the acknowledgement bodies that stop providers from redelivering.
use std::str::FromStr;

use crate::{cpe_api::payment_objects::NotifyStatus, db_types::Money, db_types::PaymentMethod};

const WECHAT_ACK_SUCCESS: &str = "<xml><return_code><![CDATA[SUCCESS]]></return_code></xml>";
const WECHAT_ACK_FAIL: &str = "<xml><return_code><![CDATA[FAIL]]></return_code></xml>";

pub fn alipay_status(trade_status: &str) -> NotifyStatus {
    match trade_status {
        "TRADE_SUCCESS" | "TRADE_FINISHED" => NotifyStatus::Success,
        "TRADE_CLOSED" => NotifyStatus::Failed,
        _ => NotifyStatus::Pending,
    }
}

pub fn wechat_status(trade_state: &str) -> NotifyStatus {
    match trade_state {
        "SUCCESS" => NotifyStatus::Success,
        "CLOSED" | "PAYERROR" | "REVOKED" => NotifyStatus::Failed,
        _ => NotifyStatus::Pending,
    }
}

/// Epay only ever notifies about completed payments, so anything else is treated as not final.
pub fn epay_status(trade_status: &str) -> NotifyStatus {
    match trade_status {
        "TRADE_SUCCESS" => NotifyStatus::Success,
        _ => NotifyStatus::Pending,
    }
}

/// The response body a provider expects once a notification has been handled (`accepted`) or refused.
pub fn ack_body(method: PaymentMethod, accepted: bool) -> &'static str {
    match (method, accepted) {
        (PaymentMethod::Wechat, true) => WECHAT_ACK_SUCCESS,
        (PaymentMethod::Wechat, false) => WECHAT_ACK_FAIL,
        (_, true) => "success",
        (_, false) => "fail",
    }
}

pub fn ack_content_type(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Wechat => "application/xml",
        _ => "text/plain",
    }
}

/// Parses a decimal amount as reported by a provider, e.g. `"12.30"`.
pub fn parse_amount(value: &str) -> Option<Money> {
    Money::from_str(value).ok()
}
