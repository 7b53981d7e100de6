//! Payment provider adapters.
//!
//! A [`PaymentProvider`] knows how to send a buyer to a third-party checkout and how to authenticate and read the
//! asynchronous notifications that the provider posts back. It does not touch the database: the
//! [`PaymentApi`](crate::PaymentApi) owns every state change.
//!
//! * [`EpayProvider`] implements the Epay aggregator protocol with its MD5 signature scheme.
//! * [`SharedSecretProvider`] serves Alipay and WeChat Pay. Their production signature schemes (RSA2 and the WeChat
//!   Pay v3 platform certificates) are stood in for by an HMAC-SHA256 shared secret behind the same trait.
mod epay;
mod notify;
mod shared_secret;

pub use epay::{EpayConfig, EpayProvider};
pub use notify::{ack_body, ack_content_type, alipay_status, epay_status, parse_amount, wechat_status};
pub use shared_secret::{SharedSecretConfig, SharedSecretProvider};

use crate::{
    cpe_api::payment_objects::{IntentAction, NotifyRequest, ProviderNotification},
    db_types::{Order, PaymentMethod, PaymentRecord},
    traits::PaymentGatewayError,
};

pub trait PaymentProvider: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Builds what the buyer needs to complete the payment for `record`, which is the `PENDING` attempt for `order`.
    fn create_intent(&self, order: &Order, record: &PaymentRecord) -> Result<IntentAction, PaymentGatewayError>;

    /// Checks the notification's signature. Nothing else about the notification may be trusted before this passes.
    fn verify_notify(&self, request: &NotifyRequest) -> bool;

    /// Reads the fields the gateway needs from a verified notification.
    fn parse_notify(&self, request: &NotifyRequest) -> Result<ProviderNotification, PaymentGatewayError>;
}

pub(crate) fn required_param<'a>(request: &'a NotifyRequest, key: &str) -> Result<&'a str, PaymentGatewayError> {
    request.param(key).ok_or_else(|| PaymentGatewayError::ProviderError(format!("Notification is missing '{key}'")))
}
