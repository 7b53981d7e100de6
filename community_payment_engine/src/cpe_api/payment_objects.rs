use std::collections::{BTreeMap, HashSet};

use cpg_common::Money;
use serde::{Deserialize, Serialize};

use crate::{
    cpe_api::settlement_objects::SettlementSummary,
    db_types::{PaymentMethod, PaymentRecord},
};

/// What the client must do next to complete a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IntentAction {
    /// Send the buyer's browser to the provider's checkout page
    Redirect { url: String },
    /// Render `code_url` as a QR code for the buyer to scan
    QrCode { code_url: String },
    /// Nothing further; the order was paid and settled synchronously
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub record: PaymentRecord,
    #[serde(flatten)]
    pub action: IntentAction,
    pub settlement: Option<SettlementSummary>,
}

/// A raw asynchronous notification from a payment provider: the posted key/value fields and, for providers that sign
/// out-of-band, the signature header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotifyRequest {
    pub params: BTreeMap<String, String>,
    pub signature: Option<String>,
}

impl NotifyRequest {
    pub fn new(params: BTreeMap<String, String>) -> Self {
        Self { params, signature: None }
    }

    pub fn with_signature<S: Into<String>>(mut self, signature: S) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str).filter(|s| !s.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NotifyRequest {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotifyStatus {
    Success,
    Failed,
    /// Not a final state (e.g. the buyer has not finished paying). Acknowledged without side effects.
    Pending,
}

/// A provider notification normalised into the fields the gateway cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderNotification {
    /// Our order number, as we sent it to the provider
    pub out_trade_no: String,
    /// The provider's transaction reference
    pub trade_no: Option<String>,
    pub status: NotifyStatus,
    pub amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyOutcome {
    pub method: PaymentMethod,
    pub order_no: String,
    pub status: NotifyStatus,
    /// True if the order had already been paid, i.e. this is a redelivery or a late duplicate
    pub duplicate: bool,
    pub settlement: Option<SettlementSummary>,
}

/// Gateway-level switches. Methods that are not enabled are refused before any provider is consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentGatewayConfig {
    pub enabled_methods: HashSet<PaymentMethod>,
}

impl Default for PaymentGatewayConfig {
    fn default() -> Self {
        let enabled_methods =
            [PaymentMethod::Alipay, PaymentMethod::Wechat, PaymentMethod::Balance, PaymentMethod::Epay].into();
        Self { enabled_methods }
    }
}

impl PaymentGatewayConfig {
    pub fn is_enabled(&self, method: PaymentMethod) -> bool {
        self.enabled_methods.contains(&method)
    }

    pub fn disable(mut self, method: PaymentMethod) -> Self {
        self.enabled_methods.remove(&method);
        self
    }
}
