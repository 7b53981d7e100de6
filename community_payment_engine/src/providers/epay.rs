use std::collections::BTreeMap;

use cpg_common::Secret;
use log::*;

use crate::{
    cpe_api::payment_objects::{IntentAction, NotifyRequest, ProviderNotification},
    db_types::{Order, PaymentMethod, PaymentRecord},
    helpers::{md5_sign, md5_verify},
    providers::{epay_status, parse_amount, required_param, PaymentProvider},
    traits::PaymentGatewayError,
};

#[derive(Debug, Clone, Default)]
pub struct EpayConfig {
    /// Base URL of the Epay deployment, e.g. `https://pay.example.com`
    pub gateway_url: String,
    /// The merchant id (`pid`)
    pub merchant_id: String,
    pub key: Secret<String>,
    /// The channel Epay should route the buyer to, e.g. `alipay` or `wxpay`
    pub channel: String,
    pub notify_url: String,
    pub return_url: String,
}

/// Adapter for the Epay aggregator protocol. Requests and notifications are signed with the merchant key using
/// Epay's MD5 scheme.
#[derive(Debug, Clone)]
pub struct EpayProvider {
    config: EpayConfig,
}

impl EpayProvider {
    pub fn new(config: EpayConfig) -> Self {
        if config.key.is_empty() {
            warn!("🔐️ No Epay merchant key is configured. Every Epay notification will be rejected.");
        }
        Self { config }
    }

    fn submit_params(&self, order: &Order, record: &PaymentRecord) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("pid".to_string(), self.config.merchant_id.clone());
        params.insert("type".to_string(), self.config.channel.clone());
        params.insert("out_trade_no".to_string(), order.order_no.clone());
        params.insert("notify_url".to_string(), self.config.notify_url.clone());
        params.insert("return_url".to_string(), self.config.return_url.clone());
        params.insert("name".to_string(), format!("{} order {}", order.order_type, order.order_no));
        params.insert("money".to_string(), record.amount.to_string());
        let sign = md5_sign(&params, self.config.key.reveal());
        params.insert("sign".to_string(), sign);
        params.insert("sign_type".to_string(), "MD5".to_string());
        params
    }
}

impl PaymentProvider for EpayProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Epay
    }

    fn create_intent(&self, order: &Order, record: &PaymentRecord) -> Result<IntentAction, PaymentGatewayError> {
        if self.config.gateway_url.is_empty() {
            return Err(PaymentGatewayError::ProviderError("No Epay gateway URL is configured".into()));
        }
        let query = self
            .submit_params(order, record)
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}/submit.php?{query}", self.config.gateway_url.trim_end_matches('/'));
        Ok(IntentAction::Redirect { url })
    }

    fn verify_notify(&self, request: &NotifyRequest) -> bool {
        if self.config.key.is_empty() {
            return false;
        }
        match request.param("sign") {
            Some(sign) => md5_verify(&request.params, self.config.key.reveal(), sign),
            None => false,
        }
    }

    fn parse_notify(&self, request: &NotifyRequest) -> Result<ProviderNotification, PaymentGatewayError> {
        let out_trade_no = required_param(request, "out_trade_no")?.to_string();
        let status = epay_status(required_param(request, "trade_status")?);
        let amount = match request.param("money") {
            Some(money) => Some(
                parse_amount(money)
                    .ok_or_else(|| PaymentGatewayError::ProviderError(format!("Invalid Epay amount: {money}")))?,
            ),
            None => None,
        };
        Ok(ProviderNotification { out_trade_no, trade_no: request.param("trade_no").map(String::from), status, amount })
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use cpg_common::Money;

    use super::*;
    use crate::{
        cpe_api::payment_objects::NotifyStatus,
        db_types::{OrderDetails, OrderStatusType, OrderType, PaymentStatus},
    };

    fn provider() -> EpayProvider {
        EpayProvider::new(EpayConfig {
            gateway_url: "https://pay.example.com/".into(),
            merchant_id: "1001".into(),
            key: Secret::new("merchant-key".into()),
            channel: "alipay".into(),
            notify_url: "https://shop.example.com/notify/epay".into(),
            return_url: "https://shop.example.com/paid".into(),
        })
    }

    fn order() -> (Order, PaymentRecord) {
        let now = Utc::now();
        let order = Order {
            id: 1,
            order_no: "20241001120000123456".into(),
            user_id: 2,
            author_id: 3,
            order_type: OrderType::Article,
            amount: Money::from(990),
            status: OrderStatusType::Pending,
            details: OrderDetails::Article { article_id: 5 },
            payment_method: None,
            paid_at: None,
            refund_reason: None,
            settled_at: None,
            created_at: now,
            updated_at: now,
        };
        let record = PaymentRecord {
            id: 7,
            order_id: 1,
            user_id: 2,
            payment_method: PaymentMethod::Epay,
            amount: Money::from(990),
            status: PaymentStatus::Pending,
            third_party_order_no: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        (order, record)
    }

    fn signed_notification(status: &str) -> NotifyRequest {
        let mut request: NotifyRequest = [
            ("pid", "1001"),
            ("trade_no", "EP2024100112"),
            ("out_trade_no", "20241001120000123456"),
            ("type", "alipay"),
            ("name", "ARTICLE order"),
            ("money", "9.90"),
            ("trade_status", status),
            ("sign_type", "MD5"),
        ]
        .into_iter()
        .collect();
        let sign = md5_sign(&request.params, "merchant-key");
        request.params.insert("sign".into(), sign);
        request
    }

    #[test]
    fn redirects_to_submit_page() {
        let (order, record) = order();
        let Ok(IntentAction::Redirect { url }) = provider().create_intent(&order, &record) else {
            panic!("Expected a redirect");
        };
        assert!(url.starts_with("https://pay.example.com/submit.php?"));
        assert!(url.contains("money=9.90"));
        assert!(url.contains("notify_url=https%3A%2F%2Fshop.example.com%2Fnotify%2Fepay"));
        assert!(url.contains("sign_type=MD5"));
    }

    #[test]
    fn verifies_and_parses_notifications() {
        let provider = provider();
        let request = signed_notification("TRADE_SUCCESS");
        assert!(provider.verify_notify(&request));
        let n = provider.parse_notify(&request).unwrap();
        assert_eq!(n.out_trade_no, "20241001120000123456");
        assert_eq!(n.trade_no.as_deref(), Some("EP2024100112"));
        assert_eq!(n.status, NotifyStatus::Success);
        assert_eq!(n.amount, Some(Money::from(990)));
    }

    #[test]
    fn tampered_notifications_are_rejected() {
        let provider = provider();
        let mut request = signed_notification("TRADE_SUCCESS");
        request.params.insert("money".into(), "0.01".into());
        assert!(!provider.verify_notify(&request));
        request.params.remove("sign");
        assert!(!provider.verify_notify(&request));
    }
}
