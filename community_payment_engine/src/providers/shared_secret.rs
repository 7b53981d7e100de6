use std::collections::BTreeMap;

use cpg_common::{Money, Secret};
use log::*;

use crate::{
    cpe_api::payment_objects::{IntentAction, NotifyRequest, NotifyStatus, ProviderNotification},
    db_types::{Order, PaymentMethod, PaymentRecord},
    helpers::{hmac_sign, hmac_verify},
    providers::{alipay_status, parse_amount, required_param, wechat_status, PaymentProvider},
    traits::PaymentGatewayError,
};

#[derive(Debug, Clone, Default)]
pub struct SharedSecretConfig {
    pub gateway_url: String,
    pub app_id: String,
    pub secret: Secret<String>,
    pub notify_url: String,
    pub return_url: String,
}

/// Alipay and WeChat Pay adapter that authenticates with an HMAC-SHA256 shared secret.
///
/// Alipay notifications carry the signature in the `sign` field. WeChat notifications carry it in the
/// `Wechatpay-Signature` header, which arrives as [`NotifyRequest::signature`].
#[derive(Debug, Clone)]
pub struct SharedSecretProvider {
    method: PaymentMethod,
    config: SharedSecretConfig,
}

impl SharedSecretProvider {
    pub fn alipay(config: SharedSecretConfig) -> Self {
        Self::new(PaymentMethod::Alipay, config)
    }

    pub fn wechat(config: SharedSecretConfig) -> Self {
        Self::new(PaymentMethod::Wechat, config)
    }

    fn new(method: PaymentMethod, config: SharedSecretConfig) -> Self {
        if config.secret.is_empty() {
            warn!("🔐️ No {method} secret is configured. Every {method} notification will be rejected.");
        }
        Self { method, config }
    }

    fn signed_query(&self, order: &Order, record: &PaymentRecord) -> String {
        let mut params = BTreeMap::new();
        params.insert("app_id".to_string(), self.config.app_id.clone());
        params.insert("out_trade_no".to_string(), order.order_no.clone());
        params.insert("subject".to_string(), format!("{} order {}", order.order_type, order.order_no));
        params.insert("notify_url".to_string(), self.config.notify_url.clone());
        match self.method {
            PaymentMethod::Wechat => {
                params.insert("total".to_string(), record.amount.value().to_string());
            },
            _ => {
                params.insert("total_amount".to_string(), record.amount.to_string());
                params.insert("return_url".to_string(), self.config.return_url.clone());
            },
        }
        let sign = hmac_sign(&params, self.config.secret.reveal());
        params.insert("sign".to_string(), sign);
        params.iter().map(|(k, v)| format!("{k}={}", urlencoding::encode(v))).collect::<Vec<_>>().join("&")
    }

    fn signature<'a>(&self, request: &'a NotifyRequest) -> Option<&'a str> {
        match self.method {
            PaymentMethod::Wechat => request.signature.as_deref(),
            _ => request.param("sign"),
        }
    }
}

impl PaymentProvider for SharedSecretProvider {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    fn create_intent(&self, order: &Order, record: &PaymentRecord) -> Result<IntentAction, PaymentGatewayError> {
        if self.config.gateway_url.is_empty() {
            return Err(PaymentGatewayError::ProviderError(format!("No {} gateway URL is configured", self.method)));
        }
        let base = self.config.gateway_url.trim_end_matches('/');
        let query = self.signed_query(order, record);
        match self.method {
            PaymentMethod::Wechat => Ok(IntentAction::QrCode { code_url: format!("{base}/native?{query}") }),
            _ => Ok(IntentAction::Redirect { url: format!("{base}/gateway.do?{query}") }),
        }
    }

    fn verify_notify(&self, request: &NotifyRequest) -> bool {
        if self.config.secret.is_empty() {
            return false;
        }
        match self.signature(request) {
            Some(signature) => hmac_verify(&request.params, self.config.secret.reveal(), signature),
            None => false,
        }
    }

    fn parse_notify(&self, request: &NotifyRequest) -> Result<ProviderNotification, PaymentGatewayError> {
        let out_trade_no = required_param(request, "out_trade_no")?.to_string();
        let invalid_amount =
            |v: &str| PaymentGatewayError::ProviderError(format!("Invalid {} amount: {v}", self.method));
        let (trade_no, status, amount) = match self.method {
            PaymentMethod::Wechat => {
                let status = wechat_status(required_param(request, "trade_state")?);
                // WeChat reports amounts in cents
                let amount = match request.param("total") {
                    Some(v) => Some(v.parse::<i64>().map(Money::from).map_err(|_| invalid_amount(v))?),
                    None => None,
                };
                (request.param("transaction_id"), status, amount)
            },
            _ => {
                let status = alipay_status(required_param(request, "trade_status")?);
                let amount = match request.param("total_amount") {
                    Some(v) => Some(parse_amount(v).ok_or_else(|| invalid_amount(v))?),
                    None => None,
                };
                (request.param("trade_no"), status, amount)
            },
        };
        if status == NotifyStatus::Pending {
            trace!("🔐️ {} reports order [{out_trade_no}] as not final yet", self.method);
        }
        Ok(ProviderNotification { out_trade_no, trade_no: trade_no.map(String::from), status, amount })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> SharedSecretConfig {
        SharedSecretConfig {
            gateway_url: "https://openapi.example.com".into(),
            app_id: "app-1".into(),
            secret: Secret::new("shared".into()),
            notify_url: "https://shop.example.com/notify".into(),
            return_url: "https://shop.example.com/paid".into(),
        }
    }

    #[test]
    fn alipay_notifications() {
        let provider = SharedSecretProvider::alipay(config());
        let mut request: NotifyRequest = [
            ("trade_no", "2024100122001"),
            ("out_trade_no", "20241001120000000001"),
            ("trade_status", "TRADE_FINISHED"),
            ("total_amount", "100.00"),
        ]
        .into_iter()
        .collect();
        let sign = hmac_sign(&request.params, "shared");
        request.params.insert("sign".into(), sign);
        assert!(provider.verify_notify(&request));
        let n = provider.parse_notify(&request).unwrap();
        assert_eq!(n.status, NotifyStatus::Success);
        assert_eq!(n.amount, Some(Money::from(10_000)));
        assert_eq!(n.trade_no.as_deref(), Some("2024100122001"));

        request.params.insert("trade_status".into(), "TRADE_CLOSED".into());
        assert!(!provider.verify_notify(&request));
    }

    #[test]
    fn wechat_signature_comes_from_the_header() {
        let provider = SharedSecretProvider::wechat(config());
        let request: NotifyRequest = [
            ("transaction_id", "4200001"),
            ("out_trade_no", "20241001120000000002"),
            ("trade_state", "PAYERROR"),
            ("total", "990"),
        ]
        .into_iter()
        .collect();
        assert!(!provider.verify_notify(&request));
        let sign = hmac_sign(&request.params, "shared");
        let request = request.with_signature(sign);
        assert!(provider.verify_notify(&request));
        let n = provider.parse_notify(&request).unwrap();
        assert_eq!(n.status, NotifyStatus::Failed);
        assert_eq!(n.amount, Some(Money::from(990)));
        assert_eq!(n.trade_no.as_deref(), Some("4200001"));
    }

    #[test]
    fn missing_secret_rejects_everything() {
        let provider = SharedSecretProvider::alipay(SharedSecretConfig::default());
        let mut request: NotifyRequest =
            [("out_trade_no", "1"), ("trade_status", "TRADE_SUCCESS")].into_iter().collect();
        let sign = hmac_sign(&request.params, "");
        request.params.insert("sign".into(), sign);
        assert!(!provider.verify_notify(&request));
    }
}
