//! Payment provider notification webhooks.
//!
//! Providers redeliver a notification until they receive their acknowledgement token, so every handler here
//! always answers with the provider's token:
//! * the success token (`success`, or the WeChat `SUCCESS` xml) with 200 OK once the notification was handled,
//!   including redeliveries of notifications that were handled before;
//! * the failure token with the status of the underlying error otherwise. Nothing is changed when a notification is
//!   refused, so the provider can safely retry.
//!
//! | Provider | Route                    | Payload                                                |
//! |----------|--------------------------|--------------------------------------------------------|
//! | Alipay   | `POST /notify/alipay`    | form encoded                                           |
//! | Epay     | `GET/POST /notify/epay`  | query string or form encoded                           |
//! | WeChat   | `POST /notify/wechat`    | JSON, with the signature in `Wechatpay-Signature`      |
use std::collections::BTreeMap;

use actix_web::{error::ResponseError, web, HttpRequest, HttpResponse};
use community_payment_engine::{
    db_types::PaymentMethod,
    payment_objects::{NotifyRequest, NotifyStatus},
    providers::{ack_body, ack_content_type},
    CommissionSettings,
    InviteManagement,
    PaymentApi,
    PaymentGatewayDatabase,
};
use log::*;
use serde_json::Value;

use crate::{
    config::ServerOptions,
    errors::ServerError,
    helpers::{get_remote_ip, json_to_params, notify_request},
    route,
};

pub const WECHAT_SIGNATURE_HEADER: &str = "Wechatpay-Signature";

type Params = BTreeMap<String, String>;

route!(alipay_notify => Post "/notify/alipay" impl PaymentGatewayDatabase, InviteManagement, CommissionSettings);
pub async fn alipay_notify<B>(
    req: HttpRequest,
    body: Result<web::Form<Params>, actix_web::Error>,
    api: web::Data<PaymentApi<B>>,
) -> HttpResponse
where
    B: PaymentGatewayDatabase + InviteManagement + CommissionSettings,
{
    let method = PaymentMethod::Alipay;
    match body {
        Ok(form) => handle_notification(method, notify_request(form.into_inner(), &req, None), &req, &api).await,
        Err(e) => refuse(method, &req, ServerError::InvalidRequestBody(e.to_string())),
    }
}

route!(epay_notify_get => Get "/notify/epay" impl PaymentGatewayDatabase, InviteManagement, CommissionSettings);
pub async fn epay_notify_get<B>(
    req: HttpRequest,
    query: Result<web::Query<Params>, actix_web::Error>,
    api: web::Data<PaymentApi<B>>,
) -> HttpResponse
where
    B: PaymentGatewayDatabase + InviteManagement + CommissionSettings,
{
    let method = PaymentMethod::Epay;
    match query {
        Ok(query) => handle_notification(method, notify_request(query.into_inner(), &req, None), &req, &api).await,
        Err(e) => refuse(method, &req, ServerError::InvalidRequestPath(e.to_string())),
    }
}

route!(epay_notify_post => Post "/notify/epay" impl PaymentGatewayDatabase, InviteManagement, CommissionSettings);
pub async fn epay_notify_post<B>(
    req: HttpRequest,
    body: Result<web::Form<Params>, actix_web::Error>,
    api: web::Data<PaymentApi<B>>,
) -> HttpResponse
where
    B: PaymentGatewayDatabase + InviteManagement + CommissionSettings,
{
    let method = PaymentMethod::Epay;
    match body {
        Ok(form) => handle_notification(method, notify_request(form.into_inner(), &req, None), &req, &api).await,
        Err(e) => refuse(method, &req, ServerError::InvalidRequestBody(e.to_string())),
    }
}

route!(wechat_notify => Post "/notify/wechat" impl PaymentGatewayDatabase, InviteManagement, CommissionSettings);
pub async fn wechat_notify<B>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<PaymentApi<B>>,
) -> HttpResponse
where
    B: PaymentGatewayDatabase + InviteManagement + CommissionSettings,
{
    let method = PaymentMethod::Wechat;
    let params = serde_json::from_slice::<Value>(&body)
        .map_err(|e| e.to_string())
        .and_then(|v| json_to_params(&v).ok_or_else(|| "The notification is not a JSON object".to_string()));
    match params {
        Ok(params) => {
            let request = notify_request(params, &req, Some(WECHAT_SIGNATURE_HEADER));
            handle_notification(method, request, &req, &api).await
        },
        Err(e) => refuse(method, &req, ServerError::InvalidRequestBody(e)),
    }
}

async fn handle_notification<B>(
    method: PaymentMethod,
    request: NotifyRequest,
    req: &HttpRequest,
    api: &PaymentApi<B>,
) -> HttpResponse
where
    B: PaymentGatewayDatabase + InviteManagement + CommissionSettings,
{
    let source = source_ip(req);
    debug!("💻️ {method} notification from {source} with {} fields", request.params.len());
    match api.handle_notify(method, &request).await {
        Ok(outcome) => {
            match (outcome.status, outcome.duplicate) {
                (NotifyStatus::Success, false) => {
                    info!("💻️ {method} payment for order [{}] confirmed and settled", outcome.order_no)
                },
                (_, true) => info!("💻️ Duplicate {method} notification for order [{}]", outcome.order_no),
                (status, false) => debug!("💻️ {method} reported {status:?} for order [{}]", outcome.order_no),
            }
            acknowledge(method, true, actix_web::http::StatusCode::OK)
        },
        Err(e) => refuse(method, req, e.into()),
    }
}

fn refuse(method: PaymentMethod, req: &HttpRequest, e: ServerError) -> HttpResponse {
    warn!("💻️ Refused a {method} notification from {}. {e}", source_ip(req));
    acknowledge(method, false, e.status_code())
}

fn acknowledge(method: PaymentMethod, accepted: bool, status: actix_web::http::StatusCode) -> HttpResponse {
    HttpResponse::build(status).content_type(ack_content_type(method)).body(ack_body(method, accepted))
}

fn source_ip(req: &HttpRequest) -> String {
    let options = req.app_data::<web::Data<ServerOptions>>();
    let (use_x_forwarded_for, use_forwarded) =
        options.map(|o| (o.use_x_forwarded_for, o.use_forwarded)).unwrap_or((false, false));
    get_remote_ip(req, use_x_forwarded_for, use_forwarded)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "an unknown address".to_string())
}
