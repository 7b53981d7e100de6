use std::collections::BTreeMap;

use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use community_payment_engine::{
    db_types::{Money, Order, OrderStatusType, PaymentMethod},
    events::EventProducers,
    helpers::{hmac_sign, md5_sign},
    PaymentApi,
    PaymentGatewayDatabase,
    PaymentGatewayError,
    SqliteDatabase,
};
use serde_json::{json, Value};

use super::{
    helpers::{as_user, TestServer, EPAY_KEY, WECHAT_SECRET},
    mocks::MockProvider,
};
use crate::notify_routes::{AlipayNotifyRoute, WECHAT_SIGNATURE_HEADER};

const WECHAT_OK: &str = "<xml><return_code><![CDATA[SUCCESS]]></return_code></xml>";
const WECHAT_FAIL: &str = "<xml><return_code><![CDATA[FAIL]]></return_code></xml>";

fn epay_params(order: &Order, money: &str) -> BTreeMap<String, String> {
    let mut params: BTreeMap<String, String> = [
        ("pid", "1001"),
        ("trade_no", "EPAY-0001"),
        ("out_trade_no", order.order_no.as_str()),
        ("type", "alipay"),
        ("money", money),
        ("trade_status", "TRADE_SUCCESS"),
        ("sign_type", "MD5"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let sign = md5_sign(&params, EPAY_KEY);
    params.insert("sign".into(), sign);
    params
}

fn query_string(params: &BTreeMap<String, String>) -> String {
    params.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&")
}

/// An order with a pending payment attempt for `method`.
async fn pending_order(server: &TestServer, cents: i64, method: &str) -> (Order, i64) {
    let buyer = server.new_user("buyer", 0).await;
    let author = server.new_user("author", 0).await;
    let order = server.article_order(buyer.id, author.id, cents).await;
    let uri = format!("/api/orders/{}/pay", order.id);
    let req = as_user(TestRequest::post().uri(&uri).set_json(json!({ "method": method })), buyer.id);
    let intent: Value = server.send_json(req, StatusCode::OK).await;
    assert_eq!(intent["record"]["status"], "PENDING");
    (order, author.id)
}

async fn order_status(server: &TestServer, order: &Order) -> OrderStatusType {
    server.db.fetch_order_by_id(order.id).await.unwrap().unwrap().status
}

#[actix_web::test]
async fn epay_notifications_pay_and_settle_once() {
    let server = TestServer::new().await;
    let (order, author) = pending_order(&server, 990, "EPAY").await;
    let uri = format!("/notify/epay?{}", query_string(&epay_params(&order, "9.90")));
    let (status, body) = server.send(TestRequest::get().uri(&uri)).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "success"));
    assert_eq!(order_status(&server, &order).await, OrderStatusType::Paid);
    // 85% of 9.90 rounds half away from zero
    assert_eq!(server.balance(author).await, Money::from(842));

    // Redeliveries are acknowledged without paying anyone again, whichever way they arrive
    let (status, body) = server.send(TestRequest::get().uri(&uri)).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "success"));
    let req = TestRequest::post().uri("/notify/epay").set_form(epay_params(&order, "9.90"));
    let (status, body) = server.send(req).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "success"));
    assert_eq!(server.balance(author).await, Money::from(842));
    server.tear_down().await;
}

#[actix_web::test]
async fn bad_epay_notifications_change_nothing() {
    let server = TestServer::new().await;
    let (order, author) = pending_order(&server, 990, "EPAY").await;

    let mut forged = epay_params(&order, "9.90");
    forged.insert("money".into(), "0.01".into());
    let (status, body) = server.send(TestRequest::post().uri("/notify/epay").set_form(forged)).await;
    assert_eq!((status, body.as_str()), (StatusCode::BAD_REQUEST, "fail"));

    // Correctly signed, but for the wrong amount
    let req = TestRequest::post().uri("/notify/epay").set_form(epay_params(&order, "1.00"));
    let (status, body) = server.send(req).await;
    assert_eq!((status, body.as_str()), (StatusCode::BAD_REQUEST, "fail"));

    let mut unknown = order.clone();
    unknown.order_no = "20000101000000000000000".into();
    let req = TestRequest::post().uri("/notify/epay").set_form(epay_params(&unknown, "9.90"));
    let (status, body) = server.send(req).await;
    assert_eq!((status, body.as_str()), (StatusCode::NOT_FOUND, "fail"));

    assert_eq!(order_status(&server, &order).await, OrderStatusType::Pending);
    assert_eq!(server.balance(author).await, Money::from(0));
    server.tear_down().await;
}

#[actix_web::test]
async fn wechat_notifications_are_signed_in_a_header() {
    let server = TestServer::new().await;
    let (order, author) = pending_order(&server, 990, "WECHAT").await;
    let body = json!({
        "transaction_id": "4200001",
        "out_trade_no": order.order_no,
        "trade_state": "SUCCESS",
        "total": 990,
    });
    let params: BTreeMap<String, String> = body
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.as_str().map(String::from).unwrap_or_else(|| v.to_string())))
        .collect();
    let signature = hmac_sign(&params, WECHAT_SECRET);

    let req = TestRequest::post().uri("/notify/wechat").set_json(&body);
    let (status, response) = server.send(req).await;
    assert_eq!((status, response.as_str()), (StatusCode::BAD_REQUEST, WECHAT_FAIL));
    let req = TestRequest::post()
        .uri("/notify/wechat")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{");
    let (status, response) = server.send(req).await;
    assert_eq!((status, response.as_str()), (StatusCode::BAD_REQUEST, WECHAT_FAIL));
    assert_eq!(order_status(&server, &order).await, OrderStatusType::Pending);

    let req =
        TestRequest::post().uri("/notify/wechat").insert_header((WECHAT_SIGNATURE_HEADER, signature)).set_json(&body);
    let (status, response) = server.send(req).await;
    assert_eq!((status, response.as_str()), (StatusCode::OK, WECHAT_OK));
    assert_eq!(order_status(&server, &order).await, OrderStatusType::Paid);
    assert_eq!(server.balance(author).await, Money::from(842));
    server.tear_down().await;
}

#[actix_web::test]
async fn unconfigured_providers_are_refused() {
    let server = TestServer::new().await;
    let req = TestRequest::post().uri("/notify/alipay").set_form([("out_trade_no", "1"), ("sign", "x")]);
    let (status, body) = server.send(req).await;
    assert_eq!((status, body.as_str()), (StatusCode::BAD_REQUEST, "fail"));
    server.tear_down().await;
}

#[actix_web::test]
async fn provider_failures_are_bad_gateway() {
    let server = TestServer::new().await;
    let mut provider = MockProvider::new();
    provider.expect_method().return_const(PaymentMethod::Alipay);
    provider.expect_verify_notify().times(1).return_const(true);
    provider
        .expect_parse_notify()
        .times(1)
        .returning(|_| Err(PaymentGatewayError::ProviderError("Notification is missing 'out_trade_no'".into())));
    let api = PaymentApi::new(server.db.clone(), EventProducers::default()).with_provider(provider);
    let app = App::new().app_data(web::Data::new(api)).service(AlipayNotifyRoute::<SqliteDatabase>::new());
    let service = test::init_service(app).await;
    let req = TestRequest::post().uri("/notify/alipay").set_form([("trade_status", "TRADE_SUCCESS")]).to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(test::read_body(res).await, "fail");
    server.tear_down().await;
}
