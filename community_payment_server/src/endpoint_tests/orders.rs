use actix_web::{http::StatusCode, test::TestRequest};
use community_payment_engine::{
    db_types::{Money, Order, OrderStatusType, OrderType},
    settlement_objects::SettlementSummary,
};
use serde_json::{json, Value};

use super::helpers::{as_admin, as_user, error_code, test_config, TestServer};
use crate::config::{PaymentMethodsConfig, ServerConfig};

fn pay(order_id: i64, method: &str) -> TestRequest {
    TestRequest::post().uri(&format!("/api/orders/{order_id}/pay")).set_json(json!({ "method": method }))
}

#[actix_web::test]
async fn buyers_create_and_view_orders() {
    let server = TestServer::new().await;
    let buyer = server.new_user("buyer", 0).await;
    let author = server.new_user("author", 0).await;
    let stranger = server.new_user("stranger", 0).await;
    let body = json!({ "author_id": author.id, "amount": 990, "details": { "type": "ARTICLE", "articleId": 7 } });
    let req = as_user(TestRequest::post().uri("/api/orders").set_json(&body), buyer.id);
    let order: Order = server.send_json(req, StatusCode::CREATED).await;
    assert_eq!(order.user_id, buyer.id);
    assert_eq!(order.order_type, OrderType::Article);
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.order_no.len(), 23);

    let req = as_user(TestRequest::get().uri("/api/orders"), buyer.id);
    let orders: Vec<Order> = server.send_json(req, StatusCode::OK).await;
    assert_eq!(orders, vec![order.clone()]);

    let uri = format!("/api/orders/{}", order.order_no);
    for viewer in [buyer.id, author.id] {
        let found: Order = server.send_json(as_user(TestRequest::get().uri(&uri), viewer), StatusCode::OK).await;
        assert_eq!(found.id, order.id);
    }
    let (status, body) = server.send(as_user(TestRequest::get().uri(&uri), stranger.id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "NOT_AUTHORIZED");
    let _: Order = server.send_json(as_admin(TestRequest::get().uri(&uri), stranger.id), StatusCode::OK).await;
    let req = as_user(TestRequest::get().uri("/api/orders/00000000000000000000000"), buyer.id);
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "ORDER_NOT_FOUND");
    server.tear_down().await;
}

#[actix_web::test]
async fn invalid_orders_are_refused() {
    let server = TestServer::new().await;
    let buyer = server.new_user("buyer", 0).await;
    let author = server.new_user("author", 0).await;
    let article = json!({ "type": "ARTICLE", "articleId": 7 });
    // Neither a duration nor lifetime
    let membership = json!({ "type": "MEMBERSHIP", "level": 1 });
    let cases = [
        (json!({ "author_id": author.id, "amount": 0, "details": article }), "AMOUNT_MUST_BE_POSITIVE"),
        (json!({ "author_id": 777, "amount": 100, "details": article }), "ACCOUNT_NOT_FOUND"),
        (json!({ "author_id": author.id, "amount": 100, "details": membership }), "INVALID_ORDER"),
        (json!({ "author_id": author.id, "amount": 100, "details": { "type": "COURSE" } }), "INVALID_REQUEST_BODY"),
    ];
    for (body, code) in cases {
        let req = as_user(TestRequest::post().uri("/api/orders").set_json(&body), buyer.id);
        let (status, response) = server.send(req).await;
        assert!(status.is_client_error(), "{body} should fail with a client error, got {status}");
        assert_eq!(error_code(&response), code);
    }
    server.tear_down().await;
}

#[actix_web::test]
async fn balance_payments_settle_before_responding() {
    let server = TestServer::new().await;
    let buyer = server.new_user("buyer", 1_000).await;
    let author = server.new_user("author", 0).await;
    let order = server.article_order(buyer.id, author.id, 100).await;

    let intent: Value = server.send_json(as_user(pay(order.id, "BALANCE"), buyer.id), StatusCode::OK).await;
    assert_eq!(intent["action"], "completed");
    assert_eq!(intent["record"]["status"], "SUCCESS");
    let summary: SettlementSummary = serde_json::from_value(intent["settlement"].clone()).unwrap();
    assert_eq!(summary.order_split.author_amount, Money::from(85));
    assert_eq!(server.balance(buyer.id).await, Money::from(900));
    assert_eq!(server.balance(author.id).await, Money::from(85));

    let (status, body) = server.send(as_user(pay(order.id, "BALANCE"), buyer.id)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "ALREADY_PAID");
    assert_eq!(server.balance(buyer.id).await, Money::from(900));
    server.tear_down().await;
}

#[actix_web::test]
async fn balance_payments_need_funds() {
    let server = TestServer::new().await;
    let buyer = server.new_user("buyer", 50).await;
    let author = server.new_user("author", 0).await;
    let order = server.article_order(buyer.id, author.id, 100).await;
    let (status, body) = server.send(as_user(pay(order.id, "BALANCE"), buyer.id)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(error_code(&body), "INSUFFICIENT_BALANCE");
    assert_eq!(server.balance(buyer.id).await, Money::from(50));
    let (status, body) = server.send(as_user(pay(order.id, "BALANCE"), author.id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "NOT_AUTHORIZED");
    server.tear_down().await;
}

#[actix_web::test]
async fn provider_payments_return_the_next_step() {
    let server = TestServer::new().await;
    let buyer = server.new_user("buyer", 0).await;
    let author = server.new_user("author", 0).await;
    let order = server.article_order(buyer.id, author.id, 990).await;

    let intent: Value = server.send_json(as_user(pay(order.id, "EPAY"), buyer.id), StatusCode::OK).await;
    assert_eq!(intent["action"], "redirect");
    let url = intent["url"].as_str().unwrap();
    assert!(url.starts_with("https://pay.example.com/submit.php?"));
    assert!(url.contains(&order.order_no));
    assert_eq!(intent["record"]["status"], "PENDING");

    let intent: Value = server.send_json(as_user(pay(order.id, "WECHAT"), buyer.id), StatusCode::OK).await;
    assert_eq!(intent["action"], "qr_code");
    assert!(intent["code_url"].as_str().unwrap().starts_with("https://wechat.example.com/native?"));

    // No Alipay gateway is configured for the test server
    let (status, body) = server.send(as_user(pay(order.id, "ALIPAY"), buyer.id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "UNSUPPORTED_PAYMENT_METHOD");
    let (status, body) = server.send(as_user(pay(order.id, "CASH"), buyer.id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_REQUEST_BODY");
    assert_eq!(server.balance(author.id).await, Money::from(0));
    server.tear_down().await;
}

#[actix_web::test]
async fn disabled_methods_are_refused() {
    let methods = PaymentMethodsConfig { balance: false, ..Default::default() };
    let server = TestServer::new().await.with_config(ServerConfig { payment_methods: methods, ..test_config() });
    let buyer = server.new_user("buyer", 1_000).await;
    let author = server.new_user("author", 0).await;
    let order = server.article_order(buyer.id, author.id, 100).await;
    let (status, body) = server.send(as_user(pay(order.id, "BALANCE"), buyer.id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "PAYMENT_METHOD_DISABLED");
    assert_eq!(server.balance(buyer.id).await, Money::from(1_000));
    server.tear_down().await;
}

#[actix_web::test]
async fn only_buyers_cancel_pending_orders() {
    let server = TestServer::new().await;
    let buyer = server.new_user("buyer", 0).await;
    let author = server.new_user("author", 0).await;
    let order = server.article_order(buyer.id, author.id, 100).await;
    let uri = format!("/api/orders/{}/cancel", order.id);
    let (status, _) = server.send(as_user(TestRequest::post().uri(&uri), author.id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let cancelled: Order = server.send_json(as_user(TestRequest::post().uri(&uri), buyer.id), StatusCode::OK).await;
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);
    let (status, body) = server.send(as_user(TestRequest::post().uri(&uri), buyer.id)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "ORDER_MODIFICATION_FORBIDDEN");
    let (status, _) = server.send(as_user(pay(order.id, "BALANCE"), buyer.id)).await;
    assert!(status.is_client_error());
    server.tear_down().await;
}

#[actix_web::test]
async fn refunds_keep_settlement_credits() {
    let server = TestServer::new().await;
    let buyer = server.new_user("buyer", 1_000).await;
    let author = server.new_user("author", 0).await;
    let order = server.article_order(buyer.id, author.id, 100).await;
    let uri = format!("/api/orders/{}/refund", order.id);
    let (status, body) = server.send(as_user(TestRequest::post().uri(&uri), author.id)).await;
    assert_eq!(status, StatusCode::CONFLICT, "Pending orders cannot be refunded");
    assert_eq!(error_code(&body), "ORDER_MODIFICATION_FORBIDDEN");

    let _: Value = server.send_json(as_user(pay(order.id, "BALANCE"), buyer.id), StatusCode::OK).await;
    let (status, _) = server.send(as_user(TestRequest::post().uri(&uri), buyer.id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let req = as_user(TestRequest::post().uri(&uri).set_json(json!({ "reason": "duplicate purchase" })), author.id);
    let refunded: Order = server.send_json(req, StatusCode::OK).await;
    assert_eq!(refunded.status, OrderStatusType::Refunded);
    assert_eq!(refunded.refund_reason.as_deref(), Some("duplicate purchase"));
    assert_eq!(server.balance(buyer.id).await, Money::from(900));
    assert_eq!(server.balance(author.id).await, Money::from(85));
    server.tear_down().await;
}

#[actix_web::test]
async fn settlement_retries_are_idempotent() {
    let server = TestServer::new().await;
    let buyer = server.new_user("buyer", 1_000).await;
    let author = server.new_user("author", 0).await;
    let order = server.article_order(buyer.id, author.id, 200).await;
    let _: Value = server.send_json(as_user(pay(order.id, "BALANCE"), buyer.id), StatusCode::OK).await;
    let uri = format!("/api/admin/orders/{}/retry-settlement", order.id);
    let (status, _) = server.send(as_user(TestRequest::post().uri(&uri), buyer.id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = as_admin(TestRequest::post().uri(&uri), 1);
    let summary: SettlementSummary = server.send_json(req, StatusCode::OK).await;
    assert!(summary.replayed);
    assert_eq!(summary.order_split.author_amount, Money::from(170));
    assert_eq!(server.balance(author.id).await, Money::from(170));
    server.tear_down().await;
}
