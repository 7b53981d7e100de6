use actix_web::{http::StatusCode, test::TestRequest};
use community_payment_engine::{
    commission_objects::{CommissionConfig, ContentSplit, RateSource},
    db_types::{Money, Rate},
};
use serde_json::{json, Value};

use super::helpers::{as_admin, as_user, error_code, TestServer};

fn quote(query: &str) -> TestRequest {
    TestRequest::get().uri(&format!("/api/commission/quote?{query}"))
}

#[actix_web::test]
async fn admin_routes_check_identity_then_role() {
    let server = TestServer::new().await;
    for (method, uri) in [
        ("GET", "/api/admin/commission"),
        ("PUT", "/api/admin/commission"),
        ("PUT", "/api/admin/commission/overrides"),
        ("POST", "/api/admin/accounts"),
        ("POST", "/api/admin/orders/1/retry-settlement"),
        ("GET", "/api/audit/1"),
    ] {
        let req = || match method {
            "GET" => TestRequest::get().uri(uri),
            "PUT" => TestRequest::put().uri(uri),
            _ => TestRequest::post().uri(uri),
        };
        let (status, body) = server.send(req()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(error_code(&body), "MISSING_IDENTITY");
        let (status, body) = server.send(as_user(req(), 1)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}");
        assert_eq!(error_code(&body), "INSUFFICIENT_PERMISSIONS");
    }
    server.tear_down().await;
}

#[actix_web::test]
async fn quotes_use_overrides_for_the_payee() {
    let server = TestServer::new().await;
    let author = server.new_user("author", 0).await;
    let req = as_user(quote("amount=200&content_type=ARTICLE"), author.id);
    let split: ContentSplit = server.send_json(req, StatusCode::OK).await;
    assert_eq!(split.commission_amount, Money::from(20));
    assert_eq!(split.payee_amount, Money::from(180));
    assert_eq!(split.source, RateSource::Global);

    let body = json!({ "user_id": author.id, "content_type": "ARTICLE", "rate": "0.05" });
    let req = as_admin(TestRequest::put().uri("/api/admin/commission/overrides").set_json(body), 1);
    let response: Value = server.send_json(req, StatusCode::OK).await;
    assert_eq!(response["success"], true);

    let req = as_user(quote("amount=200&content_type=ARTICLE"), author.id);
    let split: ContentSplit = server.send_json(req, StatusCode::OK).await;
    assert_eq!(split.commission_rate, Rate::percent(5));
    assert_eq!(split.commission_amount, Money::from(10));
    assert_eq!(split.source, RateSource::User);
    // Other content types and other payees keep the global rate
    let req = as_user(quote("amount=200&content_type=PRODUCT"), author.id);
    let split: ContentSplit = server.send_json(req, StatusCode::OK).await;
    assert_eq!(split.source, RateSource::Global);
    let query = format!("amount=200&content_type=ARTICLE&user_id={}", author.id);
    let split: ContentSplit = server.send_json(as_user(quote(&query), author.id), StatusCode::OK).await;
    assert_eq!(split.source, RateSource::User);
    let split: ContentSplit = server.send_json(as_admin(quote(&query), 1), StatusCode::OK).await;
    assert_eq!(split.source, RateSource::User);

    let (status, body) = server.send(as_user(quote("amount=200&content_type=VIDEO"), author.id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_REQUEST_PATH");
    server.tear_down().await;
}

#[actix_web::test]
async fn quotes_are_limited_to_the_requester_and_positive_amounts() {
    let server = TestServer::new().await;
    let author = server.new_user("author", 0).await;
    let snoop = server.new_user("snoop", 0).await;
    let query = format!("amount=200&content_type=ARTICLE&user_id={}", author.id);
    let (status, body) = server.send(as_user(quote(&query), snoop.id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "INSUFFICIENT_PERMISSIONS");

    for amount in ["0", "-5"] {
        let query = format!("amount={amount}&content_type=ARTICLE");
        let (status, body) = server.send(as_user(quote(&query), author.id)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "amount={amount}");
        assert_eq!(error_code(&body), "AMOUNT_MUST_BE_POSITIVE");
    }
    server.tear_down().await;
}

#[actix_web::test]
async fn settlement_uses_the_updated_config() {
    let server = TestServer::new().await;
    let buyer = server.new_user("buyer", 1_000).await;
    let author = server.new_user("author", 0).await;
    let req = as_admin(TestRequest::get().uri("/api/admin/commission"), 1);
    let mut config: CommissionConfig = server.send_json(req, StatusCode::OK).await;
    assert_eq!(config, CommissionConfig::default());

    config.platform_rate = Rate::percent(20);
    config.author_rate = Rate::percent(75);
    let req = as_admin(TestRequest::put().uri("/api/admin/commission").set_json(config), 1);
    let updated: CommissionConfig = server.send_json(req, StatusCode::OK).await;
    assert_eq!(updated.author_rate, Rate::percent(75));

    let order = server.article_order(buyer.id, author.id, 100).await;
    let uri = format!("/api/orders/{}/pay", order.id);
    let req = TestRequest::post().uri(&uri).set_json(json!({ "method": "BALANCE" }));
    let _: Value = server.send_json(as_user(req, buyer.id), StatusCode::OK).await;
    assert_eq!(server.balance(author.id).await, Money::from(75));

    let mut bad = serde_json::to_value(config).unwrap();
    bad["platform_rate"] = json!("1.5");
    let req = as_admin(TestRequest::put().uri("/api/admin/commission").set_json(bad), 1);
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_REQUEST_BODY");
    server.tear_down().await;
}
