use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use community_payment_engine::{
    account_objects::LedgerAudit,
    db_types::{LedgerTransaction, Money, TransactionType, UserAccount},
    AccountApi,
    LedgerError,
};
use serde_json::json;

use super::{
    helpers::{as_admin, as_user, error_code, TestServer, CONFIGURED_ADMIN},
    mocks::MockLedger,
};
use crate::routes::MyBalanceRoute;

#[actix_web::test]
async fn balance_requires_an_identity() {
    let server = TestServer::new().await;
    let (status, body) = server.send(TestRequest::get().uri("/api/balance")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "MISSING_IDENTITY");
    let (status, _) = server.send(TestRequest::get().uri("/api/balance").insert_header(("X-User-Id", "alice"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    server.tear_down().await;
}

#[actix_web::test]
async fn my_balance_and_history() {
    let server = TestServer::new().await;
    let alice = server.new_user("alice", 1_250).await;
    let req = as_user(TestRequest::get().uri("/api/balance"), alice.id);
    let account: UserAccount = server.send_json(req, StatusCode::OK).await;
    assert_eq!(account.id, alice.id);
    assert_eq!(account.balance, Money::from(1_250));

    let req = as_user(TestRequest::get().uri("/api/transactions?page=1&size=10"), alice.id);
    let history: Vec<LedgerTransaction> = server.send_json(req, StatusCode::OK).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].tx_type, TransactionType::Adjustment);
    assert_eq!(history[0].balance_after, Money::from(1_250));
    // Pages past the end are empty, however far out they are
    let uri = format!("/api/transactions?page={}&size=10", i64::MAX);
    let req = as_user(TestRequest::get().uri(&uri), alice.id);
    let history: Vec<LedgerTransaction> = server.send_json(req, StatusCode::OK).await;
    assert!(history.is_empty());

    let (status, body) = server.send(as_user(TestRequest::get().uri("/api/balance"), 404)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");
    server.tear_down().await;
}

#[actix_web::test]
async fn audit_is_for_admins_only() {
    let server = TestServer::new().await;
    let alice = server.new_user("alice", 300).await;
    let uri = format!("/api/audit/{}", alice.id);
    let (status, body) = server.send(as_user(TestRequest::get().uri(&uri), alice.id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "INSUFFICIENT_PERMISSIONS");

    let audit: LedgerAudit = server.send_json(as_admin(TestRequest::get().uri(&uri), 1), StatusCode::OK).await;
    assert!(audit.consistent);
    assert_eq!(audit.ledger_sum, Money::from(300));
    // Administrators listed in the configuration need no roles header
    let audit: LedgerAudit =
        server.send_json(as_user(TestRequest::get().uri(&uri), CONFIGURED_ADMIN), StatusCode::OK).await;
    assert_eq!(audit.balance, Money::from(300));
    server.tear_down().await;
}

#[actix_web::test]
async fn admins_open_accounts() {
    let server = TestServer::new().await;
    let body = json!({ "username": "carol", "opening_balance": 500 });
    let req = as_user(TestRequest::post().uri("/api/admin/accounts").set_json(&body), 1);
    assert_eq!(server.send(req).await.0, StatusCode::FORBIDDEN);

    let req = as_admin(TestRequest::post().uri("/api/admin/accounts").set_json(&body), 1);
    let account: UserAccount = server.send_json(req, StatusCode::CREATED).await;
    assert_eq!(account.username, "carol");
    assert_eq!(server.balance(account.id).await, Money::from(500));
    assert!(!account.personal_invite_code.is_empty());

    let req = as_admin(TestRequest::post().uri("/api/admin/accounts").set_json(&body), 1);
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "USERNAME_TAKEN");

    let req = as_admin(TestRequest::post().uri("/api/admin/accounts").set_json(json!({ "name": "x" })), 1);
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_REQUEST_BODY");
    server.tear_down().await;
}

#[actix_web::test]
async fn backend_failures_are_internal_errors() {
    let mut ledger = MockLedger::new();
    ledger
        .expect_fetch_user_account()
        .times(1)
        .returning(|_| Err(LedgerError::DatabaseError("disk I/O error".into())));
    let app = App::new()
        .app_data(web::Data::new(AccountApi::new(ledger)))
        .service(MyBalanceRoute::<MockLedger>::new());
    let service = test::init_service(app).await;
    let req = as_user(TestRequest::get().uri("/balance"), 3).to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = test::read_body(res).await;
    assert_eq!(error_code(&String::from_utf8_lossy(&body)), "DATABASE_ERROR");
}
