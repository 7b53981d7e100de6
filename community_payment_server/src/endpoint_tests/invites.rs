use std::time::Duration;

use actix_web::{http::StatusCode, test::TestRequest};
use chrono::Utc;
use community_payment_engine::{
    db_types::{InviteKind, InviteLink, InviteStatus, Money, Rate, UserAccount},
    invite_objects::{InviteStats, NewInviteLink},
    InviteManagement,
    LedgerManagement,
};
use serde_json::{json, Value};

use super::helpers::{as_user, error_code, TestServer};
use crate::expiry_worker::start_invite_expiry_worker;

fn redeem(code: &str) -> TestRequest {
    TestRequest::post().uri("/api/invites/redeem").set_json(json!({ "code": code }))
}

#[actix_web::test]
async fn invite_codes_link_users_once() {
    let server = TestServer::new().await;
    let inviter = server.new_user("inviter", 0).await;
    let invitee = server.new_user("invitee", 0).await;
    let late = server.new_user("late", 0).await;

    let req = as_user(TestRequest::post().uri("/api/invites"), inviter.id);
    let link: InviteLink = server.send_json(req, StatusCode::CREATED).await;
    assert_eq!(link.inviter_id, inviter.id);
    assert_eq!(link.kind, InviteKind::Disposable);
    assert_eq!(link.status, InviteStatus::Pending);
    assert_eq!(link.commission_rate, Rate::percent(5));
    assert!(link.expires_at.is_some_and(|t| t > Utc::now()));

    let (status, body) = server.send(as_user(redeem(&link.code), inviter.id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "SELF_INVITE");

    let used: InviteLink = server.send_json(as_user(redeem(&link.code), invitee.id), StatusCode::OK).await;
    assert_eq!(used.status, InviteStatus::Used);
    assert_eq!(used.invitee_id, Some(invitee.id));
    let account: UserAccount = server.db.fetch_user_account(invitee.id).await.unwrap().unwrap();
    assert_eq!(account.inviter_id, Some(inviter.id));

    // A user is only ever invited once, and disposable codes are single-use
    let (status, body) = server.send(as_user(redeem(&inviter.personal_invite_code), invitee.id)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "ALREADY_LINKED");
    let (status, _) = server.send(as_user(redeem(&link.code), late.id)).await;
    assert!(status.is_client_error());
    let (status, body) = server.send(as_user(redeem("NOPE1234"), late.id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "CODE_NOT_FOUND");
    let (status, body) = server.send(as_user(redeem("no spaces!"), late.id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_CODE");
    server.tear_down().await;
}

#[actix_web::test]
async fn inviters_choose_the_rate_and_lifetime() {
    let server = TestServer::new().await;
    let inviter = server.new_user("inviter", 0).await;
    let body = json!({ "commission_rate": "0.1", "ttl_days": 2 });
    let req = as_user(TestRequest::post().uri("/api/invites").set_json(body), inviter.id);
    let link: InviteLink = server.send_json(req, StatusCode::CREATED).await;
    assert_eq!(link.commission_rate, Rate::percent(10));
    let expires_in = link.expires_at.unwrap() - Utc::now();
    assert!(expires_in > chrono::Duration::hours(47) && expires_in <= chrono::Duration::days(2));

    for ttl_days in [3_651, 1_000_000_000, i64::MAX] {
        let body = json!({ "ttl_days": ttl_days });
        let req = as_user(TestRequest::post().uri("/api/invites").set_json(body), inviter.id);
        let (status, body) = server.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "ttl_days {ttl_days}: {body}");
        assert_eq!(error_code(&body), "INVALID_REQUEST_BODY");
    }

    let req = as_user(TestRequest::post().uri("/api/invites"), 404);
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "ACCOUNT_NOT_FOUND");
    server.tear_down().await;
}

#[actix_web::test]
async fn inviters_earn_from_their_invitees_purchases() {
    let server = TestServer::new().await;
    let inviter = server.new_user("inviter", 0).await;
    let buyer = server.new_user("buyer", 1_000).await;
    let author = server.new_user("author", 0).await;
    let _: InviteLink =
        server.send_json(as_user(redeem(&inviter.personal_invite_code), buyer.id), StatusCode::OK).await;
    let order = server.article_order(buyer.id, author.id, 100).await;
    let uri = format!("/api/orders/{}/pay", order.id);
    let req = TestRequest::post().uri(&uri).set_json(json!({ "method": "BALANCE" }));
    let _: Value = server.send_json(as_user(req, buyer.id), StatusCode::OK).await;
    assert_eq!(server.balance(inviter.id).await, Money::from(5));

    let req = as_user(TestRequest::get().uri("/api/invites/stats"), inviter.id);
    let stats: InviteStats = server.send_json(req, StatusCode::OK).await;
    assert_eq!(stats.invite_count, 1);
    assert_eq!(stats.total_commission, Money::from(5));
    assert_eq!(stats.pending_commission, Money::from(0));
    assert_eq!(stats.records.len(), 1);
    assert_eq!(stats.records[0].order_id, order.id);
    assert_eq!(stats.personal_invite_code, inviter.personal_invite_code);
    server.tear_down().await;
}

#[actix_web::test]
async fn stale_codes_expire() {
    let server = TestServer::new().await;
    let inviter = server.new_user("inviter", 0).await;
    let invitee = server.new_user("invitee", 0).await;
    let stale = NewInviteLink {
        inviter_id: inviter.id,
        code: "STALE0001".into(),
        kind: InviteKind::Disposable,
        commission_rate: Rate::percent(5),
        expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
    };
    server.db.insert_invite_link(stale).await.unwrap();
    let (status, body) = server.send(as_user(redeem("STALE0001"), invitee.id)).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(error_code(&body), "CODE_EXPIRED");

    let worker = start_invite_expiry_worker(server.db.clone(), Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(250)).await;
    worker.abort();
    let link = server.db.fetch_invite_by_code("STALE0001").await.unwrap().unwrap();
    assert_eq!(link.status, InviteStatus::Expired);
    server.tear_down().await;
}
