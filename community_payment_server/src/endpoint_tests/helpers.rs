use actix_web::{body::to_bytes, http::StatusCode, test, test::TestRequest, App};
use community_payment_engine::{
    db_types::{Money, NewOrder, Order, OrderDetails, UserAccount},
    events::EventProducers,
    providers::{EpayConfig, SharedSecretConfig},
    test_utils::prepare_env::{drop_database, prepare_random_test_env},
    LedgerManagement,
    OrderFlowApi,
    PaymentGatewayDatabase,
    SqliteDatabase,
};
use cpg_common::Secret;
use log::debug;
use serde::de::DeserializeOwned;

use crate::{
    auth::{USER_ID_HEADER, USER_ROLES_HEADER},
    config::ServerConfig,
    server::ServerContext,
};

pub const EPAY_KEY: &str = "endpoint-test-epay-key";
pub const WECHAT_SECRET: &str = "endpoint-test-wechat-secret";
/// Listed in `CPG_ADMIN_IDS` for every test server
pub const CONFIGURED_ADMIN: i64 = 9_999;

/// A server wired exactly like production, on top of a throw-away database.
pub struct TestServer {
    pub db: SqliteDatabase,
    pub config: ServerConfig,
}

impl TestServer {
    pub async fn new() -> Self {
        let url = prepare_random_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        Self { db, config: test_config() }
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn tear_down(self) {
        let url = self.db.url().to_string();
        self.db.close().await;
        drop_database(&url).await;
    }

    pub async fn new_user(&self, name: &str, cents: i64) -> UserAccount {
        self.db.create_user_account(name, Money::from(cents)).await.expect("Error creating user")
    }

    pub async fn article_order(&self, buyer: i64, author: i64, cents: i64) -> Order {
        let order = NewOrder::new(buyer, author, Money::from(cents), OrderDetails::Article { article_id: 42 });
        OrderFlowApi::new(self.db.clone()).create_order(order).await.expect("Error creating order")
    }

    pub async fn balance(&self, user_id: i64) -> Money {
        self.db.fetch_user_account(user_id).await.expect("Error fetching account").expect("No such account").balance
    }

    /// Sends the request and returns the status and body. Errors raised by middleware are rendered the way the
    /// server renders them.
    pub async fn send(&self, req: TestRequest) -> (StatusCode, String) {
        let context = ServerContext::new(&self.config, self.db.clone(), EventProducers::default());
        let app = App::new().configure(|cfg| context.configure(cfg));
        let service = test::init_service(app).await;
        debug!("Making request");
        let res = match test::try_call_service(&service, req.to_request()).await {
            Ok(res) => res.into_parts().1,
            Err(e) => e.error_response(),
        };
        let status = res.status();
        let body = to_bytes(res.into_body()).await.expect("Error reading response body");
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    /// Sends the request and parses the JSON body, after checking the status.
    pub async fn send_json<T: DeserializeOwned>(&self, req: TestRequest, expected: StatusCode) -> T {
        let (status, body) = self.send(req).await;
        assert_eq!(status, expected, "Unexpected status. Body: {body}");
        serde_json::from_str(&body).unwrap_or_else(|e| panic!("Unexpected response body ({e}): {body}"))
    }
}

pub fn test_config() -> ServerConfig {
    let base = "https://community.example.com";
    ServerConfig {
        admin_ids: vec![CONFIGURED_ADMIN],
        notify_base_url: base.into(),
        return_url: format!("{base}/orders"),
        wechat: SharedSecretConfig {
            gateway_url: "https://wechat.example.com".into(),
            app_id: "mch-1".into(),
            secret: Secret::new(WECHAT_SECRET.to_string()),
            notify_url: format!("{base}/notify/wechat"),
            return_url: format!("{base}/orders"),
        },
        epay: EpayConfig {
            gateway_url: "https://pay.example.com".into(),
            merchant_id: "1001".into(),
            key: Secret::new(EPAY_KEY.to_string()),
            channel: "alipay".into(),
            notify_url: format!("{base}/notify/epay"),
            return_url: format!("{base}/orders"),
        },
        ..ServerConfig::new("127.0.0.1", 0)
    }
}

pub fn as_user(req: TestRequest, user_id: i64) -> TestRequest {
    req.insert_header((USER_ID_HEADER, user_id.to_string()))
}

pub fn as_admin(req: TestRequest, user_id: i64) -> TestRequest {
    as_user(req, user_id).insert_header((USER_ROLES_HEADER, "admin"))
}

/// The `code` field of a JSON error body.
pub fn error_code(body: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(body).unwrap_or_else(|e| panic!("Not JSON ({e}): {body}"));
    value["error"]["code"].as_str().unwrap_or_default().to_string()
}
