#![allow(dead_code)]
use community_payment_engine::{
    db_types::{Money, NewOrder, Order, OrderDetails, UserAccount},
    sqlite_db::user_accounts::update_membership,
    test_utils::prepare_env::{drop_database, prepare_random_test_env},
    LedgerManagement,
    OrderFlowApi,
    PaymentGatewayDatabase,
    SqliteDatabase,
};
use community_payment_engine::db_types::Membership;

pub async fn setup() -> SqliteDatabase {
    let url = prepare_random_test_env().await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub async fn tear_down(db: SqliteDatabase) {
    let url = db.url().to_string();
    db.close().await;
    drop_database(&url).await;
}

pub async fn new_user(db: &SqliteDatabase, name: &str, cents: i64) -> UserAccount {
    db.create_user_account(name, Money::from(cents)).await.expect("Error creating user")
}

pub async fn article_order(db: &SqliteDatabase, buyer: i64, author: i64, cents: i64) -> Order {
    let order = NewOrder::new(buyer, author, Money::from(cents), OrderDetails::Article { article_id: 42 });
    OrderFlowApi::new(db.clone()).create_order(order).await.expect("Error creating order")
}

pub async fn membership_order(db: &SqliteDatabase, buyer: i64, author: i64, cents: i64, months: u32) -> Order {
    let details = OrderDetails::Membership { level: 1, duration_months: months, is_lifetime: false };
    let order = NewOrder::new(buyer, author, Money::from(cents), details);
    OrderFlowApi::new(db.clone()).create_order(order).await.expect("Error creating order")
}

pub async fn set_membership(db: &SqliteDatabase, user_id: i64, membership: &Membership) {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    update_membership(user_id, membership, &mut conn).await.expect("Error updating membership");
}

pub async fn balance(db: &SqliteDatabase, user_id: i64) -> Money {
    db.fetch_user_account(user_id).await.expect("Error fetching account").expect("No such account").balance
}
