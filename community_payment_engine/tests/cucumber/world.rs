use std::collections::HashMap;

use community_payment_engine::{
    db_types::{Order, UserAccount},
    events::EventProducers,
    test_utils::prepare_env::prepare_random_test_env,
    AccountApi,
    InviteApi,
    OrderFlowApi,
    SettlementApi,
    SqliteDatabase,
};
use cucumber::World;
use log::*;

#[derive(Default, Debug, World)]
pub struct CommunityWorld {
    pub system: Option<CommunitySystem>,
    pub users: HashMap<String, UserAccount>,
    pub orders: HashMap<String, Order>,
    /// The latest invite code created by each user
    pub invite_codes: HashMap<String, String>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub struct CommunitySystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub accounts: AccountApi<SqliteDatabase>,
    pub invites: InviteApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub settlement: SettlementApi<SqliteDatabase>,
}

impl CommunityWorld {
    pub fn system(&self) -> &CommunitySystem {
        self.system.as_ref().expect("System not initialised")
    }

    pub fn user(&self, name: &str) -> &UserAccount {
        self.users.get(name).unwrap_or_else(|| panic!("No user called {name}"))
    }

    pub fn order(&self, name: &str) -> &Order {
        self.orders.get(name).unwrap_or_else(|| panic!("No order called {name}"))
    }
}

impl CommunitySystem {
    pub async fn new() -> Self {
        let url = prepare_random_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        Self {
            db_path: url,
            accounts: AccountApi::new(db.clone()),
            invites: InviteApi::new(db.clone()),
            orders: OrderFlowApi::new(db.clone()),
            settlement: SettlementApi::new(db.clone(), EventProducers::default()),
            db,
        }
    }
}
