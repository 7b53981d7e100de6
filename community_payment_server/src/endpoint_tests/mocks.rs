use community_payment_engine::{
    account_objects::{LedgerEntry, LedgerRequest, Pagination},
    db_types::{LedgerTransaction, Money, Order, PaymentMethod, PaymentRecord, ScoreTransaction, UserAccount},
    payment_objects::{IntentAction, NotifyRequest, ProviderNotification},
    providers::PaymentProvider,
    LedgerError,
    LedgerManagement,
    PaymentGatewayError,
};
use mockall::mock;

mock! {
    pub Ledger {}
    impl LedgerManagement for Ledger {
        async fn create_user_account(&self, username: &str, opening_balance: Money) -> Result<UserAccount, LedgerError>;
        async fn fetch_user_account(&self, user_id: i64) -> Result<Option<UserAccount>, LedgerError>;
        async fn debit(&self, request: LedgerRequest) -> Result<LedgerEntry, LedgerError>;
        async fn credit(&self, request: LedgerRequest) -> Result<LedgerEntry, LedgerError>;
        async fn adjust_score(&self, user_id: i64, delta: i64, description: &str)
            -> Result<ScoreTransaction, LedgerError>;
        async fn fetch_transactions(&self, user_id: i64, pagination: Pagination)
            -> Result<Vec<LedgerTransaction>, LedgerError>;
        async fn fetch_transactions_for_order(&self, order_id: i64) -> Result<Vec<LedgerTransaction>, LedgerError>;
        async fn fetch_score_transactions(&self, user_id: i64, pagination: Pagination)
            -> Result<Vec<ScoreTransaction>, LedgerError>;
        async fn ledger_sum(&self, user_id: i64) -> Result<Money, LedgerError>;
    }
}

mock! {
    pub Provider {}
    impl PaymentProvider for Provider {
        fn method(&self) -> PaymentMethod;
        fn create_intent(&self, order: &Order, record: &PaymentRecord) -> Result<IntentAction, PaymentGatewayError>;
        fn verify_notify(&self, request: &NotifyRequest) -> bool;
        fn parse_notify(&self, request: &NotifyRequest) -> Result<ProviderNotification, PaymentGatewayError>;
    }
}
