use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer, Scope};
use community_payment_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    payment_objects::PaymentGatewayConfig,
    providers::{EpayProvider, PaymentProvider, SharedSecretProvider},
    AccountApi,
    CommissionApi,
    InviteApi,
    OrderFlowApi,
    PaymentApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    expiry_worker::start_invite_expiry_worker,
    notify_routes::{AlipayNotifyRoute, EpayNotifyGetRoute, EpayNotifyPostRoute, WechatNotifyRoute},
    routes::{
        health,
        CancelOrderRoute,
        CommissionConfigRoute,
        CommissionQuoteRoute,
        CreateAccountRoute,
        CreateInviteRoute,
        CreateOrderRoute,
        InviteStatsRoute,
        LedgerAuditRoute,
        MyBalanceRoute,
        MyOrdersRoute,
        MyTransactionsRoute,
        OrderByNumberRoute,
        PayOrderRoute,
        RedeemInviteRoute,
        RefundOrderRoute,
        RetrySettlementRoute,
        UpdateCommissionConfigRoute,
        UpsertOverrideRoute,
    },
};

pub const EVENT_BUFFER_SIZE: usize = 50;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = create_event_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let _expiry_worker = start_invite_expiry_worker(db.clone(), config.invite_expiry_interval);
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Hooks that record every settled payment and balance change in the log. Downstream integrations (notifications to
/// authors, analytics) subscribe here.
pub fn create_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_payment_succeeded(|ev| {
        let summary = ev.summary;
        Box::pin(async move {
            info!(
                "📬️ Order [{}] settled. Author share: {}. Platform share: {}. Invite commission: {}",
                summary.order_no,
                summary.order_split.author_amount,
                summary.order_split.platform_amount,
                summary.invite_commission.map(|c| c.commission_amount.to_string()).unwrap_or_else(|| "none".into())
            );
        })
    });
    hooks.on_balance_changed(|ev| {
        Box::pin(async move {
            debug!(
                "📬️ Balance for user #{} is now {} after a {} of {}",
                ev.user_id, ev.balance, ev.transaction.tx_type, ev.transaction.amount
            );
        })
    });
    EventHandlers::new(EVENT_BUFFER_SIZE, hooks)
}

/// The provider adapters for every provider that has a gateway configured. They are shared by all workers.
pub fn configured_providers(config: &ServerConfig) -> Vec<Arc<dyn PaymentProvider>> {
    let mut providers: Vec<Arc<dyn PaymentProvider>> = Vec::new();
    if config.alipay_configured() {
        providers.push(Arc::new(SharedSecretProvider::alipay(config.alipay.clone())));
    } else {
        warn!("🚀️ No Alipay gateway is configured. Alipay payments will be refused.");
    }
    if config.wechat_configured() {
        providers.push(Arc::new(SharedSecretProvider::wechat(config.wechat.clone())));
    } else {
        warn!("🚀️ No WeChat Pay gateway is configured. WeChat payments will be refused.");
    }
    if config.epay_configured() {
        providers.push(Arc::new(EpayProvider::new(config.epay.clone())));
    } else {
        warn!("🚀️ No Epay gateway is configured. Epay payments will be refused.");
    }
    providers
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let context = ServerContext::new(&config, db, producers);
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("cpg::access_log"))
            .configure(|cfg| context.configure(cfg))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    info!("🚀️ Community payment server listening on {}:{}", config.host, config.port);
    Ok(srv)
}

/// Everything a worker needs to build its APIs. The provider adapters and the commission cache are shared between
/// workers; each worker gets its own API instances on top of them.
#[derive(Clone)]
pub struct ServerContext {
    db: SqliteDatabase,
    producers: EventProducers,
    providers: Vec<Arc<dyn PaymentProvider>>,
    commission_api: CommissionApi<SqliteDatabase>,
    gateway_config: PaymentGatewayConfig,
    options: ServerOptions,
}

impl ServerContext {
    pub fn new(config: &ServerConfig, db: SqliteDatabase, producers: EventProducers) -> Self {
        let providers = configured_providers(config);
        let commission_api = CommissionApi::new(db.clone());
        let gateway_config = config.payment_methods.gateway_config();
        let options = ServerOptions::from_config(config);
        Self { db, producers, providers, commission_api, gateway_config, options }
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        let db = &self.db;
        let accounts_api = AccountApi::new(db.clone());
        let orders_api = OrderFlowApi::new(db.clone());
        let invite_api = InviteApi::new(db.clone()).with_commission_api(self.commission_api.clone());
        let payment_api = self.providers.iter().fold(
            PaymentApi::new(db.clone(), self.producers.clone())
                .with_config(self.gateway_config.clone())
                .with_commission_api(self.commission_api.clone()),
            |api, provider| api.with_shared_provider(Arc::clone(provider)),
        );
        cfg.app_data(web::Data::new(accounts_api))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(self.commission_api.clone()))
            .app_data(web::Data::new(invite_api))
            .app_data(web::Data::new(payment_api))
            .app_data(web::Data::new(self.options.clone()));
        configure_extractors(cfg);
        cfg.service(api_scope())
            .service(health)
            .service(AlipayNotifyRoute::<SqliteDatabase>::new())
            .service(EpayNotifyGetRoute::<SqliteDatabase>::new())
            .service(EpayNotifyPostRoute::<SqliteDatabase>::new())
            .service(WechatNotifyRoute::<SqliteDatabase>::new());
    }
}

/// Every route under `/api`. Each one requires an identity; the admin routes also require the admin role.
pub fn api_scope() -> Scope {
    web::scope("/api")
        .service(MyBalanceRoute::<SqliteDatabase>::new())
        .service(MyTransactionsRoute::<SqliteDatabase>::new())
        .service(LedgerAuditRoute::<SqliteDatabase>::new())
        .service(CreateAccountRoute::<SqliteDatabase>::new())
        .service(CreateOrderRoute::<SqliteDatabase>::new())
        .service(MyOrdersRoute::<SqliteDatabase>::new())
        .service(OrderByNumberRoute::<SqliteDatabase>::new())
        .service(PayOrderRoute::<SqliteDatabase>::new())
        .service(CancelOrderRoute::<SqliteDatabase>::new())
        .service(RefundOrderRoute::<SqliteDatabase>::new())
        .service(RetrySettlementRoute::<SqliteDatabase>::new())
        .service(CommissionQuoteRoute::<SqliteDatabase>::new())
        .service(CommissionConfigRoute::<SqliteDatabase>::new())
        .service(UpdateCommissionConfigRoute::<SqliteDatabase>::new())
        .service(UpsertOverrideRoute::<SqliteDatabase>::new())
        .service(CreateInviteRoute::<SqliteDatabase>::new())
        .service(RedeemInviteRoute::<SqliteDatabase>::new())
        .service(InviteStatsRoute::<SqliteDatabase>::new())
}

/// Malformed bodies, queries and paths get the same JSON error body as every other failure.
pub fn configure_extractors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|e, _req| ServerError::InvalidRequestBody(e.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|e, _req| ServerError::InvalidRequestPath(e.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|e, _req| ServerError::InvalidRequestPath(e.to_string()).into()),
    );
}
