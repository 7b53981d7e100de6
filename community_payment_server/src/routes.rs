//! Request handler definitions
//!
//! Define each route and its handler here. Provider notification webhooks live in [`crate::notify_routes`].
//!
//! Every `/api` handler takes an [`Identity`], so requests without an `X-User-Id` header are refused with 401.
//! Administrator routes are registered with `where requires [Role::Admin]`, which wraps them in the ACL middleware.
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every database call in the engine is async, so keep it that way:
//! never call blocking code from a handler.
use actix_web::{get, web, HttpResponse, Responder};
use community_payment_engine::{
    account_objects::Pagination,
    commission_objects::CommissionConfig,
    AccountApi,
    CommissionApi,
    CommissionSettings,
    InviteApi,
    InviteManagement,
    LedgerManagement,
    OrderFlowApi,
    PaymentApi,
    PaymentGatewayDatabase,
};
use log::*;

use crate::{
    auth::{Identity, Role},
    data_objects::{
        CommissionQuoteParams,
        JsonResponse,
        NewAccountRequest,
        NewInviteRequest,
        NewOrderRequest,
        OverrideRequest,
        PageParams,
        PayOrderRequest,
        RedeemInviteRequest,
        RefundRequest,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro.
// Each route is generic over a single backend type, `B`, which must satisfy every listed bound.
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:path),+ where requires [$($roles:expr),+]) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>); }
        paste::paste! { impl<B> [<$name:camel Route>]<B> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> B>)
            }
        }}
        paste::paste! { impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
        where
            B: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:path),+) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>); }
        paste::paste! { impl<B> [<$name:camel Route>]<B> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> B>)
            }
        }}
        paste::paste! { impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
        where
            B: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Accounts  ----------------------------------------------------
route!(my_balance => Get "/balance" impl LedgerManagement);
/// The requester's account: balance, score and membership.
pub async fn my_balance<B: LedgerManagement>(
    identity: Identity,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET balance for user #{}", identity.user_id);
    let account = api
        .account(identity.user_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("User #{} has no account", identity.user_id)))?;
    Ok(HttpResponse::Ok().json(account))
}

route!(my_transactions => Get "/transactions" impl LedgerManagement);
/// The requester's ledger history, newest first. Use `?page=n&size=m` to page through it.
pub async fn my_transactions<B: LedgerManagement>(
    identity: Identity,
    query: web::Query<PageParams>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let pagination = Pagination::from(query.into_inner());
    debug!("💻️ GET transactions for user #{} ({pagination:?})", identity.user_id);
    let history = api.history(identity.user_id, pagination).await?;
    Ok(HttpResponse::Ok().json(history))
}

route!(ledger_audit => Get "/audit/{user_id}" impl LedgerManagement where requires [Role::Admin]);
/// Compares a user's balance with the sum of their ledger rows.
pub async fn ledger_audit<B: LedgerManagement>(
    path: web::Path<i64>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    debug!("💻️ GET ledger audit for user #{user_id}");
    let audit = api.audit(user_id).await?;
    Ok(HttpResponse::Ok().json(audit))
}

route!(create_account => Post "/admin/accounts" impl LedgerManagement where requires [Role::Admin]);
pub async fn create_account<B: LedgerManagement>(
    body: web::Json<NewAccountRequest>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let NewAccountRequest { username, opening_balance } = body.into_inner();
    info!("💻️ Creating account for {username} with an opening balance of {opening_balance}");
    let account = api.create_account(&username, opening_balance).await?;
    Ok(HttpResponse::Created().json(account))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/orders" impl PaymentGatewayDatabase);
/// Creates a `PENDING` order with the requester as the buyer.
pub async fn create_order<B: PaymentGatewayDatabase>(
    identity: Identity,
    body: web::Json<NewOrderRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST new order for user #{}", identity.user_id);
    let order = api.create_order(body.into_inner().into_new_order(identity.user_id)).await?;
    Ok(HttpResponse::Created().json(order))
}

route!(my_orders => Get "/orders" impl PaymentGatewayDatabase);
pub async fn my_orders<B: PaymentGatewayDatabase>(
    identity: Identity,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET orders for user #{}", identity.user_id);
    let orders = api.orders_for_user(identity.user_id).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(order_by_number => Get "/orders/{order_no}" impl PaymentGatewayDatabase);
/// Buyers, sellers and administrators can see an order. Anyone else gets 403.
pub async fn order_by_number<B: PaymentGatewayDatabase>(
    identity: Identity,
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_no = path.into_inner();
    debug!("💻️ GET order {order_no} for user #{}", identity.user_id);
    let order = api.order_for_requester(&order_no, identity.requester()).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(pay_order => Post "/orders/{id}/pay" impl PaymentGatewayDatabase, InviteManagement, CommissionSettings);
/// Starts a payment for an order.
///
/// The response carries the next step for the client: a checkout `redirect`, a `qr_code` to render, or `completed`
/// for balance payments, which are paid and settled before the response is sent.
pub async fn pay_order<B>(
    identity: Identity,
    path: web::Path<i64>,
    body: web::Json<PayOrderRequest>,
    api: web::Data<PaymentApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + InviteManagement + CommissionSettings,
{
    let order_id = path.into_inner();
    let method = body.method;
    info!("💻️ User #{} is paying for order #{order_id} with {method}", identity.user_id);
    let intent = api.create_intent(order_id, identity.requester(), method).await?;
    Ok(HttpResponse::Ok().json(intent))
}

route!(cancel_order => Post "/orders/{id}/cancel" impl PaymentGatewayDatabase);
pub async fn cancel_order<B: PaymentGatewayDatabase>(
    identity: Identity,
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    info!("💻️ User #{} is cancelling order #{order_id}", identity.user_id);
    let order = api.cancel(order_id, identity.requester()).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(refund_order => Post "/orders/{id}/refund" impl PaymentGatewayDatabase);
/// The seller or an administrator refunds a paid order. Settlement credits are not reversed.
pub async fn refund_order<B: PaymentGatewayDatabase>(
    identity: Identity,
    path: web::Path<i64>,
    body: Option<web::Json<RefundRequest>>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let reason = body.map(|b| b.into_inner().reason).unwrap_or_default();
    info!("💻️ User #{} is refunding order #{order_id}. Reason: {reason}", identity.user_id);
    let order = api.refund(order_id, identity.requester(), &reason).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(retry_settlement => Post "/admin/orders/{id}/retry-settlement" impl PaymentGatewayDatabase, InviteManagement,
    CommissionSettings where requires [Role::Admin]);
/// Finishes the settlement of a paid order whose settlement was interrupted. Never pays anyone twice.
pub async fn retry_settlement<B>(
    path: web::Path<i64>,
    api: web::Data<PaymentApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + InviteManagement + CommissionSettings,
{
    let order_id = path.into_inner();
    warn!("💻️ Settlement retry requested for order #{order_id}");
    let summary = api.settlement().retry_settlement(order_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

//----------------------------------------------   Commission  ----------------------------------------------------
route!(commission_quote => Get "/commission/quote" impl CommissionSettings, Clone);
/// Quotes the platform commission on a content sale, e.g. `?amount=200&content_type=ARTICLE`.
///
/// Users can only quote their own rates. Admins may pass `user_id` to quote for anyone.
pub async fn commission_quote<B: CommissionSettings + Clone>(
    identity: Identity,
    query: web::Query<CommissionQuoteParams>,
    api: web::Data<CommissionApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = query.into_inner();
    let payee = params.user_id.unwrap_or(identity.user_id);
    if payee != identity.user_id && !identity.is_admin() {
        warn!("💻️ User #{} asked for the commission rates of user #{payee}", identity.user_id);
        return Err(ServerError::InsufficientPermissions("Only admins can quote for other users".into()));
    }
    trace!("💻️ Commission quote for user #{payee}: {} on {}", params.content_type, params.amount);
    let split = api.split_for_content(payee, params.amount, params.content_type).await?;
    Ok(HttpResponse::Ok().json(split))
}

route!(commission_config => Get "/admin/commission" impl CommissionSettings, Clone where requires [Role::Admin]);
pub async fn commission_config<B: CommissionSettings + Clone>(
    api: web::Data<CommissionApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let config = api.config().await?;
    Ok(HttpResponse::Ok().json(config))
}

route!(update_commission_config => Put "/admin/commission" impl CommissionSettings, Clone where requires [Role::Admin]);
/// Replaces the global commission configuration. Rates outside `[0, 1]` are refused.
pub async fn update_commission_config<B: CommissionSettings + Clone>(
    body: web::Json<CommissionConfig>,
    api: web::Data<CommissionApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let config = api.update_global_config(body.into_inner()).await?;
    info!("💻️ Commission configuration replaced");
    Ok(HttpResponse::Ok().json(config))
}

route!(upsert_override => Put "/admin/commission/overrides" impl CommissionSettings, Clone
    where requires [Role::Admin]);
pub async fn upsert_override<B: CommissionSettings + Clone>(
    body: web::Json<OverrideRequest>,
    api: web::Data<CommissionApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let value = body.into_inner();
    api.set_user_override(value.into()).await?;
    let msg = format!("{} commission override for user #{} set to {}", value.content_type, value.user_id, value.rate);
    info!("💻️ {msg}");
    Ok(HttpResponse::Ok().json(JsonResponse::success(msg)))
}

//----------------------------------------------   Invites  ----------------------------------------------------
route!(create_invite => Post "/invites" impl InviteManagement, CommissionSettings, LedgerManagement, Clone);
/// Creates a single-use invite code for the requester.
pub async fn create_invite<B>(
    identity: Identity,
    body: Option<web::Json<NewInviteRequest>>,
    api: web::Data<InviteApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InviteManagement + CommissionSettings + LedgerManagement + Clone,
{
    let request = body.map(|b| b.into_inner()).unwrap_or_default();
    debug!("💻️ User #{} is creating an invite code", identity.user_id);
    let link = api.create_invite_link(identity.user_id, request.commission_rate, request.ttl()?).await?;
    Ok(HttpResponse::Created().json(link))
}

route!(redeem_invite => Post "/invites/redeem" impl InviteManagement, CommissionSettings, LedgerManagement, Clone);
/// Links the requester to the owner of an invite code. A user can only ever be invited once.
pub async fn redeem_invite<B>(
    identity: Identity,
    body: web::Json<RedeemInviteRequest>,
    api: web::Data<InviteApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InviteManagement + CommissionSettings + LedgerManagement + Clone,
{
    info!("💻️ User #{} is redeeming invite code {}", identity.user_id, body.code);
    let link = api.redeem(identity.user_id, &body.code).await?;
    Ok(HttpResponse::Ok().json(link))
}

route!(invite_stats => Get "/invites/stats" impl InviteManagement, CommissionSettings, LedgerManagement, Clone);
pub async fn invite_stats<B>(identity: Identity, api: web::Data<InviteApi<B>>) -> Result<HttpResponse, ServerError>
where B: InviteManagement + CommissionSettings + LedgerManagement + Clone {
    debug!("💻️ GET invite stats for user #{}", identity.user_id);
    let stats = api.stats(identity.user_id).await?;
    Ok(HttpResponse::Ok().json(stats))
}
