use community_payment_engine::{
    db_types::{InviteStatus, MembershipStatus, Money, NewOrder, OrderDetails, OrderStatusType, PaymentMethod},
    LedgerManagement,
};
use cucumber::{then, when};

use crate::cucumber::CommunityWorld;

#[when(expr = "{word} creates an invite code")]
async fn create_invite(world: &mut CommunityWorld, inviter: String) {
    let inviter_id = world.user(&inviter).id;
    let invites = &world.system().invites;
    let link = invites.create_invite_link(inviter_id, None, None).await.expect("Error creating invite");
    world.invite_codes.insert(inviter, link.code);
}

#[when(expr = "{word} redeems the invite code of {word}")]
async fn redeem_invite(world: &mut CommunityWorld, invitee: String, inviter: String) {
    let code = world.invite_codes.get(&inviter).cloned().expect("No invite code was created");
    let invitee_id = world.user(&invitee).id;
    match world.system().invites.redeem(invitee_id, &code).await {
        Ok(link) => assert_eq!(link.status, InviteStatus::Used),
        Err(e) => world.last_error = Some(e.to_string()),
    }
}

#[when(expr = "{word} buys article {int} from {word} for {word} as order {word}")]
async fn buy_article(
    world: &mut CommunityWorld,
    buyer: String,
    article_id: i64,
    author: String,
    price: String,
    name: String,
) {
    let details = OrderDetails::Article { article_id };
    place_order(world, &buyer, &author, &price, details, name).await;
}

#[when(expr = "{word} buys {int} month(s) of membership from {word} for {word} as order {word}")]
async fn buy_membership(
    world: &mut CommunityWorld,
    buyer: String,
    months: u32,
    seller: String,
    price: String,
    name: String,
) {
    let details = OrderDetails::Membership { level: 1, duration_months: months, is_lifetime: false };
    place_order(world, &buyer, &seller, &price, details, name).await;
}

async fn place_order(
    world: &mut CommunityWorld,
    buyer: &str,
    seller: &str,
    price: &str,
    details: OrderDetails,
    name: String,
) {
    let amount = price.parse::<Money>().expect("Invalid price");
    let order = NewOrder::new(world.user(buyer).id, world.user(seller).id, amount, details);
    let order = world.system().orders.create_order(order).await.expect("Error creating order");
    world.orders.insert(name, order);
}

#[when(expr = "order {word} is paid by {word}")]
async fn pay_order(world: &mut CommunityWorld, name: String, method: String) {
    let method = method.parse::<PaymentMethod>().expect("Invalid payment method");
    let order_id = world.order(&name).id;
    let system = world.system();
    match system.orders.mark_paid(order_id, method).await {
        Ok(paid) => {
            system.settlement.settle(&paid).await.expect("Error settling order");
        },
        Err(e) => world.last_error = Some(e.to_string()),
    }
}

#[when(expr = "settlement of order {word} is retried")]
async fn retry_settlement(world: &mut CommunityWorld, name: String) {
    let order_id = world.order(&name).id;
    world.system().settlement.retry_settlement(order_id).await.expect("Error retrying settlement");
}

#[then(expr = "{word} has a balance of {word}")]
async fn check_balance(world: &mut CommunityWorld, name: String, expected: String) {
    let expected = expected.parse::<Money>().expect("Invalid amount");
    let balance = world.system().accounts.balance(world.user(&name).id).await.expect("Error fetching balance");
    assert_eq!(balance, expected, "Balance of {name} is incorrect");
}

#[then(expr = "the ledger of {word} adds up")]
async fn check_audit(world: &mut CommunityWorld, name: String) {
    let audit = world.system().accounts.audit(world.user(&name).id).await.expect("Error auditing ledger");
    assert!(audit.consistent, "Ledger of {name} is inconsistent: {audit:?}");
}

#[then(expr = "order {word} is {word}")]
async fn check_order_status(world: &mut CommunityWorld, name: String, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Invalid order status");
    let order_id = world.order(&name).id;
    let order = world.system().orders.fetch_order(order_id).await.expect("Error fetching order").expect("No order");
    assert_eq!(order.status, expected);
}

#[then(expr = "{word} is an active member")]
async fn check_membership(world: &mut CommunityWorld, name: String) {
    let account = world.system().db.fetch_user_account(world.user(&name).id).await.expect("Error").expect("No user");
    assert_eq!(account.membership_status, MembershipStatus::Active);
    assert!(account.membership_end_date.is_some());
}

#[then(expr = "the last error mentions {string}")]
async fn check_last_error(world: &mut CommunityWorld, fragment: String) {
    let error = world.last_error.as_deref().expect("No error was recorded");
    assert!(error.contains(&fragment), "'{error}' does not mention '{fragment}'");
}
