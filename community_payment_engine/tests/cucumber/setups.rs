use community_payment_engine::{
    commission_objects::CommissionConfig,
    db_types::{Money, Rate},
};
use cucumber::{gherkin::Step, given};

use crate::cucumber::{world::CommunitySystem, CommunityWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut CommunityWorld) {
    world.system = Some(CommunitySystem::new().await);
}

#[given(expr = "settlement rates of {word} platform, {word} author and {word} inviter")]
async fn settlement_rates(world: &mut CommunityWorld, platform: String, author: String, inviter: String) {
    let to_rate = |s: String| s.parse::<Rate>().expect("Invalid rate");
    let config = CommissionConfig {
        platform_rate: to_rate(platform),
        author_rate: to_rate(author),
        inviter_rate: to_rate(inviter),
        ..Default::default()
    };
    world.system().settlement.commission_api().update_global_config(config).await.expect("Error updating config");
}

/// | name  | balance |
/// | alice | 10.00   |
#[given("these users")]
async fn create_users(world: &mut CommunityWorld, step: &Step) {
    let table = step.table.as_ref().expect("Expected a table of users");
    for row in table.rows.iter().skip(1) {
        let name = row[0].as_str();
        let balance = row[1].parse::<Money>().expect("Invalid balance");
        let user = world.system().accounts.create_account(name, balance).await.expect("Error creating user");
        world.users.insert(name.to_string(), user);
    }
}
