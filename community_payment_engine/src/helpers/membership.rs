use chrono::{DateTime, Months, Utc};

use crate::{
    cpe_api::settlement_objects::MembershipPurchase,
    db_types::{Membership, MembershipStatus},
};

/// Applies a membership purchase to the user's current membership.
///
/// * A lifetime purchase, or an existing lifetime membership, results in a lifetime membership with no end date.
/// * An `ACTIVE` membership that has not yet ended is extended from its current end date.
/// * Otherwise a fresh window starts at `now`.
///
/// The membership level never goes down: it becomes the larger of the current and purchased levels.
pub fn extend_membership(current: &Membership, purchase: &MembershipPurchase, now: DateTime<Utc>) -> Membership {
    let level = current.level.max(purchase.level);
    if purchase.lifetime || current.lifetime {
        let start_date = match current.status {
            MembershipStatus::Active => current.start_date.or(Some(now)),
            _ => Some(now),
        };
        return Membership { level, status: MembershipStatus::Active, start_date, end_date: None, lifetime: true };
    }
    let months = Months::new(purchase.duration_months);
    let still_active =
        current.status == MembershipStatus::Active && current.end_date.map(|end| end > now).unwrap_or(false);
    let (start_date, from) = match (still_active, current.end_date) {
        (true, Some(end)) => (current.start_date.or(Some(now)), end),
        _ => (Some(now), now),
    };
    let end_date = from.checked_add_months(months).unwrap_or(DateTime::<Utc>::MAX_UTC);
    Membership { level, status: MembershipStatus::Active, start_date, end_date: Some(end_date), lifetime: false }
}
