mod codes;
mod membership;
mod signing;

pub use codes::{is_valid_invite_code, new_invite_code, new_order_no, permanent_link_code};
pub use membership::extend_membership;
pub use signing::{canonical_query, hmac_sign, hmac_verify, md5_sign, md5_verify};
