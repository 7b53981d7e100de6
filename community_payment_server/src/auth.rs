//! Requester identity.
//!
//! Users authenticate against the community's own login system, which sits in front of this server and forwards
//! the authenticated user on every request:
//! * `X-User-Id`: the numeric id of the user. Required on every `/api` route.
//! * `X-User-Roles`: an optional comma-separated list of roles. `admin` grants the administrator role.
//!
//! User ids listed in `CPG_ADMIN_IDS` are administrators regardless of the roles header.
//!
//! Handlers take an [`Identity`] argument to require a user, and admin-only routes are additionally wrapped in the
//! [`crate::middleware::AclMiddlewareFactory`].
use std::{fmt::Display, str::FromStr};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use community_payment_engine::order_objects::Requester;
use cpg_common::parse_list;
use futures::future::{ready, Ready};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{config::ServerOptions, errors::ServerError};

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLES_HEADER: &str = "X-User-Roles";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Admin => f.write_str("admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Unknown role: {s}")),
        }
    }
}

/// The user making the request, as asserted by the authentication gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub roles: Vec<Role>,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    pub fn has_roles(&self, roles: &[Role]) -> bool {
        roles.iter().all(|r| self.roles.contains(r))
    }

    pub fn requester(&self) -> Requester {
        Requester { user_id: self.user_id, is_admin: self.is_admin() }
    }

    pub fn from_http_request(req: &HttpRequest) -> Result<Self, ServerError> {
        let user_id = req
            .headers()
            .get(USER_ID_HEADER)
            .ok_or_else(|| ServerError::MissingIdentity(format!("The {USER_ID_HEADER} header is missing")))?
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| ServerError::MissingIdentity(format!("The {USER_ID_HEADER} header is not a user id")))?;
        let mut roles = vec![Role::User];
        if let Some(value) = req.headers().get(USER_ROLES_HEADER).and_then(|v| v.to_str().ok()) {
            for role in parse_list(value) {
                match role.parse::<Role>() {
                    Ok(role) if !roles.contains(&role) => roles.push(role),
                    Ok(_) => {},
                    Err(e) => debug!("🧑️ Ignoring role for user #{user_id}. {e}"),
                }
            }
        }
        let configured_admin =
            req.app_data::<web::Data<ServerOptions>>().map(|o| o.is_admin(user_id)).unwrap_or(false);
        if configured_admin && !roles.contains(&Role::Admin) {
            roles.push(Role::Admin);
        }
        trace!("🧑️ Request from user #{user_id} with roles {roles:?}");
        Ok(Self { user_id, roles })
    }
}

impl FromRequest for Identity {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_http_request(req))
    }
}
