use std::{collections::HashSet, env, time::Duration};

use community_payment_engine::{
    db_types::PaymentMethod,
    payment_objects::PaymentGatewayConfig,
    providers::{EpayConfig, SharedSecretConfig},
};
use cpg_common::{parse_boolean_flag, parse_list, Secret};
use log::*;

const DEFAULT_CPG_HOST: &str = "127.0.0.1";
const DEFAULT_CPG_PORT: u16 = 8370;
const DEFAULT_INVITE_EXPIRY_INTERVAL: Duration = Duration::from_secs(3600);
const DEFAULT_EPAY_CHANNEL: &str = "alipay";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The public base url of this server, used to build the notification urls handed to providers.
    pub notify_base_url: String,
    /// Where the provider sends the buyer's browser after checkout.
    pub return_url: String,
    /// Users that are treated as administrators whether or not the gateway asserts the admin role.
    pub admin_ids: Vec<i64>,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// How often stale invite codes are swept.
    pub invite_expiry_interval: Duration,
    pub payment_methods: PaymentMethodsConfig,
    pub alipay: SharedSecretConfig,
    pub wechat: SharedSecretConfig,
    pub epay: EpayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CPG_HOST.to_string(),
            port: DEFAULT_CPG_PORT,
            database_url: String::default(),
            notify_base_url: String::default(),
            return_url: String::default(),
            admin_ids: Vec::new(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            invite_expiry_interval: DEFAULT_INVITE_EXPIRY_INTERVAL,
            payment_methods: PaymentMethodsConfig::default(),
            alipay: SharedSecretConfig::default(),
            wechat: SharedSecretConfig::default(),
            epay: EpayConfig { channel: DEFAULT_EPAY_CHANNEL.into(), ..Default::default() },
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("CPG_HOST").ok().unwrap_or_else(|| DEFAULT_CPG_HOST.into());
        let port = env::var("CPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for CPG_PORT. {e} Using the default, {DEFAULT_CPG_PORT}, instead."
                    );
                    DEFAULT_CPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_CPG_PORT);
        let database_url = env::var("CPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ CPG_DATABASE_URL is not set. Please set it to the URL for the community payments database.");
            String::default()
        });
        let notify_base_url = env::var("CPG_NOTIFY_BASE_URL")
            .ok()
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| {
                let fallback = format!("http://{host}:{port}");
                warn!(
                    "🪛️ CPG_NOTIFY_BASE_URL is not set. Providers will be asked to notify {fallback}, which is \
                     probably not reachable from the internet."
                );
                fallback
            });
        let return_url = env::var("CPG_RETURN_URL").ok().unwrap_or_else(|| {
            info!("🪛️ CPG_RETURN_URL is not set. Buyers will be returned to {notify_base_url}");
            notify_base_url.clone()
        });
        let admin_ids = env::var("CPG_ADMIN_IDS").map(|s| parse_admin_ids(&s)).unwrap_or_default();
        if !admin_ids.is_empty() {
            info!("🪛️ Users {admin_ids:?} are configured as administrators");
        }
        let use_x_forwarded_for = parse_boolean_flag(env::var("CPG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("CPG_USE_FORWARDED").ok(), false);
        let invite_expiry_interval = configure_invite_expiry_interval();
        let payment_methods = PaymentMethodsConfig::from_env_or_default();
        let alipay = SharedSecretConfig {
            gateway_url: provider_var("CPG_ALIPAY_GATEWAY_URL"),
            app_id: provider_var("CPG_ALIPAY_APP_ID"),
            secret: Secret::new(provider_var("CPG_ALIPAY_SECRET")),
            notify_url: format!("{notify_base_url}/notify/alipay"),
            return_url: return_url.clone(),
        };
        let wechat = SharedSecretConfig {
            gateway_url: provider_var("CPG_WECHAT_GATEWAY_URL"),
            app_id: provider_var("CPG_WECHAT_MCH_ID"),
            secret: Secret::new(provider_var("CPG_WECHAT_SECRET")),
            notify_url: format!("{notify_base_url}/notify/wechat"),
            return_url: return_url.clone(),
        };
        let epay = EpayConfig {
            gateway_url: provider_var("CPG_EPAY_GATEWAY_URL"),
            merchant_id: provider_var("CPG_EPAY_MERCHANT_ID"),
            key: Secret::new(provider_var("CPG_EPAY_KEY")),
            channel: env::var("CPG_EPAY_CHANNEL").ok().unwrap_or_else(|| DEFAULT_EPAY_CHANNEL.into()),
            notify_url: format!("{notify_base_url}/notify/epay"),
            return_url: return_url.clone(),
        };
        Self {
            host,
            port,
            database_url,
            notify_base_url,
            return_url,
            admin_ids,
            use_x_forwarded_for,
            use_forwarded,
            invite_expiry_interval,
            payment_methods,
            alipay,
            wechat,
            epay,
        }
    }

    /// A provider is only registered once its gateway url is known.
    pub fn alipay_configured(&self) -> bool {
        !self.alipay.gateway_url.is_empty()
    }

    pub fn wechat_configured(&self) -> bool {
        !self.wechat.gateway_url.is_empty()
    }

    pub fn epay_configured(&self) -> bool {
        !self.epay.gateway_url.is_empty()
    }
}

fn provider_var(name: &str) -> String {
    env::var(name).ok().unwrap_or_else(|| {
        debug!("🪛️ {name} is not set");
        String::default()
    })
}

fn parse_admin_ids(s: &str) -> Vec<i64> {
    parse_list(s)
        .into_iter()
        .filter_map(|id| {
            id.parse::<i64>().map_err(|e| warn!("🪛️ Ignoring invalid user id ({id}) in CPG_ADMIN_IDS: {e}")).ok()
        })
        .collect()
}

fn configure_invite_expiry_interval() -> Duration {
    env::var("CPG_INVITE_EXPIRY_INTERVAL")
        .map_err(|_| {
            info!(
                "🪛️ CPG_INVITE_EXPIRY_INTERVAL is not set. Using the default value of {} s.",
                DEFAULT_INVITE_EXPIRY_INTERVAL.as_secs()
            )
        })
        .and_then(|s| {
            s.parse::<u64>()
                .map_err(|e| warn!("🪛️ Invalid configuration value for CPG_INVITE_EXPIRY_INTERVAL. {e}"))
                .and_then(|secs| match secs {
                    0 => {
                        warn!("🪛️ CPG_INVITE_EXPIRY_INTERVAL must be at least one second");
                        Err(())
                    },
                    s => Ok(Duration::from_secs(s)),
                })
        })
        .ok()
        .unwrap_or(DEFAULT_INVITE_EXPIRY_INTERVAL)
}

//-----------------------------------------------  PaymentMethodsConfig  -----------------------------------------------
/// Switches for accepting new payments with each method. Notifications for a disabled method are still processed, so
/// that buyers who paid before the switch was flipped still get their orders.
#[derive(Clone, Copy, Debug)]
pub struct PaymentMethodsConfig {
    pub alipay: bool,
    pub wechat: bool,
    pub epay: bool,
    pub balance: bool,
}

impl Default for PaymentMethodsConfig {
    fn default() -> Self {
        Self { alipay: true, wechat: true, epay: true, balance: true }
    }
}

impl PaymentMethodsConfig {
    pub fn from_env_or_default() -> Self {
        let flag = |name: &str| parse_boolean_flag(env::var(name).ok(), true);
        let result = Self {
            alipay: flag("CPG_ALIPAY_ENABLED"),
            wechat: flag("CPG_WECHAT_ENABLED"),
            epay: flag("CPG_EPAY_ENABLED"),
            balance: flag("CPG_BALANCE_ENABLED"),
        };
        let gateway_config = result.gateway_config();
        for method in [PaymentMethod::Alipay, PaymentMethod::Wechat, PaymentMethod::Epay, PaymentMethod::Balance] {
            if !gateway_config.is_enabled(method) {
                info!("🪛️ {method} payments are disabled");
            }
        }
        result
    }

    pub fn gateway_config(&self) -> PaymentGatewayConfig {
        let enabled_methods = [
            (PaymentMethod::Alipay, self.alipay),
            (PaymentMethod::Wechat, self.wechat),
            (PaymentMethod::Epay, self.epay),
            (PaymentMethod::Balance, self.balance),
        ]
        .into_iter()
        .filter_map(|(method, enabled)| enabled.then_some(method))
        .collect::<HashSet<_>>();
        PaymentGatewayConfig { enabled_methods }
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that request handlers need. It carries no secrets, so it is safe to share
/// with every worker.
#[derive(Clone, Debug, Default)]
pub struct ServerOptions {
    pub admin_ids: Vec<i64>,
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            admin_ids: config.admin_ids.clone(),
            use_x_forwarded_for: config.use_x_forwarded_for,
            use_forwarded: config.use_forwarded,
        }
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}
