use std::{collections::BTreeMap, net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use community_payment_engine::payment_objects::NotifyRequest;
use log::{debug, trace};
use regex::Regex;
use serde_json::Value;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        result = Regex::new(r#"for="?(?P<ip>[^;,"]+)"#).ok().and_then(|re| {
            req.headers()
                .get("Forwarded")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| re.captures(v))
                .and_then(|caps| caps.name("ip"))
                .and_then(|m| IpAddr::from_str(m.as_str()).ok())
        });
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
    })
}

/// Flattens a JSON notification body into the string key/value pairs that providers sign. Nested objects and arrays
/// are kept as their compact JSON text, and `null` fields are dropped.
pub fn json_to_params(body: &Value) -> Option<BTreeMap<String, String>> {
    let fields = body.as_object()?;
    let params = fields
        .iter()
        .filter_map(|(k, v)| {
            let v = match v {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => v.to_string(),
            };
            Some((k.clone(), v))
        })
        .collect();
    Some(params)
}

/// Builds a [`NotifyRequest`] from a request's fields and, optionally, the value of a signature header.
pub fn notify_request(
    params: BTreeMap<String, String>,
    req: &HttpRequest,
    signature_header: Option<&str>,
) -> NotifyRequest {
    let request = NotifyRequest::new(params);
    match signature_header.and_then(|h| req.headers().get(h)).and_then(|v| v.to_str().ok()) {
        Some(signature) => request.with_signature(signature.trim()),
        None => request,
    }
}
