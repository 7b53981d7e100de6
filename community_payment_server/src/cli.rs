use std::{env, env::VarError};

/// The server takes no arguments. Any argument prints the help text and the current configuration, and the caller
/// should exit.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // List names explicitly. Merchant keys and shared secrets must never be printed
    const DISPLAY_ENVS: [&str; 21] = [
        "RUST_LOG",
        "CPG_HOST",
        "CPG_PORT",
        "CPG_DATABASE_URL",
        "CPG_NOTIFY_BASE_URL",
        "CPG_RETURN_URL",
        "CPG_ADMIN_IDS",
        "CPG_USE_X_FORWARDED_FOR",
        "CPG_USE_FORWARDED",
        "CPG_INVITE_EXPIRY_INTERVAL",
        "CPG_ALIPAY_ENABLED",
        "CPG_WECHAT_ENABLED",
        "CPG_EPAY_ENABLED",
        "CPG_BALANCE_ENABLED",
        "CPG_ALIPAY_GATEWAY_URL",
        "CPG_ALIPAY_APP_ID",
        "CPG_WECHAT_GATEWAY_URL",
        "CPG_WECHAT_MCH_ID",
        "CPG_EPAY_GATEWAY_URL",
        "CPG_EPAY_MERCHANT_ID",
        "CPG_EPAY_CHANNEL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
