//!
//! nfsgate configuration
//! ---------------------
//! Gateway settings come from environment variables, overridden by command-line
//! flags. Lookups go through a closure so tests can supply a fake environment.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_FS_ROOT: &str = "shared";
pub const DEFAULT_CORS_ORIGINS: [&str; 3] = [
    "http://localhost:5173",
    "http://localhost:3000",
    "http://127.0.0.1:5173",
];

/// Failed-login bookkeeping applied per account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThrottleConfig {
    /// 0 disables throttling
    pub max_attempts: u32,
    pub window: Duration,
    pub lockout: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
            lockout: Duration::from_secs(15 * 60),
        }
    }
}

/// Bounds for the monitoring probes (df/du).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    pub max_concurrent_probes: usize,
    pub probe_timeout: Duration,
    /// Overall budget for one snapshot; probes still running are reported as timed out.
    pub deadline: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_probes: 4,
            probe_timeout: Duration::from_secs(10),
            deadline: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub http_port: u16,
    pub data_dir: PathBuf,
    pub fs_root: PathBuf,
    pub jwt_secret: String,
    pub cors_origins: Vec<String>,
    /// Seed users/roles/audit documents before serving.
    pub init: bool,
    pub admin_password: Option<String>,
    pub throttle: ThrottleConfig,
    pub monitor: MonitorConfig,
}

pub fn usage() -> &'static str {
    "nfsgate\n\nUSAGE:\n  nfsgate [--http-port N] [--data-dir PATH] [--fs-root PATH] [--init]\n\nOPTIONS:\n  --http-port N      HTTP API port (env: NFSGATE_HTTP_PORT, default 8080)\n  --data-dir PATH    Folder holding users.json, roles.json, audit.json, settings.json (env: NFSGATE_DATA_DIR, default data)\n  --fs-root PATH     Filesystem root exposed by the gateway (env: NFSGATE_FS_ROOT, default shared)\n  --init             Seed missing documents; requires NFSGATE_ADMIN_PASSWORD\n\nENVIRONMENT:\n  JWT_SECRET                 Required. Shared secret for bearer tokens.\n  NFSGATE_CORS_ORIGINS       Comma separated list of allowed origins.\n  NFSGATE_LOGIN_MAX_ATTEMPTS Failed logins before lockout (0 disables, default 5).\n  NFSGATE_LOGIN_LOCKOUT_SECS Lockout duration in seconds (default 900).\n"
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_port_arg(args: &[String], flag: &str) -> Result<Option<u16>> {
    match parse_str_arg(args, flag) {
        Some(v) => match v.parse::<u16>() {
            Ok(p) => Ok(Some(p)),
            Err(_) => bail!("{} expects a port number, got '{}'", flag, v),
        },
        None => Ok(None),
    }
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn parse_num_env<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    env(name).and_then(|v| v.trim().parse::<T>().ok())
}

impl GatewayConfig {
    /// Build from the process environment and the given argv.
    pub fn from_env_and_args(args: &[String]) -> Result<Self> {
        Self::from_sources(args, |name| std::env::var(name).ok())
    }

    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_http = parse_num_env::<u16>(&env, "NFSGATE_HTTP_PORT");
        let http_port = parse_port_arg(args, "--http-port")?.or(env_http).unwrap_or(DEFAULT_HTTP_PORT);

        let data_dir = parse_str_arg(args, "--data-dir")
            .or_else(|| env("NFSGATE_DATA_DIR"))
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let fs_root = parse_str_arg(args, "--fs-root")
            .or_else(|| env("NFSGATE_FS_ROOT"))
            .unwrap_or_else(|| DEFAULT_FS_ROOT.to_string());

        let jwt_secret = env("JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() {
            bail!("JWT_SECRET must be set to a non-empty value");
        }

        let cors_origins: Vec<String> = match env("NFSGATE_CORS_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
            None => DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
        };
        if cors_origins.iter().any(|o| o == "*") {
            bail!("NFSGATE_CORS_ORIGINS must list explicit origins; '*' cannot be combined with credentialed requests");
        }

        let init = has_flag(args, "--init");
        let admin_password = env("NFSGATE_ADMIN_PASSWORD").filter(|p| !p.is_empty());
        if init && admin_password.is_none() {
            bail!("--init requires NFSGATE_ADMIN_PASSWORD");
        }

        let mut throttle = ThrottleConfig::default();
        if let Some(n) = parse_num_env::<u32>(&env, "NFSGATE_LOGIN_MAX_ATTEMPTS") { throttle.max_attempts = n; }
        if let Some(s) = parse_num_env::<u64>(&env, "NFSGATE_LOGIN_LOCKOUT_SECS") { throttle.lockout = Duration::from_secs(s); }

        Ok(Self {
            http_port,
            data_dir: PathBuf::from(data_dir),
            fs_root: PathBuf::from(fs_root),
            jwt_secret,
            cors_origins,
            init,
            admin_password,
            throttle,
            monitor: MonitorConfig::default(),
        })
    }
}
