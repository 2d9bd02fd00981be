//! Parsers for host statistics: `/proc/uptime`, `/proc/loadavg`,
//! `/proc/meminfo` and `df` output.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CpuLoad {
    #[serde(rename = "1m")]
    pub one: String,
    #[serde(rename = "5m")]
    pub five: String,
    #[serde(rename = "15m")]
    pub fifteen: String,
}

/// Figures in the same shape `free -m` reports, as "<n> MB" strings.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MemoryUsage {
    pub total: String,
    pub used: String,
    pub free: String,
    pub shared: String,
    #[serde(rename = "buff/cache")]
    pub buff_cache: String,
    pub available: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DiskUsage {
    pub filesystem: String,
    #[serde(rename = "type")]
    pub fs_type: String,
    pub size: String,
    pub used: String,
    pub available: String,
    #[serde(rename = "use%")]
    pub use_percent: String,
    pub mounted_on: String,
}

fn parse_failed(what: &str) -> AppError {
    AppError::internal("probe_parse_failed", format!("unexpected {} format", what))
}

/// `/proc/uptime` → "up 2 days, 3 hours, 4 minutes".
pub fn parse_uptime(raw: &str) -> AppResult<String> {
    let secs: f64 = raw
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| parse_failed("uptime"))?;
    Ok(humanize_uptime(secs as u64))
}

fn humanize_uptime(total_secs: u64) -> String {
    let mins = total_secs / 60;
    let (weeks, days, hours, minutes) = (mins / 10080, (mins / 1440) % 7, (mins / 60) % 24, mins % 60);
    let mut parts = Vec::new();
    for (n, unit) in [(weeks, "week"), (days, "day"), (hours, "hour"), (minutes, "minute")] {
        if n > 0 {
            parts.push(format!("{} {}{}", n, unit, if n == 1 { "" } else { "s" }));
        }
    }
    if parts.is_empty() {
        return "up 0 minutes".to_string();
    }
    format!("up {}", parts.join(", "))
}

pub fn parse_loadavg(raw: &str) -> AppResult<CpuLoad> {
    let mut it = raw.split_whitespace();
    match (it.next(), it.next(), it.next()) {
        (Some(a), Some(b), Some(c)) => Ok(CpuLoad { one: a.into(), five: b.into(), fifteen: c.into() }),
        _ => Err(parse_failed("loadavg")),
    }
}

pub fn parse_meminfo(raw: &str) -> AppResult<MemoryUsage> {
    let kb: HashMap<&str, u64> = raw
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let value = rest.split_whitespace().next()?.parse().ok()?;
            Some((key.trim(), value))
        })
        .collect();
    let field = |k: &str| kb.get(k).copied();
    let total = field("MemTotal").ok_or_else(|| parse_failed("meminfo"))?;
    let free = field("MemFree").unwrap_or(0);
    let shared = field("Shmem").unwrap_or(0);
    let buff_cache = field("Buffers").unwrap_or(0) + field("Cached").unwrap_or(0) + field("SReclaimable").unwrap_or(0);
    let available = field("MemAvailable").unwrap_or(free);
    let used = total.saturating_sub(free).saturating_sub(buff_cache);
    let mb = |v: u64| format!("{} MB", v / 1024);
    Ok(MemoryUsage {
        total: mb(total),
        used: mb(used),
        free: mb(free),
        shared: mb(shared),
        buff_cache: mb(buff_cache),
        available: mb(available),
    })
}

/// Output of `df -h --output=source,fstype,size,used,avail,pcent,target`.
pub fn parse_df(raw: &str) -> Vec<DiskUsage> {
    raw.lines()
        .skip(1)
        .filter_map(|line| {
            let f: Vec<&str> = line.split_whitespace().collect();
            if f.len() < 7 {
                return None;
            }
            Some(DiskUsage {
                filesystem: f[0].to_string(),
                fs_type: f[1].to_string(),
                size: f[2].to_string(),
                used: f[3].to_string(),
                available: f[4].to_string(),
                use_percent: f[5].to_string(),
                // mount points may contain spaces
                mounted_on: f[6..].join(" "),
            })
        })
        .collect()
}

/// First column of `du -sk` output, in KiB.
pub fn parse_du_kib(raw: &str) -> Option<u64> {
    raw.split_whitespace().next()?.parse().ok()
}

pub fn human_kib(kib: u64) -> String {
    const UNITS: [&str; 5] = ["K", "M", "G", "T", "P"];
    let mut value = kib as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 || value >= 10.0 {
        format!("{:.0}{}", value, UNITS[unit])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}
