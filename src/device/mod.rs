//! Device detection for session records.

use woothee::parser::{Parser, WootheeResult};

use crate::storage::models::{DeviceInfo, DeviceKind};

impl DeviceKind {
    fn from_category(category: &str) -> Self {
        match category {
            "pc" => DeviceKind::Desktop,
            "smartphone" | "mobilephone" => DeviceKind::Mobile,
            "tablet" => DeviceKind::Tablet,
            "crawler" => DeviceKind::Bot,
            _ => DeviceKind::Unknown,
        }
    }
}

fn known(value: &str) -> Option<String> {
    match value {
        "" | "UNKNOWN" => None,
        v => Some(v.to_string()),
    }
}

impl From<(&str, WootheeResult<'_>)> for DeviceInfo {
    fn from((raw, parsed): (&str, WootheeResult<'_>)) -> Self {
        DeviceInfo {
            browser: known(parsed.name),
            browser_version: known(parsed.version),
            kind: DeviceKind::from_category(parsed.category),
            os: known(parsed.os),
            os_version: known(&parsed.os_version),
            raw_user_agent: raw.to_string(),
        }
    }
}

/// Describe the client that opened a session. A missing header yields
/// an `Unknown` device with an empty raw string.
pub fn detect(user_agent: Option<&str>) -> DeviceInfo {
    let raw = user_agent.unwrap_or_default();
    match Parser::new().parse(raw) {
        Some(parsed) => DeviceInfo::from((raw, parsed)),
        None => DeviceInfo {
            raw_user_agent: raw.to_string(),
            ..DeviceInfo::default()
        },
    }
}
