//! Supported platforms and storefront channel descriptors.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ExportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    Mac,
    Android,
    Web,
}

pub const SUPPORTED_PLATFORMS: &[Platform] = &[
    Platform::Windows,
    Platform::Linux,
    Platform::Mac,
    Platform::Android,
    Platform::Web,
];

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Mac => "mac",
            Platform::Android => "android",
            Platform::Web => "web",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "mac" | "macos" | "osx" => Ok(Platform::Mac),
            "android" => Ok(Platform::Android),
            "web" | "html5" => Ok(Platform::Web),
            other => Err(format!("unsupported platform '{other}'")),
        }
    }
}

/// Parse a target's platform list. Empty lists and unknown names fail.
/// Duplicates collapse; order is the order given.
pub fn parse_platforms(target: &str, names: &[String]) -> Result<Vec<Platform>, ExportError> {
    if names.is_empty() {
        return Err(ExportError::packaging(format!(
            "target '{target}' has an empty platform list"
        )));
    }

    let mut platforms = Vec::with_capacity(names.len());
    for name in names {
        let platform: Platform = name.parse().map_err(|e| {
            let supported: Vec<&str> = SUPPORTED_PLATFORMS.iter().map(Platform::as_str).collect();
            ExportError::packaging(format!(
                "target '{target}': {e} (supported: {})",
                supported.join(", ")
            ))
        })?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    Ok(platforms)
}

/// Distribution channel for one platform of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Channel {
    /// itch.io butler push channel
    Butler {
        platform: Platform,
        channel: String,
        target: String,
    },
    /// Steam depot
    Depot { platform: Platform, depot: String },
    /// Plain download
    Direct { platform: Platform, file: String },
}

/// `channels.json` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelsFile {
    pub target: String,
    pub storefront: String,
    pub channels: Vec<Channel>,
}

/// Channel descriptors for a target. `itch` and `steam` are recognized
/// storefronts; any other target name is a direct download.
pub fn channels_for(target: &str, slug: &str, archive_name: &str, platforms: &[Platform]) -> ChannelsFile {
    let storefront = match target.trim().to_ascii_lowercase().as_str() {
        "itch" | "itch.io" | "itchio" => "itch",
        "steam" => "steam",
        _ => "direct",
    };

    let channels = platforms
        .iter()
        .map(|&platform| match storefront {
            "itch" => Channel::Butler {
                platform,
                channel: platform.as_str().to_string(),
                target: format!("{slug}:{platform}"),
            },
            "steam" => Channel::Depot {
                platform,
                depot: format!("{slug}-{platform}"),
            },
            _ => Channel::Direct {
                platform,
                file: archive_name.to_string(),
            },
        })
        .collect();

    ChannelsFile {
        target: target.to_string(),
        storefront: storefront.to_string(),
        channels,
    }
}
