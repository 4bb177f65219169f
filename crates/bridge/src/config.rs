//! Bridge configuration management

use crate::usb::{PermissionPolling, TransferTimeouts, WorkerSettings};
use anyhow::{Context, Result, anyhow};
use protocol::{DrawerPulse, EncoderSettings, LabelLayout, ReceiptOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    /// How pending permission requests are watched
    #[serde(default)]
    pub permission: PermissionSettings,
    /// Bulk write timeouts
    #[serde(default)]
    pub transfer: TransferSettings,
    /// TSPL label layout
    #[serde(default)]
    pub label: LabelLayout,
    /// ESC/POS receipt framing
    #[serde(default)]
    pub receipt: ReceiptOptions,
    /// Cash drawer pulse
    #[serde(default)]
    pub drawer: DrawerPulse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeSettings {
    pub log_level: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsbSettings {
    /// VID:PID allow-list, e.g. `"0x04b8:*"`; empty allows every device
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionSettings {
    #[serde(default = "PermissionSettings::default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "PermissionSettings::default_timeout")]
    pub timeout_secs: u64,
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::default_poll_interval(),
            timeout_secs: Self::default_timeout(),
        }
    }
}

impl PermissionSettings {
    fn default_poll_interval() -> u64 {
        250
    }

    fn default_timeout() -> u64 {
        30
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Labels and receipts
    #[serde(default = "TransferSettings::default_print_timeout")]
    pub print_timeout_ms: u64,
    /// Cash drawer kicks
    #[serde(default = "TransferSettings::default_drawer_timeout")]
    pub drawer_timeout_ms: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            print_timeout_ms: Self::default_print_timeout(),
            drawer_timeout_ms: Self::default_drawer_timeout(),
        }
    }
}

impl TransferSettings {
    fn default_print_timeout() -> u64 {
        5000
    }

    fn default_drawer_timeout() -> u64 {
        3000
    }
}

impl BridgeConfig {
    /// Load configuration from the specified path
    ///
    /// Without a path the standard locations are tried in order; finding none
    /// is an error so the caller can decide to fall back to defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-printer-bridge/bridge.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: BridgeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-printer-bridge").join("bridge.toml")
        } else {
            PathBuf::from(".config/usb-printer-bridge/bridge.toml")
        }
    }

    /// Settings handed to the USB worker thread
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            filters: self.usb.filters.clone(),
            encoder: self.encoder_settings(),
            timeouts: TransferTimeouts {
                print: Duration::from_millis(self.transfer.print_timeout_ms),
                drawer: Duration::from_millis(self.transfer.drawer_timeout_ms),
            },
        }
    }

    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            label: self.label.clone(),
            receipt: self.receipt.clone(),
            drawer: self.drawer,
        }
    }

    pub fn permission_polling(&self) -> PermissionPolling {
        PermissionPolling {
            interval: Duration::from_millis(self.permission.poll_interval_ms),
            timeout: Duration::from_secs(self.permission.timeout_secs),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.bridge.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.bridge.log_level,
                valid_levels.join(", ")
            ));
        }

        for filter in &self.usb.filters {
            Self::validate_filter(filter)?;
        }

        if self.permission.poll_interval_ms == 0 || self.permission.timeout_secs == 0 {
            return Err(anyhow!("Permission poll interval and timeout must be non-zero"));
        }

        if self.transfer.print_timeout_ms == 0 || self.transfer.drawer_timeout_ms == 0 {
            return Err(anyhow!("Transfer timeouts must be non-zero"));
        }

        if self.label.slots.is_empty() {
            return Err(anyhow!("Label layout needs at least one slot"));
        }

        // A sample label catches slot coordinates that overflow
        protocol::encode_label(&self.label, "", "0")
            .map_err(|e| anyhow!("Invalid label layout: {}", e))?;

        if self.label.name_max_chars == 0 {
            return Err(anyhow!("label.name_max_chars must be at least 1"));
        }

        if self.drawer.pin > 1 {
            return Err(anyhow!(
                "Invalid drawer pin {}, must be 0 (pin 2) or 1 (pin 5)",
                self.drawer.pin
            ));
        }

        Ok(())
    }

    /// Validate a USB device filter pattern (VID:PID)
    pub fn validate_filter(filter: &str) -> Result<()> {
        let parts: Vec<&str> = filter.split(':').collect();
        if parts.len() != 2 {
            return Err(anyhow!(
                "Invalid filter format '{}', expected VID:PID (e.g., '0x04b8:0x0202' or '0x04b8:*')",
                filter
            ));
        }

        let (vid, pid) = (parts[0], parts[1]);

        if vid != "*" {
            Self::validate_hex_id(vid, "VID")?;
        }

        if pid != "*" {
            Self::validate_hex_id(pid, "PID")?;
        }

        Ok(())
    }

    /// Validate a hex ID (VID or PID)
    fn validate_hex_id(id: &str, name: &str) -> Result<()> {
        let hex_part = id
            .strip_prefix("0x")
            .or_else(|| id.strip_prefix("0X"))
            .ok_or_else(|| {
                anyhow!(
                    "Invalid {} '{}', must start with '0x' (e.g., '0x04b8')",
                    name,
                    id
                )
            })?;

        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(anyhow!(
                "Invalid {} '{}', hex part must be 1-4 digits",
                name,
                id
            ));
        }

        u16::from_str_radix(hex_part, 16)
            .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))?;

        Ok(())
    }
}

/// Expand `~` in a user-supplied config path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.bridge.log_level, "info");
        assert!(config.usb.filters.is_empty());
        assert_eq!(config.transfer.print_timeout_ms, 5000);
        assert_eq!(config.transfer.drawer_timeout_ms, 3000);
        assert_eq!(config.label.slots.len(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_filter_valid() {
        assert!(BridgeConfig::validate_filter("0x04b8:0x0202").is_ok());
        assert!(BridgeConfig::validate_filter("0x04b8:*").is_ok());
        assert!(BridgeConfig::validate_filter("*:0x5011").is_ok());
        assert!(BridgeConfig::validate_filter("*:*").is_ok());
        assert!(BridgeConfig::validate_filter("0XABCD:0xEF01").is_ok());
    }

    #[test]
    fn test_validate_filter_invalid() {
        assert!(BridgeConfig::validate_filter("04b8:0202").is_err());
        assert!(BridgeConfig::validate_filter("0x04b8").is_err());
        assert!(BridgeConfig::validate_filter("0x1234:0x5678:0x9abc").is_err());
        assert!(BridgeConfig::validate_filter("0xGHIJ:0x5678").is_err());
        assert!(BridgeConfig::validate_filter("0x12345:0x5678").is_err());
        assert!(BridgeConfig::validate_filter("0x:*").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BridgeConfig::default();
        config.bridge.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.label.slots.clear();
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.label.name_max_chars = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.drawer.pin = 2;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.transfer.drawer_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.permission.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.label.slots = vec![protocol::Slot::new(60, u32::MAX - 10)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [usb]
            filters = ["0x0416:*"]

            [receipt]
            cut = true
            "#,
        )
        .unwrap();

        assert_eq!(config.bridge.log_level, "info");
        assert_eq!(config.usb.filters, vec!["0x0416:*".to_string()]);
        assert!(config.receipt.cut);
        assert_eq!(config.receipt.feed_lines, 3);
        assert_eq!(config.permission.timeout_secs, 30);
        assert_eq!(config.label, LabelLayout::sheet());
    }

    #[test]
    fn test_worker_settings_conversion() {
        let mut config = BridgeConfig::default();
        config.transfer.print_timeout_ms = 1500;
        config.usb.filters = vec!["0x2d37:*".to_string()];

        let settings = config.worker_settings();
        assert_eq!(settings.timeouts.print, Duration::from_millis(1500));
        assert_eq!(settings.timeouts.drawer, Duration::from_secs(3));
        assert_eq!(settings.filters, config.usb.filters);
        assert_eq!(settings.encoder.label, config.label);

        let polling = config.permission_polling();
        assert_eq!(polling.interval, Duration::from_millis(250));
        assert_eq!(polling.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(
            expand_path("/etc/usb-printer-bridge/bridge.toml"),
            PathBuf::from("/etc/usb-printer-bridge/bridge.toml")
        );
    }
}
