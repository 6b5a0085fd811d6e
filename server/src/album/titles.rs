use crate::errors::GalleryError;
use std::collections::HashMap;

pub const UNKNOWN_TITLE: &str = "Unknown";

/// Localized display names from title metadata.
pub trait TitleDirectory {
    fn display_name(&self, application_id: u64) -> Option<String>;
}

/// Title names loaded from the `[titles]` configuration table.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredTitles {
    names: HashMap<u64, String>,
}

impl ConfiguredTitles {
    pub fn new(names: HashMap<u64, String>) -> Self {
        ConfiguredTitles { names }
    }

    /// Keys are hexadecimal application ids, with or without a `0x` prefix.
    pub fn from_table(table: &HashMap<String, String>) -> Result<Self, GalleryError> {
        let mut names = HashMap::with_capacity(table.len());
        for (key, name) in table {
            let hex = key
                .strip_prefix("0x")
                .or_else(|| key.strip_prefix("0X"))
                .unwrap_or(key);
            let id = u64::from_str_radix(hex, 16).map_err(|e| {
                GalleryError::ConfigError(format!("Invalid application id '{}': {}", key, e))
            })?;
            names.insert(id, name.clone());
        }

        Ok(ConfiguredTitles::new(names))
    }
}

impl TitleDirectory for ConfiguredTitles {
    fn display_name(&self, application_id: u64) -> Option<String> {
        self.names.get(&application_id).cloned()
    }
}

/// Names of the system applets that can take captures.
pub fn system_title(application_id: u64) -> Option<&'static str> {
    let name = match application_id {
        0x0100000000001000 => "Home Menu",
        0x0100000000001001 => "Auth",
        0x0100000000001002 => "Cabinet",
        0x0100000000001003 => "Controller",
        0x0100000000001004 => "DataErase",
        0x0100000000001005 => "Error",
        0x0100000000001006 => "Net Connect",
        0x0100000000001007 => "Player Select",
        0x0100000000001008 => "Keyboard",
        0x0100000000001009 => "Mii Editor",
        0x010000000000100A => "Web Browser",
        0x010000000000100B => "eShop",
        0x010000000000100C => "Overlay",
        0x010000000000100D => "Album",
        0x010000000000100F => "Offline Web Browser",
        0x0100000000001010 => "Share",
        0x0100000000001011 => "WiFi Web Auth",
        0x0100000000001012 => "Starter",
        0x0100000000001013 => "My Page",
        _ => return None,
    };
    Some(name)
}

/// Title metadata first, then the system applet table, then "Unknown".
pub fn resolve_title(directory: &dyn TitleDirectory, application_id: u64) -> String {
    directory
        .display_name(application_id)
        .or_else(|| system_title(application_id).map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string())
}
