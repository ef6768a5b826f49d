//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`] by keeping the board configuration document as
//! a single JSON blob under `mela::config`.  Also reports partition usage
//! for the storage figure in the status registers.
//!
//! - **`target_os = "espidf"`**: raw `nvs_*` calls on the default partition.
//! - **all other targets**: in-memory map for host tests.

use log::info;

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::BoardConfig;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "mela";
const CONFIG_KEY: &str = "config";

/// Largest document accepted from flash.
const MAX_BLOB_SIZE: usize = 8192;

/// Entry count reported by the simulation backend.
#[cfg(not(target_os = "espidf"))]
const SIM_TOTAL_ENTRIES: u64 = 504;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: HashMap<String, Vec<u8>>,
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the partition is erased
    /// and re-initialised.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any other NVS use.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                log::warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: HashMap::new(),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open a namespace, run `f` with the handle, then close it.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns_buf = c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr().cast(), mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    /// `(free, total)` entries on the default partition.
    pub fn storage_usage(&self) -> (u64, u64) {
        #[cfg(target_os = "espidf")]
        {
            let mut stats: nvs_stats_t = unsafe { core::mem::zeroed() };
            let ret = unsafe { nvs_get_stats(core::ptr::null(), &mut stats) };
            if ret != ESP_OK {
                log::warn!("NvsAdapter: nvs_get_stats failed ({})", ret);
                return (0, 0);
            }
            (stats.free_entries as u64, stats.total_entries as u64)
        }

        #[cfg(not(target_os = "espidf"))]
        {
            // One entry per 32 bytes, as NVS pages do.
            let used: u64 = self.store.values().map(|v| (v.len() as u64).div_ceil(32).max(1)).sum();
            (SIM_TOTAL_ENTRIES.saturating_sub(used), SIM_TOTAL_ENTRIES)
        }
    }
}

/// Adapter over a partition that failed to initialise.  On target every
/// access fails, so callers fall back to factory settings.
impl Default for NvsAdapter {
    fn default() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            store: HashMap::new(),
        }
    }
}

/// NUL-terminated copy of an NVS name (max 15 chars).
#[cfg(target_os = "espidf")]
fn c_name(name: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let bytes = name.as_bytes();
    let len = bytes.len().min(15);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<BoardConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        let bytes = self
            .store
            .get(&Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY))
            .cloned()
            .ok_or(ConfigError::NotFound)?;

        #[cfg(target_os = "espidf")]
        let bytes = {
            let key = c_name(CONFIG_KEY);
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, false, |handle| {
                let mut size: usize = 0;
                // First call: get size
                let ret = unsafe { nvs_get_blob(handle, key.as_ptr().cast(), core::ptr::null_mut(), &mut size) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                if size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ESP_ERR_NVS_INVALID_LENGTH);
                }
                let mut buf = vec![0u8; size];
                let ret = unsafe { nvs_get_blob(handle, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf)
            });
            match result {
                Ok(bytes) => bytes,
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => return Err(ConfigError::NotFound),
                Err(e) => {
                    log::warn!("NvsAdapter: NVS read error {}", e);
                    return Err(ConfigError::IoError);
                }
            }
        };

        if bytes.len() > MAX_BLOB_SIZE {
            return Err(ConfigError::Corrupted);
        }
        let cfg = BoardConfig::from_json(&bytes)?;
        info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
        Ok(cfg)
    }

    fn save(&mut self, config: &BoardConfig) -> Result<(), ConfigError> {
        let bytes = config.to_json()?;
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(ConfigError::StorageFull);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .insert(Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY), bytes);
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = c_name(CONFIG_KEY);
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, true, |handle| {
                let ret = unsafe { nvs_set_blob(handle, key.as_ptr().cast(), bytes.as_ptr().cast(), bytes.len()) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(ConfigError::StorageFull),
                Err(e) => {
                    log::warn!("NvsAdapter: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl NvsAdapter {
    /// Store raw bytes under the config key (tests corrupt the blob this way).
    pub fn put_raw_config(&mut self, bytes: &[u8]) {
        self.store
            .insert(Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY), bytes.to_vec());
    }
}
