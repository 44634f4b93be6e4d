//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] for the node.  Flash keys are 16-bit; NVS
//! wants short strings, so key `0x4001` is stored as `"k4001"` inside a
//! single `"soilnode"` namespace.  The mesh stack keeps its provisioning
//! data in the same partition, which is why [`StoragePort::erase_all`]
//! wipes the whole partition rather than one namespace.
//!
//! On the host a `HashMap` stands in for flash and counts writes so tests
//! can check the save debounce.

use crate::app::ports::{StorageError, StoragePort};
use log::info;

#[cfg(not(feature = "espidf"))]
use std::collections::HashMap;

#[cfg(feature = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(feature = "espidf")]
use log::warn;

#[cfg(feature = "espidf")]
const NAMESPACE: &[u8] = b"soilnode\0";

pub struct NvsAdapter {
    #[cfg(not(feature = "espidf"))]
    store: std::cell::RefCell<HashMap<u16, Vec<u8>>>,
    #[cfg(not(feature = "espidf"))]
    writes: u32,
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// On first boot or after a layout version change the partition is
    /// erased and re-initialised.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(feature = "espidf")]
        {
            // SAFETY: called once from the main task before any NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
            Ok(Self {})
        }

        #[cfg(not(feature = "espidf"))]
        {
            info!("NvsAdapter: simulation backend");
            Ok(Self {
                store: std::cell::RefCell::new(HashMap::new()),
                writes: 0,
            })
        }
    }

    /// Successful writes since construction.
    #[cfg(not(feature = "espidf"))]
    pub fn write_count(&self) -> u32 {
        self.writes
    }

    #[cfg(not(feature = "espidf"))]
    pub fn contains(&self, key: u16) -> bool {
        self.store.borrow().contains_key(&key)
    }

    /// NUL-terminated NVS key for a flash key: `k` + 4 hex digits.
    #[cfg_attr(not(feature = "espidf"), allow(dead_code))]
    fn key_name(key: u16) -> [u8; 6] {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut name = [b'k', 0, 0, 0, 0, 0];
        for (i, shift) in [12u16, 8, 4].iter().enumerate() {
            name[i + 1] = HEX[((key >> shift) & 0xF) as usize];
        }
        name[4] = HEX[(key & 0xF) as usize];
        name
    }

    /// Open the node namespace, run `f` with the handle, then close.
    #[cfg(feature = "espidf")]
    fn with_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(NAMESPACE.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe { nvs_close(handle) };
        result
    }
}

#[cfg(not(feature = "espidf"))]
impl StoragePort for NvsAdapter {
    fn read(&self, key: u16, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.store.borrow().get(&key) {
            Some(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(data.len())
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, key: u16, data: &[u8]) -> Result<(), StorageError> {
        self.store.borrow_mut().insert(key, data.to_vec());
        self.writes = self.writes.wrapping_add(1);
        Ok(())
    }

    fn delete(&mut self, key: u16) -> Result<(), StorageError> {
        self.store.borrow_mut().remove(&key);
        Ok(())
    }

    fn erase_all(&mut self) -> Result<(), StorageError> {
        self.store.borrow_mut().clear();
        info!("NvsAdapter: partition erased (simulation)");
        Ok(())
    }
}

#[cfg(feature = "espidf")]
impl StoragePort for NvsAdapter {
    fn read(&self, key: u16, buf: &mut [u8]) -> Result<usize, StorageError> {
        let name = Self::key_name(key);
        let result = Self::with_handle(false, |handle| {
            let mut size: usize = 0;
            let ret = unsafe {
                nvs_get_blob(handle, name.as_ptr() as *const _, core::ptr::null_mut(), &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            if size > buf.len() {
                return Ok(size);
            }
            let mut got = buf.len();
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    name.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut got,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(got)
        });
        match result {
            Ok(size) => Ok(size),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
            Err(_) => Err(StorageError::IoError),
        }
    }

    fn write(&mut self, key: u16, data: &[u8]) -> Result<(), StorageError> {
        let name = Self::key_name(key);
        let result = Self::with_handle(true, |handle| {
            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    name.as_ptr() as *const _,
                    data.as_ptr() as *const _,
                    data.len(),
                )
            };
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
            Ok(()) => Ok(()),
            Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(StorageError::Full),
            Err(e) => {
                warn!("NvsAdapter: write 0x{:04X} failed ({})", key, e);
                Err(StorageError::IoError)
            }
        }
    }

    fn delete(&mut self, key: u16) -> Result<(), StorageError> {
        let name = Self::key_name(key);
        let result = Self::with_handle(true, |handle| {
            let ret = unsafe { nvs_erase_key(handle, name.as_ptr() as *const _) };
            if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|_| StorageError::IoError)
    }

    fn erase_all(&mut self) -> Result<(), StorageError> {
        // SAFETY: NVS handles are only opened inside `with_handle`, so none
        // are live here.
        let ret = unsafe { nvs_flash_erase() };
        if ret != ESP_OK {
            warn!("NvsAdapter: partition erase failed ({})", ret);
            return Err(StorageError::IoError);
        }
        if unsafe { nvs_flash_init() } != ESP_OK {
            return Err(StorageError::IoError);
        }
        info!("NvsAdapter: partition erased");
        Ok(())
    }
}
