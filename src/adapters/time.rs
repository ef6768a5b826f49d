//! ESP32 time adapter.
//!
//! - **`target_os = "espidf"`**: `gettimeofday()` for wall-clock seconds.
//! - **`not(target_os = "espidf")`**: `std::time` for host-side testing and
//!   simulation, plus [`StdDelay`] as the `DelayNs` implementation.

/// Time adapter for the ESP32 platform.
pub struct Esp32TimeAdapter;

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Wall-clock seconds since the Unix epoch, truncated to 32 bits.
    /// Before SNTP sync this counts from 1970 at boot.
    #[cfg(target_os = "espidf")]
    pub fn unix_secs(&self) -> u32 {
        let mut tv = esp_idf_svc::sys::timeval { tv_sec: 0, tv_usec: 0 };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        tv.tv_sec as u32
    }

    /// Wall-clock seconds since the Unix epoch, truncated to 32 bits.
    #[cfg(not(target_os = "espidf"))]
    pub fn unix_secs(&self) -> u32 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as u32)
    }
}

/// Thread-sleep delay for host runs.  On target use
/// `esp_idf_hal::delay::FreeRtos`.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

#[cfg(not(target_os = "espidf"))]
impl embedded_hal::delay::DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}
