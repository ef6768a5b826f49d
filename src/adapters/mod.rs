//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter          | Implements    | Connects to                      |
//! |------------------|---------------|----------------------------------|
//! | `wifi`           | WlanPort      | ESP-IDF WiFi STA / simulation    |
//! | `modbus_driver`  | ModbusDriver  | `modbus_tcp` + `modbus_rtu`      |
//! | `modbus_tcp`     | SlaveIo       | tokio-modbus TCP server          |
//! |                  | MasterIo      | tokio-modbus sync TCP client     |
//! | `modbus_rtu`     | SlaveIo       | RTU frames over any SerialLine   |
//! |                  | MasterIo      | RS485 UART (target only)         |
//! | `rtu_frame`      |               | RTU request/reply codec + CRC    |
//! | `modbus_bridge`  |               | server thread → owning task      |
//! | `nvs`            | ConfigPort    | NVS / in-memory store            |
//! | `log_sink`       | EventSink     | Serial log output                |
//! | `time`           | DelayNs (host)| ESP32 system timer / std         |
//! | `system`         |               | Heap statistics                  |

pub mod log_sink;
pub mod modbus_bridge;
pub mod modbus_driver;
pub mod modbus_rtu;
pub mod modbus_tcp;
pub mod nvs;
pub mod rtu_frame;
pub mod system;
pub mod time;
pub mod wifi;
