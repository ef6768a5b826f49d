//! GPIO / peripheral pin assignments for the Mela board.
//!
//! Single source of truth; adapters reference this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// RS485 transceiver (Modbus RTU)
// ---------------------------------------------------------------------------

/// UART peripheral wired to the transceiver.
pub const RS485_UART_NUM: i32 = 1;
pub const RS485_TX_GPIO: i32 = 16;
pub const RS485_RX_GPIO: i32 = 15;
/// Driver-enable / receiver-enable, driven by the UART in RS485 half-duplex mode.
pub const RS485_DE_GPIO: i32 = 7;

/// Driver ring buffer size (RX and TX), bytes.
pub const RS485_BUF_SIZE: i32 = 512;
