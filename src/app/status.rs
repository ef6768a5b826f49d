//! Board status block in input registers.
//!
//! | Offset | Len | Value                                  |
//! |--------|-----|----------------------------------------|
//! | 1      | 2   | timestamp, seconds (u32, high word first) |
//! | 3      | 1   | free RAM, percent × 100                |
//! | 4      | 1   | free storage, percent × 100            |
//!
//! A slave publishes this into its own bank; a master reads it back from
//! a remote unit.

use tokio_modbus::SlaveId;

use crate::app::ports::{MasterIo, TransportError};
use crate::modbus::bank::{RegisterBank, RegisterClass};
use crate::modbus::words::{set_u32, u32_from_slice};

pub const TIMESTAMP_OFFSET: u16 = 1;
pub const FREE_RAM_OFFSET: u16 = 3;
pub const FREE_STORAGE_OFFSET: u16 = 4;
/// Registers covered by the block, starting at [`TIMESTAMP_OFFSET`].
pub const STATUS_LEN: u16 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoardStatus {
    pub timestamp: u32,
    /// Percent × 100 (e.g. `4215` = 42.15 %).
    pub free_ram_pct_x100: u16,
    pub free_storage_pct_x100: u16,
}

impl BoardStatus {
    /// Build from free/total byte counts.
    pub fn from_usage(timestamp: u32, ram: (u64, u64), storage: (u64, u64)) -> Self {
        Self {
            timestamp,
            free_ram_pct_x100: pct_x100(ram.0, ram.1),
            free_storage_pct_x100: pct_x100(storage.0, storage.1),
        }
    }

    /// Write into the bank's input registers.
    pub fn publish(&self, bank: &mut RegisterBank) {
        set_u32(bank, RegisterClass::Input, TIMESTAMP_OFFSET, self.timestamp);
        bank.set_input(FREE_RAM_OFFSET, self.free_ram_pct_x100);
        bank.set_input(FREE_STORAGE_OFFSET, self.free_storage_pct_x100);
    }

    /// Read the block from a remote slave.
    pub fn fetch<M: MasterIo>(master: &mut M, unit: SlaveId) -> Result<Self, TransportError> {
        let words = master.read_input_registers(unit, TIMESTAMP_OFFSET, STATUS_LEN)?;
        let (Some(timestamp), Some(&ram), Some(&storage)) = (u32_from_slice(&words), words.get(2), words.get(3)) else {
            return Err(TransportError::Io);
        };
        Ok(Self {
            timestamp,
            free_ram_pct_x100: ram,
            free_storage_pct_x100: storage,
        })
    }
}

impl core::fmt::Display for BoardStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "ts={} ram={}.{:02}% storage={}.{:02}%",
            self.timestamp,
            self.free_ram_pct_x100 / 100,
            self.free_ram_pct_x100 % 100,
            self.free_storage_pct_x100 / 100,
            self.free_storage_pct_x100 % 100,
        )
    }
}

fn pct_x100(free: u64, total: u64) -> u16 {
    if total == 0 {
        return 0;
    }
    let v = free.min(total).saturating_mul(10_000) / total;
    u16::try_from(v).unwrap_or(10_000)
}
