//! Offset-addressed register storage, independent of any transport.
//!
//! ```text
//!   class            width   access (remote)   config key
//!   ─────────────────────────────────────────────────────────────
//!   Holding          16 bit  read / write      holding-registers
//!   Input            16 bit  read only         input-registers
//!   Coil              1 bit  read / write      coils
//!   DiscreteInput     1 bit  read only         discrete-inputs
//! ```
//!
//! Each class is an independent sparse map.  A cell exists once something
//! has written it (bulk load or application code); reads of cells that were
//! never written return `None` and the request service turns that into an
//! `IllegalDataAddress` exception.  Bit classes store `0` or `1`.
//!
//! Values wider than 16 bits are a caller convention layered on top, see
//! [`super::words`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ───────────────────────────────────────────────────────────────
// Register classes
// ───────────────────────────────────────────────────────────────

/// One of the four Modbus data tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegisterClass {
    #[serde(rename = "holding-registers", alias = "HREGS")]
    Holding,
    #[serde(rename = "input-registers", alias = "IREGS")]
    Input,
    #[serde(rename = "coils", alias = "COILS")]
    Coil,
    #[serde(rename = "discrete-inputs", alias = "ISTS")]
    DiscreteInput,
}

impl RegisterClass {
    pub const ALL: [Self; 4] = [Self::Holding, Self::Input, Self::Coil, Self::DiscreteInput];

    /// Single-bit classes (coils, discrete inputs).
    pub const fn is_bit(self) -> bool {
        matches!(self, Self::Coil | Self::DiscreteInput)
    }

    /// Whether a remote master may write this class.
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Holding | Self::Coil)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

// ───────────────────────────────────────────────────────────────
// Register definitions (bulk-load input)
// ───────────────────────────────────────────────────────────────

/// Initial contents of a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialValues {
    /// Same value in every cell of the range.
    Fill(u16),
    /// Cell-by-cell values; cells past the end of the sequence are zero.
    Sequence(Vec<u16>),
}

impl InitialValues {
    /// Value destined for the `i`-th cell of the range.
    pub fn cell(&self, i: usize) -> u16 {
        match self {
            Self::Fill(v) => *v,
            Self::Sequence(values) => values.get(i).copied().unwrap_or(0),
        }
    }
}

/// A named block of registers: `len` cells of `class` starting at `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDefinition {
    pub name: String,
    pub class: RegisterClass,
    pub offset: u16,
    pub len: u16,
    pub values: InitialValues,
}

// ───────────────────────────────────────────────────────────────
// RegisterBank
// ───────────────────────────────────────────────────────────────

/// Four independent offset → value tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterBank {
    tables: [BTreeMap<u16, u16>; 4],
}

impl RegisterBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one cell.  Bit classes store `value != 0` as `1`.
    pub fn set(&mut self, class: RegisterClass, offset: u16, value: u16) {
        let value = if class.is_bit() { u16::from(value != 0) } else { value };
        self.tables[class.index()].insert(offset, value);
    }

    /// Read one cell; `None` if it was never written.
    pub fn get(&self, class: RegisterClass, offset: u16) -> Option<u16> {
        self.tables[class.index()].get(&offset).copied()
    }

    /// Write each definition's initial values at its offset, in order.
    ///
    /// Overlapping ranges are not detected: a later definition overwrites
    /// the cells an earlier one wrote.  Ranges that would run past offset
    /// `u16::MAX` are truncated there.
    pub fn bulk_load<'a>(&mut self, definitions: impl IntoIterator<Item = &'a RegisterDefinition>) {
        for def in definitions {
            for i in 0..def.len {
                let Some(offset) = def.offset.checked_add(i) else {
                    break;
                };
                self.set(def.class, offset, def.values.cell(usize::from(i)));
            }
        }
    }

    /// Read `count` consecutive cells.  Fails with the first offset that was
    /// never written (or that overflows the address space).
    pub fn read_range(&self, class: RegisterClass, start: u16, count: u16) -> Result<Vec<u16>, u16> {
        (0..count)
            .map(|i| {
                let offset = start.checked_add(i).ok_or(start)?;
                self.get(class, offset).ok_or(offset)
            })
            .collect()
    }

    /// Write consecutive cells, all-or-nothing: every target cell must
    /// already exist.  Returns the first missing offset on failure.
    pub fn write_range(&mut self, class: RegisterClass, start: u16, values: &[u16]) -> Result<(), u16> {
        for i in 0..values.len() {
            let offset = u16::try_from(i)
                .ok()
                .and_then(|i| start.checked_add(i))
                .ok_or(start)?;
            if self.get(class, offset).is_none() {
                return Err(offset);
            }
        }
        for (offset, value) in (start..).zip(values) {
            self.set(class, offset, *value);
        }
        Ok(())
    }

    /// Number of defined cells in `class`.
    pub fn len(&self, class: RegisterClass) -> usize {
        self.tables[class.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(BTreeMap::is_empty)
    }

    // ── Typed accessors ───────────────────────────────────────

    pub fn set_holding(&mut self, offset: u16, value: u16) {
        self.set(RegisterClass::Holding, offset, value);
    }

    pub fn holding(&self, offset: u16) -> Option<u16> {
        self.get(RegisterClass::Holding, offset)
    }

    pub fn set_input(&mut self, offset: u16, value: u16) {
        self.set(RegisterClass::Input, offset, value);
    }

    pub fn input(&self, offset: u16) -> Option<u16> {
        self.get(RegisterClass::Input, offset)
    }

    pub fn set_coil(&mut self, offset: u16, on: bool) {
        self.set(RegisterClass::Coil, offset, u16::from(on));
    }

    pub fn coil(&self, offset: u16) -> Option<bool> {
        self.get(RegisterClass::Coil, offset).map(|v| v != 0)
    }

    pub fn set_discrete_input(&mut self, offset: u16, on: bool) {
        self.set(RegisterClass::DiscreteInput, offset, u16::from(on));
    }

    pub fn discrete_input(&self, offset: u16) -> Option<bool> {
        self.get(RegisterClass::DiscreteInput, offset).map(|v| v != 0)
    }
}
