//! Application core: board orchestration with zero direct I/O.
//!
//! Boot sequencing, role selection and the status register convention.
//! All interaction with the radio, the UART and sockets happens through
//! **port traits** defined in [`ports`], keeping this layer testable
//! without real peripherals.

pub mod events;
pub mod ports;
pub mod runtime;
pub mod status;
