//! Modbus RTU over the RS485 UART.
//!
//! - [`RtuSlave`]: assembles request frames from any [`SerialLine`],
//!   answers through the bank service and writes the reply frame.
//!   Framing lives in [`rtu_frame`](super::rtu_frame).
//! - **`target_os = "espidf"`**: UART1 is configured with raw `uart_*`
//!   calls (RS485 half-duplex, DE on its own pin).  The same port serves
//!   as the slave's line and as the byte stream under the `tokio-modbus`
//!   RTU client for masters.
//! - **all other targets**: no serial line; construction reports
//!   `Unsupported`.

use log::{debug, warn};
use tokio_modbus::{ExceptionCode, Request, Response};

use super::rtu_frame::{self, BROADCAST_UNIT, FrameError, MAX_FRAME_LEN};
use crate::app::ports::{SlaveIo, TransportError};
use crate::config::{SerialParams, SlaveSerialConfig};

#[cfg(target_os = "espidf")]
pub use esp::{RtuMaster, UartStream};

/// Silence that ends a frame above 19200 baud, in microseconds.
const MIN_FRAME_GAP_US: u64 = 1_750;

/// Raw byte access to a half-duplex serial line.
pub trait SerialLine {
    /// Copy bytes already received into `buf`.  Never blocks.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
    /// Send a whole frame and wait until it has left the transmitter.
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError>;
    /// Monotonic clock, microseconds.
    fn now_us(&self) -> u64;
}

/// 3.5 character times at `baudrate` (11 bits per character).
pub fn frame_gap_us(baudrate: u32) -> u64 {
    if baudrate > 19_200 {
        MIN_FRAME_GAP_US
    } else {
        38_500_000 / u64::from(baudrate.max(1))
    }
}

/// RTU slave for one unit address.  Broadcasts are served without a reply.
pub struct RtuSlave<L: SerialLine> {
    line: L,
    address: u8,
    gap_us: u64,
    rx: Vec<u8>,
    last_rx_us: u64,
    /// `(unit, function)` of the request handed out by `poll_request`.
    pending: Option<(u8, u8)>,
}

impl<L: SerialLine> RtuSlave<L> {
    pub fn new(line: L, address: u8, baudrate: u32) -> Self {
        Self {
            line,
            address,
            gap_us: frame_gap_us(baudrate),
            rx: Vec::with_capacity(MAX_FRAME_LEN),
            last_rx_us: 0,
            pending: None,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn line(&self) -> &L {
        &self.line
    }

    pub fn line_mut(&mut self) -> &mut L {
        &mut self.line
    }

    /// Drain the line and cut one frame, either when the header fixes its
    /// length or once the line has been silent for a frame gap.
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let now = self.line.now_us();
        let mut chunk = [0u8; 64];
        loop {
            let n = self.line.read_available(&mut chunk)?;
            if n == 0 {
                break;
            }
            if self.rx.len() + n > MAX_FRAME_LEN {
                warn!("modbus/rtu: {} bytes without a frame boundary, discarding", self.rx.len() + n);
                self.rx.clear();
            }
            self.rx.extend_from_slice(&chunk[..n]);
            self.last_rx_us = now;
        }

        if self.rx.is_empty() {
            return Ok(None);
        }
        if let Some(len) = rtu_frame::expected_request_len(&self.rx) {
            if self.rx.len() >= len {
                return Ok(Some(self.rx.drain(..len).collect()));
            }
        }
        if now.saturating_sub(self.last_rx_us) >= self.gap_us {
            return Ok(Some(core::mem::take(&mut self.rx)));
        }
        Ok(None)
    }

    fn addressed_to_us(&self, unit: u8) -> bool {
        unit == self.address || unit == BROADCAST_UNIT
    }
}

impl<L: SerialLine> SlaveIo for RtuSlave<L> {
    /// The UART is claimed at construction.
    fn is_bound(&self) -> bool {
        true
    }

    fn bind(&mut self, _local_ip: core::net::Ipv4Addr, _port: u16) -> Result<(), TransportError> {
        Ok(())
    }

    fn poll_request(&mut self) -> Result<Option<Request<'static>>, TransportError> {
        while let Some(frame) = self.next_frame()? {
            match rtu_frame::decode_request(&frame) {
                Ok(f) if self.addressed_to_us(f.unit) => {
                    if self.pending.replace((f.unit, f.function)).is_some() {
                        warn!("modbus/rtu: previous request dropped without a response");
                    }
                    return Ok(Some(f.request));
                }
                Ok(f) => debug!("modbus/rtu: frame for unit {} ignored", f.unit),
                Err(FrameError::Malformed { unit, function }) if unit == self.address => {
                    let reply: Result<Response, ExceptionCode> = Err(ExceptionCode::IllegalDataValue);
                    self.line.write_frame(&rtu_frame::encode_reply(unit, function, &reply))?;
                }
                Err(e) => {
                    debug!("modbus/rtu: dropped frame ({e:?}, {} bytes)", frame.len());
                    self.rx.clear();
                }
            }
        }
        Ok(None)
    }

    fn respond(&mut self, response: Result<Response, ExceptionCode>) -> Result<(), TransportError> {
        let (unit, function) = self
            .pending
            .take()
            .ok_or(TransportError::Rejected("no request awaiting a response"))?;
        if unit == BROADCAST_UNIT {
            return Ok(());
        }
        self.line.write_frame(&rtu_frame::encode_reply(unit, function, &response))
    }
}

/// Claim the UART for a serial slave.
#[cfg(target_os = "espidf")]
pub fn open_slave(cfg: &SlaveSerialConfig) -> Result<RtuSlave<UartStream>, TransportError> {
    cfg.line.validate()?;
    let uart = UartStream::open(&cfg.line)?;
    Ok(RtuSlave::new(uart, cfg.address, cfg.line.baudrate))
}

#[cfg(not(target_os = "espidf"))]
pub fn open_slave(cfg: &SlaveSerialConfig) -> Result<core::convert::Infallible, TransportError> {
    cfg.line.validate()?;
    warn!("modbus/rtu: no UART for unit {} on this build", cfg.address);
    Err(TransportError::Unsupported)
}

#[cfg(not(target_os = "espidf"))]
pub fn open_master(line: &SerialParams) -> Result<core::convert::Infallible, TransportError> {
    line.validate()?;
    Err(TransportError::Unsupported)
}

#[cfg(target_os = "espidf")]
pub fn open_master(line: &SerialParams) -> Result<RtuMaster, TransportError> {
    line.validate()?;
    RtuMaster::open(line)
}

#[cfg(target_os = "espidf")]
mod esp {
    use core::pin::Pin;
    use core::task::{Context as TaskContext, Poll};
    use core::time::Duration;
    use std::io;

    use esp_idf_svc::sys::*;
    use log::info;
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
    use tokio_modbus::client::{self, Reader as _, Writer as _};
    use tokio_modbus::slave::{Slave, SlaveContext as _, SlaveId};

    use super::SerialLine;
    use crate::adapters::modbus_tcp::flatten;
    use crate::app::ports::{MasterIo, TransportError};
    use crate::config::{Parity, SerialParams};
    use crate::pins;

    /// Per-request deadline on the bus.
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

    /// UART1 as a byte stream.  Reads never block; an empty FIFO yields.
    #[derive(Debug)]
    pub struct UartStream {
        port: uart_port_t,
    }

    impl UartStream {
        pub(super) fn open(line: &SerialParams) -> Result<Self, TransportError> {
            let port = pins::RS485_UART_NUM as uart_port_t;
            let cfg = uart_config_t {
                baud_rate: line.baudrate as i32,
                data_bits: match line.data_bits {
                    5 => uart_word_length_t_UART_DATA_5_BITS,
                    6 => uart_word_length_t_UART_DATA_6_BITS,
                    7 => uart_word_length_t_UART_DATA_7_BITS,
                    _ => uart_word_length_t_UART_DATA_8_BITS,
                },
                parity: match line.parity {
                    Parity::None => uart_parity_t_UART_PARITY_DISABLE,
                    Parity::Even => uart_parity_t_UART_PARITY_EVEN,
                    Parity::Odd => uart_parity_t_UART_PARITY_ODD,
                },
                stop_bits: if line.stop_bits == 2 {
                    uart_stop_bits_t_UART_STOP_BITS_2
                } else {
                    uart_stop_bits_t_UART_STOP_BITS_1
                },
                flow_ctrl: uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_DISABLE,
                ..Default::default()
            };
            // SAFETY: UART1 is owned exclusively by this adapter.
            unsafe {
                check(uart_driver_install(
                    port,
                    pins::RS485_BUF_SIZE,
                    pins::RS485_BUF_SIZE,
                    0,
                    core::ptr::null_mut(),
                    0,
                ))?;
                check(uart_param_config(port, &cfg))?;
                check(uart_set_pin(
                    port,
                    pins::RS485_TX_GPIO,
                    pins::RS485_RX_GPIO,
                    pins::RS485_DE_GPIO,
                    UART_PIN_NO_CHANGE,
                ))?;
                check(uart_set_mode(port, uart_mode_t_UART_MODE_RS485_HALF_DUPLEX))?;
            }
            info!(
                "modbus/rtu: UART{} {} baud {}{}{}",
                pins::RS485_UART_NUM,
                line.baudrate,
                line.data_bits,
                match line.parity {
                    Parity::None => 'N',
                    Parity::Even => 'E',
                    Parity::Odd => 'O',
                },
                line.stop_bits
            );
            Ok(Self { port })
        }
    }

    impl Drop for UartStream {
        fn drop(&mut self) {
            unsafe {
                uart_driver_delete(self.port);
            }
        }
    }

    fn check(ret: esp_err_t) -> Result<(), TransportError> {
        if ret == ESP_OK {
            Ok(())
        } else {
            log::error!("modbus/rtu: UART setup failed (rc={})", ret);
            Err(TransportError::Rejected("UART configuration refused"))
        }
    }

    impl SerialLine for UartStream {
        fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let n = unsafe { uart_read_bytes(self.port, buf.as_mut_ptr().cast(), buf.len() as u32, 0) };
            usize::try_from(n).map_err(|_| TransportError::Io)
        }

        fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
            let n = unsafe { uart_write_bytes(self.port, frame.as_ptr().cast(), frame.len()) };
            if usize::try_from(n).ok() != Some(frame.len()) {
                return Err(TransportError::Io);
            }
            if unsafe { uart_wait_tx_done(self.port, u32::MAX) } != ESP_OK {
                return Err(TransportError::Timeout);
            }
            Ok(())
        }

        fn now_us(&self) -> u64 {
            // SAFETY: reads the monotonic system timer.
            unsafe { esp_timer_get_time() as u64 }
        }
    }

    impl AsyncRead for UartStream {
        fn poll_read(self: Pin<&mut Self>, cx: &mut TaskContext<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            let dst = buf.initialize_unfilled();
            let n = unsafe { uart_read_bytes(self.port, dst.as_mut_ptr().cast(), dst.len() as u32, 0) };
            match n {
                n if n < 0 => Poll::Ready(Err(io::Error::other("uart read failed"))),
                0 => {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
                n => {
                    buf.advance(n as usize);
                    Poll::Ready(Ok(()))
                }
            }
        }
    }

    impl AsyncWrite for UartStream {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
            let n = unsafe { uart_write_bytes(self.port, data.as_ptr().cast(), data.len()) };
            if n < 0 {
                Poll::Ready(Err(io::Error::other("uart write failed")))
            } else {
                Poll::Ready(Ok(n as usize))
            }
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
            let ret = unsafe { uart_wait_tx_done(self.port, u32::MAX) };
            Poll::Ready(if ret == ESP_OK { Ok(()) } else { Err(io::Error::other("uart flush failed")) })
        }

        fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
            self.poll_flush(cx)
        }
    }

    /// RTU client driven synchronously.
    pub struct RtuMaster {
        rt: tokio::runtime::Runtime,
        ctx: client::Context,
    }

    impl RtuMaster {
        pub(super) fn open(line: &SerialParams) -> Result<Self, TransportError> {
            let stream = UartStream::open(line)?;
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .map_err(|_| TransportError::Rejected("cannot build runtime"))?;
            let ctx = client::rtu::attach_slave(stream, Slave(1));
            Ok(Self { rt, ctx })
        }

        fn call<T, F>(&mut self, unit: SlaveId, f: F) -> Result<T, TransportError>
        where
            F: AsyncFnOnce(&mut client::Context) -> tokio_modbus::Result<T>,
        {
            let Self { rt, ctx } = self;
            ctx.set_slave(Slave(unit));
            match rt.block_on(tokio::time::timeout(REQUEST_TIMEOUT, f(ctx))) {
                Ok(res) => flatten(res),
                Err(_) => Err(TransportError::Timeout),
            }
        }
    }

    impl MasterIo for RtuMaster {
        fn read_holding_registers(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<u16>, TransportError> {
            self.call(unit, async move |c| c.read_holding_registers(addr, cnt).await)
        }

        fn read_input_registers(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<u16>, TransportError> {
            self.call(unit, async move |c| c.read_input_registers(addr, cnt).await)
        }

        fn read_coils(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<bool>, TransportError> {
            self.call(unit, async move |c| c.read_coils(addr, cnt).await)
        }

        fn read_discrete_inputs(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<bool>, TransportError> {
            self.call(unit, async move |c| c.read_discrete_inputs(addr, cnt).await)
        }

        fn write_single_register(&mut self, unit: SlaveId, addr: u16, value: u16) -> Result<(), TransportError> {
            self.call(unit, async move |c| c.write_single_register(addr, value).await)
        }

        fn write_multiple_registers(&mut self, unit: SlaveId, addr: u16, values: &[u16]) -> Result<(), TransportError> {
            self.call(unit, async move |c| c.write_multiple_registers(addr, values).await)
        }

        fn write_single_coil(&mut self, unit: SlaveId, addr: u16, on: bool) -> Result<(), TransportError> {
            self.call(unit, async move |c| c.write_single_coil(addr, on).await)
        }
    }
}
