//! # Display Link
//!
//! Link serial com o display 16x2 do IoT Sentinel.
//!
//! ## Módulos
//! - [`transport`] – Traits da porta serial e implementação via `serialport`
//! - [`session`] – Estado do link e snapshot de status
//! - [`manager`] – Conexão, handshake, thread de leitura e reconexão

pub mod manager;
pub mod session;
pub mod transport;

pub use manager::{InboundMessage, LinkError, LinkEvent, LinkManager};
pub use session::{LinkState, LinkStatus};
pub use transport::{PortInfo, PortProvider, SystemPorts, Transport};
