//! Transporte serial – traits para a porta e para a descoberta/abertura,
//! com implementação real sobre o crate `serialport`.

use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::debug;

/// Uma porta serial aberta.
pub trait Transport: Send {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Bytes disponíveis para leitura sem bloquear. Erro = porta fechada.
    fn bytes_to_read(&mut self) -> io::Result<usize>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Porta encontrada na enumeração.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
    pub manufacturer: Option<String>,
}

impl PortInfo {
    /// A descrição contém alguma das palavras-chave (case-insensitive)?
    pub fn matches_any(&self, keywords: &[String]) -> bool {
        let description = self.description.to_lowercase();
        keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .any(|k| !k.is_empty() && description.contains(&k))
    }
}

/// Enumera e abre portas.
pub trait PortProvider: Send + Sync {
    fn list_ports(&self) -> io::Result<Vec<PortInfo>>;

    fn open(&self, name: &str, baud_rate: u32, timeout: Duration) -> io::Result<Box<dyn Transport>>;
}

// ──────────────────────────────────────────────
// serialport
// ──────────────────────────────────────────────

/// Provider do sistema, via `serialport`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortProvider for SystemPorts {
    fn list_ports(&self) -> io::Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(io::Error::from)?;
        Ok(ports.into_iter().map(port_info).collect())
    }

    fn open(&self, name: &str, baud_rate: u32, timeout: Duration) -> io::Result<Box<dyn Transport>> {
        let port = serialport::new(name, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(io::Error::from)?;
        debug!("Porta {name} aberta a {baud_rate} baud");
        Ok(Box::new(SerialTransport { port }))
    }
}

fn port_info(p: serialport::SerialPortInfo) -> PortInfo {
    use serialport::SerialPortType;

    let (description, manufacturer) = match p.port_type {
        SerialPortType::UsbPort(usb) => {
            let product = usb.product.unwrap_or_default();
            let description = format!("USB {:04x}:{:04x} {}", usb.vid, usb.pid, product)
                .trim()
                .to_string();
            (description, usb.manufacturer)
        }
        SerialPortType::PciPort => ("PCI serial".to_string(), None),
        SerialPortType::BluetoothPort => ("Bluetooth serial".to_string(), None),
        SerialPortType::Unknown => ("n/a".to_string(), None),
    };

    // Fabricante entra na descrição para casar "Arduino" mesmo sem o produto
    let description = match &manufacturer {
        Some(m) if !description.to_lowercase().contains(&m.to_lowercase()) => {
            format!("{description} ({m})")
        }
        _ => description,
    };

    PortInfo {
        name: p.port_name,
        description,
        manufacturer,
    }
}

struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, bytes)?;
        self.port.flush()
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut self.port, buf)
    }
}
