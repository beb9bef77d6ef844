//! Protocolo de comandos do display serial (LCD 16x2).
//!
//! Cada comando vai como um objeto JSON por linha, terminado em `\n`:
//!
//! ```text
//! {"cmd":"DISPLAY","data":{"line1":"...","line2":"..."},"timestamp":1760000000.12}
//! ```
//!
//! - `cmd`: CONNECTED | HELLO | STATUS | DISPLAY | ALERT | CLEAR
//! - `data`: campos do comando, já truncados para caber no display
//! - `timestamp`: segundos do relógio de parede, 2 casas decimais
//!
//! O periférico responde com objetos JSON livres, também um por linha.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Largura de uma linha do LCD (nomes, linhas, tipo de ataque).
pub const LINE_MAX_CHARS: usize = 16;

/// Largura máxima do campo de severidade.
pub const SEVERITY_MAX_CHARS: usize = 8;

/// Tamanho máximo de uma linha recebida antes de ser descartada.
pub const DEFAULT_LINE_LIMIT: usize = 1024;

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("JSON inválido: {0}")]
    Decode(String),

    #[error("Mensagem não é um objeto JSON: {0}")]
    NotAnObject(String),

    #[error("Envelope sem campo '{0}'")]
    MissingField(&'static str),
}

// ──────────────────────────────────────────────
// Comandos
// ──────────────────────────────────────────────

/// Comando enviado ao display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayCommand {
    Connected { status: String, device_id: Option<i64> },
    Hello { msg: String },
    Status { device: String, ip: String },
    Display { line1: String, line2: String },
    Alert { attack: String, severity: String },
    Clear {},
}

impl DisplayCommand {
    pub fn connected(device_id: Option<i64>) -> Self {
        DisplayCommand::Connected {
            status: "connected".into(),
            device_id,
        }
    }

    pub fn hello(msg: &str) -> Self {
        DisplayCommand::Hello { msg: msg.into() }
    }

    pub fn status(device: &str, ip: &str) -> Self {
        DisplayCommand::Status {
            device: truncate_chars(device, LINE_MAX_CHARS),
            ip: truncate_chars(ip, LINE_MAX_CHARS),
        }
    }

    pub fn display(line1: &str, line2: &str) -> Self {
        DisplayCommand::Display {
            line1: truncate_chars(line1, LINE_MAX_CHARS),
            line2: truncate_chars(line2, LINE_MAX_CHARS),
        }
    }

    pub fn alert(attack: &str, severity: &str) -> Self {
        DisplayCommand::Alert {
            attack: truncate_chars(attack, LINE_MAX_CHARS),
            severity: truncate_chars(severity, SEVERITY_MAX_CHARS),
        }
    }

    pub fn clear() -> Self {
        DisplayCommand::Clear {}
    }

    /// Nome do comando no fio.
    pub fn name(&self) -> &'static str {
        match self {
            DisplayCommand::Connected { .. } => "CONNECTED",
            DisplayCommand::Hello { .. } => "HELLO",
            DisplayCommand::Status { .. } => "STATUS",
            DisplayCommand::Display { .. } => "DISPLAY",
            DisplayCommand::Alert { .. } => "ALERT",
            DisplayCommand::Clear {} => "CLEAR",
        }
    }

    /// Reaplica os limites do display (para comandos montados à mão).
    fn bounded(&self) -> Self {
        match self {
            DisplayCommand::Status { device, ip } => DisplayCommand::status(device, ip),
            DisplayCommand::Display { line1, line2 } => DisplayCommand::display(line1, line2),
            DisplayCommand::Alert { attack, severity } => DisplayCommand::alert(attack, severity),
            other => other.clone(),
        }
    }
}

/// Trunca para no máximo `max` caracteres (não bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

// ──────────────────────────────────────────────
// Envelope
// ──────────────────────────────────────────────

/// Envelope decodificado (`cmd` + `data` + `timestamp`).
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub command: DisplayCommand,
    pub timestamp: f64,
}

/// Segundos desde a época com 2 casas decimais.
pub fn wall_clock_timestamp() -> f64 {
    let centis = (Utc::now().timestamp_millis() as f64 / 10.0).round();
    centis / 100.0
}

/// Codifica um comando como linha JSON terminada em `\n`.
pub fn encode_command(command: &DisplayCommand, timestamp: f64) -> Result<Vec<u8>, ProtocolError> {
    let mut value =
        serde_json::to_value(command.bounded()).map_err(|e| ProtocolError::Serialize(e.to_string()))?;

    if let Value::Object(map) = &mut value {
        map.insert("timestamp".into(), serde_json::json!(timestamp));
    }

    let mut line = serde_json::to_vec(&value).map_err(|e| ProtocolError::Serialize(e.to_string()))?;
    line.push(b'\n');
    Ok(line)
}

/// Decodifica uma linha de envelope (usado pelo lado do periférico e em testes).
pub fn decode_envelope(line: &str) -> Result<Envelope, ProtocolError> {
    let mut map = decode_inbound(line)?;

    let timestamp = map
        .remove("timestamp")
        .and_then(|v| v.as_f64())
        .ok_or(ProtocolError::MissingField("timestamp"))?;

    let command = serde_json::from_value(Value::Object(map))
        .map_err(|e| ProtocolError::Decode(e.to_string()))?;

    Ok(Envelope { command, timestamp })
}

/// Decodifica uma linha recebida do periférico. Precisa ser um objeto JSON.
pub fn decode_inbound(line: &str) -> Result<Map<String, Value>, ProtocolError> {
    match serde_json::from_str::<Value>(line.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ProtocolError::NotAnObject(line.trim().to_string())),
        Err(e) => Err(ProtocolError::Decode(e.to_string())),
    }
}

// ──────────────────────────────────────────────
// Sinal de "pronto"
// ──────────────────────────────────────────────

/// Verifica se algum campo texto da mensagem contém um token de "pronto".
///
/// Comparação tolerante: minúsculas, sem `_`, `-` e espaços
/// (`"Arduino-Ready"` casa com `arduino_ready`).
pub fn is_ready_signal(message: &Map<String, Value>, tokens: &[String]) -> bool {
    let tokens: Vec<String> = tokens
        .iter()
        .map(|t| normalize_token(t))
        .filter(|t| !t.is_empty())
        .collect();

    message
        .values()
        .filter_map(Value::as_str)
        .map(normalize_token)
        .any(|value| tokens.iter().any(|t| value.contains(t.as_str())))
}

fn normalize_token(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

// ──────────────────────────────────────────────
// Framing por linha
// ──────────────────────────────────────────────

/// Acumula bytes da serial e devolve linhas completas.
///
/// Bytes inválidos em UTF-8 são substituídos. Uma linha maior que o limite
/// é descartada inteira (até o próximo `\n`).
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    limit: usize,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            pending: Vec::with_capacity(limit.min(256)),
            limit,
            overflowed: false,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &b in bytes {
            if b == b'\n' {
                if !self.overflowed {
                    let line = String::from_utf8_lossy(&self.pending).trim().to_string();
                    if !line.is_empty() {
                        lines.push(line);
                    }
                }
                self.pending.clear();
                self.overflowed = false;
            } else if self.pending.len() < self.limit {
                self.pending.push(b);
            } else if !self.overflowed {
                warn!("Linha recebida excede {} bytes, descartando", self.limit);
                self.overflowed = true;
            }
        }

        lines
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_LIMIT)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
