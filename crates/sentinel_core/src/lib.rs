//! # Sentinel Core
//!
//! Crate compartilhada que define os tipos de detecção, o classificador
//! baseado em regras, o protocolo JSON do display serial, a configuração
//! TOML e o relay de alertas do sistema IoT Sentinel.
//!
//! ## Módulos
//! - [`types`] – FeatureVector, AttackType, Severity e Verdict
//! - [`classifier`] – Risk score, tabela ordenada de regras e recomendações
//! - [`protocol`] – Envelope de comandos do display, framing por linha
//! - [`config`] – Configuração unificada via TOML
//! - [`relay`] – Coordenação detecção → persistência → notificação → display

pub mod types;
pub mod classifier;
pub mod protocol;
pub mod config;
pub mod relay;

// Re-exports convenientes
pub use types::{AttackType, FeatureVector, Severity, Verdict};
pub use classifier::{classify, recommendations, recommendations_for};
pub use protocol::{DisplayCommand, encode_command, decode_inbound};
pub use config::{AppConfig, LinkConfig, NotifierConfig, StorageConfig};
pub use relay::{AlertRelay, DeviceContext, RelayOutcome};
