//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável cobre link serial,
//! banco de dados, webhooks e defaults do gateway.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Configuração do link serial com o display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Porta serial (vazio = auto-detecção)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Conectar automaticamente ao iniciar
    pub auto_connect: bool,
    /// Intervalo entre leituras da serial (ms, < 1000)
    pub poll_interval_ms: u64,
    /// Espera após abrir a porta, antes do HELLO (ms)
    pub settle_delay_ms: u64,
    /// Espera entre HELLO e STATUS (ms)
    pub handshake_gap_ms: u64,
    /// Timeout de I/O da porta (ms)
    pub io_timeout_ms: u64,
    /// Substrings (case-insensitive) na descrição da porta para auto-detecção
    pub discovery_keywords: Vec<String>,
    /// Tokens que indicam "periférico pronto"
    pub ready_tokens: Vec<String>,
    /// Tamanho máximo de uma linha recebida (bytes)
    pub line_limit: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 9600,
            auto_connect: true,
            poll_interval_ms: 100,
            settle_delay_ms: 2000,
            handshake_gap_ms: 1000,
            io_timeout_ms: 1000,
            discovery_keywords: vec!["arduino".into(), "usb".into(), "ch340".into()],
            ready_tokens: vec!["arduino_ready".into()],
            line_limit: crate::protocol::DEFAULT_LINE_LIMIT,
        }
    }
}

impl LinkConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn handshake_gap(&self) -> Duration {
        Duration::from_millis(self.handshake_gap_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Porta configurada, se houver.
    pub fn preferred_port(&self) -> Option<&str> {
        let port = self.port.trim();
        (!port.is_empty()).then_some(port)
    }
}

/// Configuração do banco SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "sentinel.db".into(),
        }
    }
}

/// Configuração de notificações de ataque (ntfy, Discord).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub enabled: bool,
    pub ntfy_server: String,
    pub ntfy_topic: String,
    pub discord_webhook_url: String,
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ntfy_server: "https://ntfy.sh".into(),
            ntfy_topic: String::new(),
            discord_webhook_url: String::new(),
            timeout_secs: 10,
        }
    }
}

impl NotifierConfig {
    /// Há pelo menos um destino configurado?
    pub fn has_targets(&self) -> bool {
        !self.ntfy_topic.trim().is_empty() || !self.discord_webhook_url.trim().is_empty()
    }
}

/// Defaults aplicados a relatórios de telemetria incompletos.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub default_device_name: String,
    pub default_ip: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_device_name: "IoT Device".into(),
            default_ip: "0.0.0.0".into(),
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub storage: StorageConfig,
    pub notifier: NotifierConfig,
    pub gateway: GatewayConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.link.baud_rate == 0 {
            errors.push("Baud rate não pode ser 0".into());
        }
        if self.link.poll_interval_ms == 0 || self.link.poll_interval_ms >= 1000 {
            errors.push(format!(
                "Intervalo de leitura inválido: {} ms (1–999)",
                self.link.poll_interval_ms
            ));
        }
        if self.link.line_limit < 64 {
            errors.push(format!("line_limit muito pequeno: {} (mínimo 64)", self.link.line_limit));
        }
        if self.link.ready_tokens.iter().all(|t| t.trim().is_empty()) {
            errors.push("Nenhum token de 'pronto' configurado".into());
        }
        if self.storage.database_path.trim().is_empty() {
            errors.push("Caminho do banco não pode ser vazio".into());
        }
        if self.notifier.enabled && !self.notifier.has_targets() {
            errors.push("Notificações habilitadas sem ntfy_topic nem discord_webhook_url".into());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.link.baud_rate, parsed.link.baud_rate);
        assert_eq!(config.link.discovery_keywords, parsed.link.discovery_keywords);
        assert_eq!(config.storage.database_path, parsed.storage.database_path);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[link]
port = "/dev/ttyACM0"
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.link.preferred_port(), Some("/dev/ttyACM0"));
        // Outros campos devem ter valor padrão
        assert_eq!(config.link.baud_rate, 9600);
        assert_eq!(config.link.poll_interval(), Duration::from_millis(100));
        assert!(!config.notifier.enabled);
    }

    #[test]
    fn blank_port_means_auto_detect() {
        let link = LinkConfig {
            port: "   ".into(),
            ..Default::default()
        };
        assert_eq!(link.preferred_port(), None);
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut config = AppConfig::default();
        config.link.poll_interval_ms = 5000;
        config.notifier.enabled = true;
        let errors = config.validate();
        assert_eq!(errors.len(), 2, "Erros: {:?}", errors);
    }

    #[test]
    fn save_and_load_file() {
        let dir = std::env::temp_dir().join(format!("sentinel-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let mut config = AppConfig::default();
        config.notifier.ntfy_topic = "casa-sentinel".into();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path);
        assert_eq!(loaded.notifier.ntfy_topic, "casa-sentinel");
        std::fs::remove_dir_all(&dir).ok();
    }
}
