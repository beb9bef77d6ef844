//! # Sentinel Gateway
//!
//! Lê relatórios de telemetria (uma linha JSON por dispositivo) da entrada
//! padrão, classifica, grava no SQLite, notifica via webhook e atualiza o
//! display serial. Escreve um JSON de resposta por linha na saída padrão.
//!
//! ## Uso
//! ```bash
//! sentinel_gateway                          # config.toml ao lado do executável
//! sentinel_gateway --config ./sentinel.toml
//! sentinel_gateway --port /dev/ttyACM0      # força a porta do display
//! ```

mod ingest;
mod notifier;
mod store;

use display_link::{LinkEvent, LinkManager};
use ingest::{Gateway, render_response};
use notifier::WebhookNotifier;
use sentinel_core::config::AppConfig;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use store::Store;
use tracing::{error, info, warn};

/// Argumentos de linha de comando.
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config: Option<PathBuf>,
    port: Option<String>,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut cli = CliArgs::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => cli.config = args.next().map(PathBuf::from),
                "--port" => cli.port = args.next(),
                other => warn!("Argumento ignorado: {other}"),
            }
        }
        cli
    }
}

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = CliArgs::parse(std::env::args().skip(1));

    // ── Carregar config ──
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    // ── Banco ──
    let store = match Store::open(&config.storage.database_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Falha ao abrir o banco {}: {e}", config.storage.database_path);
            std::process::exit(1);
        }
    };

    match store.pending_alerts() {
        Ok(pending) if !pending.is_empty() => {
            warn!("{} alerta(s) gravado(s) sem notificação enviada", pending.len());
        }
        Ok(_) => {}
        Err(e) => warn!("Falha ao consultar alertas pendentes: {e}"),
    }

    let notifier = WebhookNotifier::new(config.notifier.clone());

    // ── Display ──
    let link = Arc::new(LinkManager::new(config.link.clone()));
    watch_link_heartbeat(&link, &store);
    let events_store = Arc::clone(&store);
    link.set_event_callback(move |event| record_link_event(&events_store, event));

    if config.link.auto_connect {
        let port = cli.port.as_deref().or(config.link.preferred_port());
        if !link.connect_or_retry(port, None) {
            warn!("Display indisponível; seguindo sem display até a porta aparecer");
        }
    }

    // ── Loop principal ──
    info!("Aguardando relatórios na entrada padrão (uma linha JSON por relatório)");
    let gateway = Gateway::new(&store, &notifier, link.as_ref(), &config.gateway);
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Erro lendo entrada: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let result = gateway.process_line(&line);
        if let Err(e) = &result {
            warn!("Relatório rejeitado: {e}");
        }
        if writeln!(stdout, "{}", render_response(&result)).is_err() {
            break;
        }
        let _ = stdout.flush();
    }

    // ── Encerramento ──
    link.shutdown();
    info!("Gateway encerrado");
}

/// Cada mensagem recebida do display atualiza o heartbeat da porta no banco.
fn watch_link_heartbeat(link: &Arc<LinkManager>, store: &Arc<Store>) {
    let weak: Weak<LinkManager> = Arc::downgrade(link);
    let store = Arc::clone(store);
    link.set_message_callback(move |_message| {
        let Some(link) = weak.upgrade() else {
            return;
        };
        if let Some(port) = link.status().port {
            if let Err(e) = store.update_link_heartbeat(&port) {
                warn!("Falha ao atualizar heartbeat: {e}");
            }
        }
    });
}

/// Cada abertura (inclusive reconexão) e cada queda da porta vão para `link_connections`.
fn record_link_event(store: &Store, event: &LinkEvent) {
    let result = match event {
        LinkEvent::Connected { port, device_ref } => store.register_link(port, *device_ref),
        LinkEvent::Disconnected { port } => store.mark_link_disconnected(port),
    };
    if let Err(e) = result {
        warn!("Falha ao registrar estado do display: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_config_and_port() {
        let cli = CliArgs::parse(args(&["--config", "/etc/sentinel.toml", "--port", "COM3"]));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/sentinel.toml")));
        assert_eq!(cli.port.as_deref(), Some("COM3"));
    }

    #[test]
    fn unknown_and_dangling_args_are_ignored() {
        let cli = CliArgs::parse(args(&["--verbose", "--port"]));
        assert_eq!(cli, CliArgs::default());
    }

    #[test]
    fn link_events_track_reconnects() {
        let store = Store::open_in_memory().unwrap();
        let connected = LinkEvent::Connected {
            port: "/dev/ttyACM0".into(),
            device_ref: None,
        };
        let lost = LinkEvent::Disconnected {
            port: "/dev/ttyACM0".into(),
        };

        record_link_event(&store, &connected);
        assert_eq!(store.link("/dev/ttyACM0").unwrap().unwrap().connection_status, "connected");

        record_link_event(&store, &lost);
        assert_eq!(store.link("/dev/ttyACM0").unwrap().unwrap().connection_status, "disconnected");

        // Reconexão volta a marcar a porta como conectada
        record_link_event(&store, &connected);
        assert_eq!(store.link("/dev/ttyACM0").unwrap().unwrap().connection_status, "connected");
    }
}
