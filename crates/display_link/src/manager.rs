//! Gerenciador do link serial com o display.
//!
//! Dono único da porta: abre, faz o handshake, mantém uma thread de leitura
//! e reconecta sozinho quando a porta cai. Toda falha de I/O só derruba o
//! estado para "desconectado"; nada é propagado como pânico.

use crate::session::{LinkSession, LinkState, LinkStatus};
use crate::transport::{PortInfo, PortProvider, SystemPorts, Transport};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::{Mutex, RwLock};
use sentinel_core::config::LinkConfig;
use sentinel_core::protocol::{self, DisplayCommand, LineBuffer, ProtocolError};
use sentinel_core::relay::DisplaySink;
use serde_json::{Map, Value};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Mensagem decodificada vinda do periférico.
pub type InboundMessage = Map<String, Value>;

const BACKEND_NAME: &str = "IoT Backend";
const OBSERVER_CAPACITY: usize = 64;
const READ_CHUNK: usize = 512;

/// Erros internos do link. A API pública degrada para `bool`.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Nenhuma porta serial compatível encontrada")]
    NoPortFound,

    #[error("Falha ao abrir {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: io::Error,
    },

    #[error("Erro de I/O: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Display não conectado")]
    NotConnected,
}

/// Mudanças de conexão da porta, para quem precisa registrar o link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Porta aberta (primeira conexão ou reconexão).
    Connected { port: String, device_ref: Option<i64> },
    /// Porta fechada ou perdida.
    Disconnected { port: String },
}

type EventCallback = Arc<dyn Fn(&LinkEvent) + Send + Sync>;

/// Resultado de uma abertura.
enum Opened {
    Fresh(String),
    /// Outra chamada já tinha aberto a porta pedida.
    Existing(String),
}

/// Observador único das mensagens recebidas.
enum Observer {
    Callback(Arc<dyn Fn(&InboundMessage) + Send + Sync>),
    Channel(Sender<InboundMessage>),
}

struct Connection {
    io: Box<dyn Transport>,
    lines: LineBuffer,
}

struct Shared {
    config: LinkConfig,
    provider: Box<dyn PortProvider>,
    connection: Mutex<Option<Connection>>,
    session: RwLock<LinkSession>,
    observer: Mutex<Option<Observer>>,
    events: Mutex<Option<EventCallback>>,
    /// Serializa aberturas (connect explícito × reconexão do loop).
    establish: Mutex<()>,
    running: AtomicBool,
    reconnect_failures: AtomicU32,
}

/// Gerenciador do link com o display serial.
pub struct LinkManager {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LinkManager {
    /// Usa as portas seriais do sistema.
    pub fn new(config: LinkConfig) -> Self {
        Self::with_provider(config, SystemPorts)
    }

    pub fn with_provider<P: PortProvider + 'static>(config: LinkConfig, provider: P) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                provider: Box::new(provider),
                connection: Mutex::new(None),
                session: RwLock::new(LinkSession::new()),
                observer: Mutex::new(None),
                events: Mutex::new(None),
                establish: Mutex::new(()),
                running: AtomicBool::new(true),
                reconnect_failures: AtomicU32::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Portas cuja descrição casa com as palavras-chave configuradas.
    pub fn find_ports(&self) -> Vec<PortInfo> {
        self.shared.discover()
    }

    /// Conecta à porta indicada (ou à primeira detectada) e faz o handshake.
    ///
    /// Já conectado à mesma porta → `true` sem reabrir. Uma falha não mexe
    /// na reconexão automática de uma sessão anterior.
    pub fn connect(&self, port: Option<&str>, device_ref: Option<i64>) -> bool {
        if device_ref.is_some() || !self.shared.is_open() {
            self.shared.session.write().device_ref = device_ref;
        }

        match self.shared.open_port(port) {
            Ok(Opened::Existing(name)) => {
                debug!("Display já conectado em {name}");
                true
            }
            Ok(Opened::Fresh(name)) => {
                self.ensure_worker();
                self.shared.handshake();
                debug!("Handshake com {name} concluído");
                true
            }
            Err(e) => {
                warn!("⚠ Não foi possível conectar ao display: {e}");
                false
            }
        }
    }

    /// Como [`connect`](Self::connect), mas se falhar deixa o loop de leitura
    /// tentando em segundo plano até a porta aparecer.
    pub fn connect_or_retry(&self, port: Option<&str>, device_ref: Option<i64>) -> bool {
        if self.connect(port, device_ref) {
            return true;
        }

        {
            let mut s = self.shared.session.write();
            s.auto_reconnect = true;
            if let Some(p) = port {
                s.port_name = Some(p.to_string());
            }
        }
        self.ensure_worker();
        info!("🔁 Display indisponível, tentando em segundo plano");
        false
    }

    /// Fecha a porta e desliga a reconexão automática até o próximo `connect`.
    pub fn disconnect(&self) {
        let port = self.shared.session.read().port_name.clone();
        let had_connection = self.shared.close_connection();
        self.shared.session.write().auto_reconnect = false;
        if had_connection {
            info!("🔌 Display desconectado de {}", port.unwrap_or_default());
        }
    }

    pub fn send_display(&self, line1: &str, line2: &str) -> bool {
        self.shared.send(&DisplayCommand::display(line1, line2))
    }

    pub fn send_clear(&self) -> bool {
        self.shared.send(&DisplayCommand::clear())
    }

    pub fn send_alert(&self, attack_type: &str, severity: &str) -> bool {
        self.shared.send(&DisplayCommand::alert(attack_type, severity))
    }

    pub fn send_status(&self, device_name: &str, ip: &str) -> bool {
        self.shared.send(&DisplayCommand::status(device_name, ip))
    }

    /// Snapshot do estado do link.
    pub fn status(&self) -> LinkStatus {
        self.shared.session.read().snapshot(self.shared.config.baud_rate)
    }

    /// Registra o observador das mensagens recebidas, substituindo o anterior.
    pub fn set_message_callback<F>(&self, callback: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        *self.shared.observer.lock() = Some(Observer::Callback(Arc::new(callback)));
    }

    /// Registra quem recebe os [`LinkEvent`]s, substituindo o anterior.
    ///
    /// Roda na thread que abriu ou perdeu a porta; não chame `connect` daqui.
    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        *self.shared.events.lock() = Some(Arc::new(callback));
    }

    /// Alternativa ao callback: recebe as mensagens por channel.
    /// Ocupa o mesmo lugar do callback (substitui o observador anterior).
    pub fn subscribe(&self) -> Receiver<InboundMessage> {
        let (tx, rx) = bounded(OBSERVER_CAPACITY);
        *self.shared.observer.lock() = Some(Observer::Channel(tx));
        rx
    }

    /// Para a thread de leitura e fecha a porta.
    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!("Thread de leitura terminou com pânico");
            }
        }
        self.shared.close_connection();
        self.shared.session.write().auto_reconnect = false;
    }

    fn ensure_worker(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("link-reader".into())
            .spawn(move || shared.read_loop())
        {
            Ok(handle) => *worker = Some(handle),
            Err(e) => error!("Falha ao criar thread de leitura: {e}"),
        }
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl DisplaySink for LinkManager {
    fn send_alert(&self, attack: &str, severity: &str) -> bool {
        LinkManager::send_alert(self, attack, severity)
    }

    fn send_status(&self, device: &str, ip: &str) -> bool {
        LinkManager::send_status(self, device, ip)
    }
}

// ──────────────────────────────────────────────
// Estado compartilhado com a thread de leitura
// ──────────────────────────────────────────────

impl Shared {
    fn is_open(&self) -> bool {
        self.connection.lock().is_some()
    }

    fn discover(&self) -> Vec<PortInfo> {
        match self.provider.list_ports() {
            Ok(ports) => ports
                .into_iter()
                .filter(|p| p.matches_any(&self.config.discovery_keywords))
                .collect(),
            Err(e) => {
                warn!("Erro ao listar portas seriais: {e}");
                Vec::new()
            }
        }
    }

    fn emit(&self, event: LinkEvent) {
        let callback = self.events.lock().clone();
        if let Some(cb) = callback {
            cb(&event);
        }
    }

    /// Connecting → AwaitingHandshake. Envia CONNECTED.
    fn open_port(&self, port: Option<&str>) -> Result<Opened, LinkError> {
        let opened = self.open_port_exclusive(port)?;
        if let Opened::Fresh(name) = &opened {
            let device_ref = self.session.read().device_ref;
            self.emit(LinkEvent::Connected {
                port: name.clone(),
                device_ref,
            });
        }
        Ok(opened)
    }

    fn open_port_exclusive(&self, port: Option<&str>) -> Result<Opened, LinkError> {
        let _guard = self.establish.lock();

        // Reavaliado sob o lock: outra thread pode ter acabado de abrir
        if self.is_open() {
            let current = self.session.read().port_name.clone();
            match (port, current) {
                (None, Some(current)) => return Ok(Opened::Existing(current)),
                (Some(requested), Some(current)) if requested == current => {
                    return Ok(Opened::Existing(current));
                }
                (_, current) => {
                    info!("Trocando de porta: {:?} → {:?}", current, port);
                    self.close_connection();
                }
            }
        }

        self.session.write().state = LinkState::Connecting;
        let result = self.try_open(port);
        if result.is_err() && !self.is_open() {
            self.session.write().mark_disconnected();
        }
        result.map(Opened::Fresh)
    }

    fn try_open(&self, port: Option<&str>) -> Result<String, LinkError> {
        let name = match port {
            Some(p) => p.to_string(),
            None => self
                .discover()
                .into_iter()
                .next()
                .map(|p| p.name)
                .ok_or(LinkError::NoPortFound)?,
        };

        info!("🔌 Conectando ao display em {name}...");
        let io = self
            .provider
            .open(&name, self.config.baud_rate, self.config.io_timeout())
            .map_err(|source| LinkError::Open {
                port: name.clone(),
                source,
            })?;

        *self.connection.lock() = Some(Connection {
            io,
            lines: LineBuffer::new(self.config.line_limit),
        });

        let device_ref = {
            let mut s = self.session.write();
            s.state = LinkState::AwaitingHandshake;
            s.connected = true;
            s.peripheral_ready = false;
            s.port_name = Some(name.clone());
            s.auto_reconnect = true;
            s.device_ref
        };
        self.reconnect_failures.store(0, Ordering::Relaxed);
        info!("✅ Display conectado em {name}");

        self.send(&DisplayCommand::connected(device_ref));
        Ok(name)
    }

    /// HELLO → pausa → STATUS → Ready. Não espera resposta do periférico.
    fn handshake(&self) {
        info!("🤝 Enviando handshake ao display...");
        self.pause(self.config.settle_delay());
        self.send(&DisplayCommand::hello("Backend connected"));
        self.pause(self.config.handshake_gap());
        self.send(&DisplayCommand::status(BACKEND_NAME, "Connected"));

        let still_open = self.is_open();
        let mut s = self.session.write();
        if still_open && s.state == LinkState::AwaitingHandshake {
            s.state = LinkState::Ready;
        }
    }

    /// Dorme em fatias, saindo cedo no shutdown.
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.running.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(50)));
        }
    }

    /// Fecha a porta, se aberta. Retorna se havia conexão.
    fn close_connection(&self) -> bool {
        let had = self.connection.lock().take().is_some();
        self.mark_lost(had);
        had
    }

    fn mark_lost(&self, had_connection: bool) {
        let port = {
            let mut s = self.session.write();
            s.mark_disconnected();
            s.port_name.clone()
        };
        if let (true, Some(port)) = (had_connection, port) {
            self.emit(LinkEvent::Disconnected { port });
        }
    }

    fn send(&self, command: &DisplayCommand) -> bool {
        match self.try_send(command) {
            Ok(()) => true,
            Err(LinkError::NotConnected) => {
                debug!("Display não conectado, {} descartado", command.name());
                false
            }
            Err(e) => {
                warn!("⚠ Erro ao enviar {} ao display: {e}", command.name());
                false
            }
        }
    }

    fn try_send(&self, command: &DisplayCommand) -> Result<(), LinkError> {
        let line = protocol::encode_command(command, protocol::wall_clock_timestamp())?;

        let mut guard = self.connection.lock();
        let conn = guard.as_mut().ok_or(LinkError::NotConnected)?;
        if let Err(e) = conn.io.write_all(&line) {
            *guard = None;
            drop(guard);
            self.mark_lost(true);
            return Err(e.into());
        }
        drop(guard);

        debug!("➡ Display: {}", String::from_utf8_lossy(&line).trim_end());
        Ok(())
    }

    // ──────────────────────────────────────────
    // Loop de leitura
    // ──────────────────────────────────────────

    fn read_loop(&self) {
        info!("Loop de leitura do display iniciado");
        while self.running.load(Ordering::Relaxed) {
            self.poll_once();
            thread::sleep(self.config.poll_interval());
        }
        info!("Loop de leitura do display encerrado");
    }

    fn poll_once(&self) {
        match self.read_available() {
            Ok(Some(lines)) => {
                for line in lines {
                    self.handle_line(&line);
                }
            }
            Ok(None) => self.try_reconnect(),
            Err(e) => {
                warn!("⚠ Porta do display fechou: {e}");
                self.close_connection();
                self.try_reconnect();
            }
        }
    }

    /// `Ok(None)` = sem porta aberta. `Err` = porta caiu.
    fn read_available(&self) -> io::Result<Option<Vec<String>>> {
        let mut guard = self.connection.lock();
        let Some(conn) = guard.as_mut() else {
            return Ok(None);
        };

        let available = conn.io.bytes_to_read()?;
        if available == 0 {
            return Ok(Some(Vec::new()));
        }

        let mut buf = vec![0u8; available.min(READ_CHUNK)];
        match conn.io.read(&mut buf) {
            Ok(0) => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "porta fechada")),
            Ok(n) => Ok(Some(conn.lines.push(&buf[..n]))),
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(Some(Vec::new()))
            }
            Err(e) => Err(e),
        }
    }

    fn try_reconnect(&self) {
        let (auto_reconnect, port) = {
            let s = self.session.read();
            (s.auto_reconnect, s.port_name.clone())
        };
        if !auto_reconnect || !self.running.load(Ordering::Relaxed) {
            return;
        }

        match self.open_port(port.as_deref()) {
            Ok(Opened::Fresh(name)) => {
                info!("🔁 Reconectado ao display em {name}");
                self.handshake();
            }
            Ok(Opened::Existing(_)) => {}
            Err(e) => {
                if self.reconnect_failures.fetch_add(1, Ordering::Relaxed) == 0 {
                    warn!("🔁 Reconexão falhou, tentando a cada ciclo: {e}");
                } else {
                    debug!("Reconexão falhou: {e}");
                }
            }
        }
    }

    fn handle_line(&self, line: &str) {
        let message = match protocol::decode_inbound(line) {
            Ok(m) => m,
            Err(e) => {
                warn!("⚠ Mensagem inválida do display: {line} ({e})");
                return;
            }
        };

        debug!("⬅ Display: {line}");
        self.session.write().last_heartbeat = Utc::now();
        self.notify_observer(&message);

        if protocol::is_ready_signal(&message, &self.config.ready_tokens) {
            info!("🔗 Display pronto, atualizando tela");
            {
                let mut s = self.session.write();
                s.connected = true;
                s.peripheral_ready = true;
            }
            self.send(&DisplayCommand::display("Connected", "IoT Backend OK"));
        }
    }

    fn notify_observer(&self, message: &InboundMessage) {
        let callback = {
            let mut slot = self.observer.lock();
            let mut subscriber_gone = false;
            let callback = match slot.as_ref() {
                None => None,
                Some(Observer::Callback(cb)) => Some(Arc::clone(cb)),
                Some(Observer::Channel(tx)) => {
                    match tx.try_send(message.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => debug!("Channel cheio, descartando mensagem"),
                        Err(TrySendError::Disconnected(_)) => subscriber_gone = true,
                    }
                    None
                }
            };
            if subscriber_gone {
                debug!("Assinante do link saiu, removendo observador");
                *slot = None;
            }
            callback
        };

        // Fora do lock: o callback pode chamar o próprio manager
        if let Some(cb) = callback {
            cb(message);
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
