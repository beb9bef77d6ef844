//! Relay de alertas – leva um [`Verdict`] até os destinos.
//!
//! Ataque: detecção → status do dispositivo → alerta → recomendações →
//! notificação → alerta marcado como enviado (só se a notificação passou) →
//! display. Tráfego normal: detecção → status → linha de status no display.
//!
//! Falha de persistência interrompe o relay e volta ao chamador. Falhas de
//! notificação e do display só aparecem no [`RelayOutcome`].

use crate::classifier::recommendations;
use crate::types::{AttackType, Severity, Verdict};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

pub type UserRef = i64;
pub type DeviceRef = i64;
pub type AlertRef = i64;

/// Erro reportado pela camada de persistência.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PersistenceError(pub String);

impl PersistenceError {
    pub fn new(err: impl fmt::Display) -> Self {
        Self(err.to_string())
    }
}

/// Erros do relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Falha de persistência: {0}")]
    Persistence(#[from] PersistenceError),
}

// ──────────────────────────────────────────────
// Colaboradores
// ──────────────────────────────────────────────

/// Armazenamento de detecções e alertas.
pub trait DetectionStore {
    fn record_detection(&self, device: DeviceRef, verdict: &Verdict) -> Result<i64, PersistenceError>;

    fn update_device_status(
        &self,
        device: DeviceRef,
        status: AttackType,
        connected: bool,
    ) -> Result<(), PersistenceError>;

    fn record_alert(
        &self,
        user: UserRef,
        device: DeviceRef,
        attack: AttackType,
        severity: Severity,
    ) -> Result<AlertRef, PersistenceError>;

    fn mark_alert_sent(&self, alert: AlertRef) -> Result<(), PersistenceError>;
}

/// Notificação externa de ataque. Retorna `true` se foi entregue.
pub trait AlertNotifier {
    fn send_attack_alert(&self, device_name: &str, verdict: &Verdict, recommendations: &[&str]) -> bool;
}

/// Display físico.
pub trait DisplaySink {
    fn send_alert(&self, attack: &str, severity: &str) -> bool;
    fn send_status(&self, device: &str, ip: &str) -> bool;
}

// ──────────────────────────────────────────────
// Relay
// ──────────────────────────────────────────────

/// Identidade do dispositivo que gerou a telemetria.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    pub user_ref: UserRef,
    pub device_ref: DeviceRef,
    pub device_name: String,
    pub ip_address: String,
}

/// O que aconteceu em cada destino.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayOutcome {
    pub detection_id: i64,
    pub alert_id: Option<AlertRef>,
    pub notified: bool,
    pub displayed: bool,
}

pub struct AlertRelay<'a> {
    store: &'a dyn DetectionStore,
    notifier: &'a dyn AlertNotifier,
    display: &'a dyn DisplaySink,
}

impl<'a> AlertRelay<'a> {
    pub fn new(
        store: &'a dyn DetectionStore,
        notifier: &'a dyn AlertNotifier,
        display: &'a dyn DisplaySink,
    ) -> Self {
        Self {
            store,
            notifier,
            display,
        }
    }

    pub fn dispatch(&self, device: &DeviceContext, verdict: &Verdict) -> Result<RelayOutcome, RelayError> {
        let detection_id = self.store.record_detection(device.device_ref, verdict)?;
        self.store
            .update_device_status(device.device_ref, verdict.attack_type(), true)?;

        if !verdict.is_attack() {
            let displayed = self.display.send_status(&device.device_name, &device.ip_address);
            debug!(
                "{} normal (risk {}), display: {}",
                device.device_name,
                verdict.risk_score(),
                displayed
            );
            return Ok(RelayOutcome {
                detection_id,
                alert_id: None,
                notified: false,
                displayed,
            });
        }

        let attack = verdict.attack_type();
        let severity = verdict.severity();
        let alert_id = self
            .store
            .record_alert(device.user_ref, device.device_ref, attack, severity)?;

        let recs = recommendations(attack);
        let notified = self.notifier.send_attack_alert(&device.device_name, verdict, recs);
        if notified {
            self.store.mark_alert_sent(alert_id)?;
        } else {
            warn!("Alerta #{alert_id} ({attack}) não foi notificado; fica pendente");
        }

        let displayed = self.display.send_alert(attack.as_str(), severity.as_str());
        info!(
            "⚠ {} em {} (severidade {}, risk {}) – alerta #{}, notificado: {}, display: {}",
            attack,
            device.device_name,
            severity,
            verdict.risk_score(),
            alert_id,
            notified,
            displayed
        );

        Ok(RelayOutcome {
            detection_id,
            alert_id: Some(alert_id),
            notified,
            displayed,
        })
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
