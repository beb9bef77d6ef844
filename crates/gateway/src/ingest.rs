//! Ingestão de relatórios de telemetria (uma linha JSON por relatório).
//!
//! Relatório → upsert do dispositivo → classificação → relay.

use crate::store::{Store, StoreError};
use sentinel_core::config::GatewayConfig;
use sentinel_core::relay::{AlertNotifier, DeviceRef, DisplaySink, RelayError, UserRef};
use sentinel_core::{AlertRelay, DeviceContext, FeatureVector, RelayOutcome, Verdict, classify};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("JSON inválido: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Campos obrigatórios ausentes: user_id e device_id")]
    MissingFields,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Relatório enviado por um dispositivo.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryReport {
    #[serde(default)]
    pub user_id: UserRef,
    /// Id externo; aceita texto ou número, e `id` como alias.
    #[serde(default, alias = "id", deserialize_with = "external_id")]
    pub device_id: String,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(flatten)]
    pub features: FeatureVector,
}

fn external_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s.trim().to_string(),
        Raw::Number(n) => n.to_string(),
    })
}

impl TelemetryReport {
    pub fn parse(line: &str) -> Result<Self, IngestError> {
        let report: TelemetryReport = serde_json::from_str(line)?;
        if report.user_id == 0 || report.device_id.is_empty() {
            return Err(IngestError::MissingFields);
        }
        Ok(report)
    }

    fn name_or<'a>(&'a self, defaults: &'a GatewayConfig) -> &'a str {
        non_blank(self.device_name.as_deref()).unwrap_or(&defaults.default_device_name)
    }

    fn ip_or<'a>(&'a self, defaults: &'a GatewayConfig) -> &'a str {
        non_blank(self.ip_address.as_deref()).unwrap_or(&defaults.default_ip)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Resposta de um relatório processado.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub device_id: DeviceRef,
    #[serde(flatten)]
    pub verdict: Verdict,
    #[serde(flatten)]
    pub relay: RelayOutcome,
}

/// Serializa o resultado como uma linha JSON (`{"error": ...}` em falha).
pub fn render_response(result: &Result<IngestOutcome, IngestError>) -> String {
    let value = match result {
        Ok(outcome) => serde_json::to_value(outcome)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() })),
        Err(e) => serde_json::json!({ "error": e.to_string() }),
    };
    value.to_string()
}

pub struct Gateway<'a> {
    store: &'a Store,
    relay: AlertRelay<'a>,
    defaults: &'a GatewayConfig,
}

impl<'a> Gateway<'a> {
    pub fn new(
        store: &'a Store,
        notifier: &'a dyn AlertNotifier,
        display: &'a dyn DisplaySink,
        defaults: &'a GatewayConfig,
    ) -> Self {
        Self {
            store,
            relay: AlertRelay::new(store, notifier, display),
            defaults,
        }
    }

    pub fn process_line(&self, line: &str) -> Result<IngestOutcome, IngestError> {
        let report = TelemetryReport::parse(line)?;
        self.process(&report)
    }

    pub fn process(&self, report: &TelemetryReport) -> Result<IngestOutcome, IngestError> {
        let device_name = report.name_or(self.defaults);
        let ip_address = report.ip_or(self.defaults);

        let device_ref = self.store.upsert_device(
            report.user_id,
            &report.device_id,
            device_name,
            ip_address,
            &report.features,
        )?;

        let verdict = classify(&report.features);
        debug!(
            "{} ({}) → {} risk {}",
            report.device_id,
            device_name,
            verdict.attack_type(),
            verdict.risk_score()
        );

        let context = DeviceContext {
            user_ref: report.user_id,
            device_ref,
            device_name: device_name.to_string(),
            ip_address: ip_address.to_string(),
        };
        let relay = self.relay.dispatch(&context, &verdict)?;

        Ok(IngestOutcome {
            device_id: device_ref,
            verdict,
            relay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct FakeNotifier {
        sent: Cell<usize>,
    }

    impl AlertNotifier for FakeNotifier {
        fn send_attack_alert(&self, _device: &str, _verdict: &Verdict, _recs: &[&str]) -> bool {
            self.sent.set(self.sent.get() + 1);
            true
        }
    }

    #[derive(Default)]
    struct FakeDisplay {
        lines: RefCell<Vec<String>>,
    }

    impl DisplaySink for FakeDisplay {
        fn send_alert(&self, attack: &str, severity: &str) -> bool {
            self.lines.borrow_mut().push(format!("ALERT {attack} {severity}"));
            true
        }

        fn send_status(&self, device: &str, ip: &str) -> bool {
            self.lines.borrow_mut().push(format!("STATUS {device} {ip}"));
            false
        }
    }

    struct Fixture {
        store: Store,
        notifier: FakeNotifier,
        display: FakeDisplay,
        defaults: GatewayConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Store::open_in_memory().unwrap(),
                notifier: FakeNotifier::default(),
                display: FakeDisplay::default(),
                defaults: GatewayConfig::default(),
            }
        }

        fn gateway(&self) -> Gateway<'_> {
            Gateway::new(&self.store, &self.notifier, &self.display, &self.defaults)
        }
    }

    #[test]
    fn normal_report_updates_status_line() {
        let f = Fixture::new();
        let outcome = f
            .gateway()
            .process_line(r#"{"user_id": 1, "device_id": "cam-01", "device_name": "  "}"#)
            .unwrap();

        assert_eq!(outcome.verdict.attack_type().as_str(), "Normal");
        assert_eq!(outcome.relay.alert_id, None);
        assert!(!outcome.relay.displayed);
        assert_eq!(f.notifier.sent.get(), 0);
        assert_eq!(*f.display.lines.borrow(), vec!["STATUS IoT Device 0.0.0.0"]);

        let device = f.store.device(outcome.device_id).unwrap().unwrap();
        assert_eq!(device.device_name, "IoT Device");
        assert_eq!(device.status, "Normal");
    }

    #[test]
    fn attack_report_creates_sent_alert() {
        let f = Fixture::new();
        let line = r#"{"user_id": 2, "device_id": "cam-01", "device_name": "Camera",
                       "ip_address": "10.0.0.5", "rate": 6000, "synack": 250}"#;
        let outcome = f.gateway().process_line(line).unwrap();

        assert_eq!(outcome.verdict.risk_score(), 45);
        let alert_id = outcome.relay.alert_id.unwrap();
        assert!(outcome.relay.notified);
        assert!(outcome.relay.displayed);
        assert_eq!(f.notifier.sent.get(), 1);
        assert_eq!(*f.display.lines.borrow(), vec!["ALERT DDoS Critical"]);

        let alert = f.store.alert(alert_id).unwrap().unwrap();
        assert!(alert.email_sent);
        assert_eq!(alert.user_id, 2);
        assert_eq!(alert.device_id, outcome.device_id);
    }

    #[test]
    fn numeric_id_and_alias_are_accepted() {
        let report = TelemetryReport::parse(r#"{"user_id": 1, "device_id": 42}"#).unwrap();
        assert_eq!(report.device_id, "42");

        let report = TelemetryReport::parse(r#"{"user_id": 1, "id": "plug", "dmean": 0.9}"#).unwrap();
        assert_eq!(report.device_id, "plug");
        assert_eq!(report.features.dmean, 0.9);
    }

    #[test]
    fn missing_fields_are_rejected() {
        assert!(matches!(
            TelemetryReport::parse(r#"{"device_id": "cam-01"}"#),
            Err(IngestError::MissingFields)
        ));
        assert!(matches!(
            TelemetryReport::parse(r#"{"user_id": 1, "device_id": "  "}"#),
            Err(IngestError::MissingFields)
        ));
        assert!(matches!(TelemetryReport::parse("{oops"), Err(IngestError::Json(_))));
    }

    #[test]
    fn repeated_reports_reuse_the_device() {
        let f = Fixture::new();
        let gateway = f.gateway();
        let first = gateway
            .process_line(r#"{"user_id": 1, "device_id": "cam-01"}"#)
            .unwrap();
        let second = gateway
            .process_line(r#"{"user_id": 1, "device_id": "cam-01", "rate": 6000, "synack": 250}"#)
            .unwrap();

        assert_eq!(first.device_id, second.device_id);
        let detections = f.store.recent_detections(first.device_id, 10).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].attack_type, "DDoS");
    }

    #[test]
    fn response_lines() {
        let f = Fixture::new();
        let ok = f.gateway().process_line(r#"{"user_id": 1, "device_id": "cam-01"}"#);
        let value: serde_json::Value = serde_json::from_str(&render_response(&ok)).unwrap();
        assert_eq!(value["attack_type"], "Normal");
        assert_eq!(value["severity"], "Low");
        assert_eq!(value["risk_score"], 0);
        assert_eq!(value["alert_id"], serde_json::Value::Null);
        assert!(value["indicators"].is_array());

        let err = f.gateway().process_line("{}");
        let value: serde_json::Value = serde_json::from_str(&render_response(&err)).unwrap();
        assert!(value["error"].as_str().unwrap().contains("user_id"));
    }
}
