//! Notificação de ataques via webhook (ntfy e/ou Discord).

use sentinel_core::config::NotifierConfig;
use sentinel_core::relay::AlertNotifier;
use sentinel_core::{Severity, Verdict};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Falha HTTP em {target}: {message}")]
    Http { target: &'static str, message: String },
}

/// Alerta pronto para envio.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub title: String,
    pub body: String,
    pub priority: &'static str,
}

/// Monta título e corpo do alerta.
pub fn render_alert(device_name: &str, verdict: &Verdict, recommendations: &[&str]) -> AlertMessage {
    let attack = verdict.attack_type();
    let mut body = format!(
        "Device: {device_name}\nAttack type: {attack}\nSeverity: {}\nRisk score: {}/100\nConfidence: {:.0}%\n",
        verdict.severity(),
        verdict.risk_score(),
        verdict.confidence() * 100.0,
    );

    if !verdict.indicators().is_empty() {
        body.push_str("\nIndicators:\n");
        for indicator in verdict.indicators() {
            body.push_str(&format!("- {indicator}\n"));
        }
    }
    if !recommendations.is_empty() {
        body.push_str("\nRecommended actions:\n");
        for rec in recommendations {
            body.push_str(&format!("- {rec}\n"));
        }
    }

    AlertMessage {
        title: format!("IoT Security Alert: {attack} detected on {device_name}"),
        body,
        priority: ntfy_priority(verdict.severity()),
    }
}

fn ntfy_priority(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "urgent",
        Severity::High => "high",
        Severity::Medium => "default",
        Severity::Low => "low",
    }
}

/// Cabeçalhos HTTP só aceitam ASCII visível.
fn header_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '?' })
        .collect()
}

pub struct WebhookNotifier {
    config: NotifierConfig,
    agent: ureq::Agent,
}

impl WebhookNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build();
        Self { config, agent }
    }

    fn ntfy_url(&self) -> Option<String> {
        let topic = self.config.ntfy_topic.trim();
        if topic.is_empty() {
            return None;
        }
        Some(format!("{}/{}", self.config.ntfy_server.trim_end_matches('/'), topic))
    }

    fn post_ntfy(&self, url: &str, message: &AlertMessage) -> Result<(), NotifyError> {
        self.agent
            .post(url)
            .set("Title", &header_safe(&message.title))
            .set("Priority", message.priority)
            .set("Tags", "warning,rotating_light")
            .send_string(&message.body)
            .map_err(|e| NotifyError::Http {
                target: "ntfy",
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn post_discord(&self, url: &str, message: &AlertMessage) -> Result<(), NotifyError> {
        let content = format!("**{}**\n{}", message.title, message.body);
        self.agent
            .post(url)
            .send_json(serde_json::json!({ "content": content }))
            .map_err(|e| NotifyError::Http {
                target: "discord",
                message: e.to_string(),
            })?;
        Ok(())
    }
}

impl AlertNotifier for WebhookNotifier {
    fn send_attack_alert(&self, device_name: &str, verdict: &Verdict, recommendations: &[&str]) -> bool {
        if !self.config.enabled {
            warn!("Notificações desabilitadas, alerta de {device_name} não enviado");
            return false;
        }
        if !self.config.has_targets() {
            warn!("Notificações sem destino configurado, alerta de {device_name} não enviado");
            return false;
        }

        let message = render_alert(device_name, verdict, recommendations);
        let mut delivered = false;

        if let Some(url) = self.ntfy_url() {
            match self.post_ntfy(&url, &message) {
                Ok(()) => {
                    info!("📨 Alerta enviado ao ntfy ({})", self.config.ntfy_topic);
                    delivered = true;
                }
                Err(e) => warn!("{e}"),
            }
        }

        let discord = self.config.discord_webhook_url.trim();
        if !discord.is_empty() {
            match self.post_discord(discord, &message) {
                Ok(()) => {
                    info!("📨 Alerta enviado ao Discord");
                    delivered = true;
                }
                Err(e) => warn!("{e}"),
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{FeatureVector, classify, recommendations};
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    fn ddos() -> Verdict {
        classify(&FeatureVector {
            rate: 6000.0,
            synack: 250.0,
            ..Default::default()
        })
    }

    /// Servidor HTTP de uma requisição só. Devolve a URL base e a requisição crua.
    fn serve_once(status: u16) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let response =
                format!("HTTP/1.1 {status} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            stream.write_all(response.as_bytes()).unwrap();
            tx.send(request).unwrap();
        });
        (format!("http://{addr}"), rx)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&data);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    fn enabled(ntfy_server: &str, topic: &str, discord: &str) -> NotifierConfig {
        NotifierConfig {
            enabled: true,
            ntfy_server: ntfy_server.into(),
            ntfy_topic: topic.into(),
            discord_webhook_url: discord.into(),
            timeout_secs: 2,
        }
    }

    #[test]
    fn render_includes_indicators_and_recommendations() {
        let verdict = ddos();
        let message = render_alert("Camera", &verdict, recommendations(verdict.attack_type()));

        assert_eq!(message.title, "IoT Security Alert: DDoS detected on Camera");
        assert_eq!(message.priority, "urgent");
        assert!(message.body.contains("Severity: Critical"));
        assert!(message.body.contains("Risk score: 45/100"));
        assert!(message.body.contains("Confidence: 95%"));
        for indicator in verdict.indicators() {
            assert!(message.body.contains(indicator.as_str()));
        }
        assert!(message.body.contains("Recommended actions:"));
    }

    #[test]
    fn header_safe_replaces_non_ascii() {
        assert_eq!(header_safe("Câmera Sala"), "C?mera Sala");
        assert_eq!(header_safe("plain"), "plain");
    }

    #[test]
    fn disabled_or_unconfigured_returns_false() {
        let notifier = WebhookNotifier::new(NotifierConfig::default());
        assert!(!notifier.send_attack_alert("Camera", &ddos(), &[]));

        let notifier = WebhookNotifier::new(enabled("https://ntfy.sh", " ", ""));
        assert!(!notifier.send_attack_alert("Camera", &ddos(), &[]));
    }

    #[test]
    fn ntfy_post_carries_headers_and_body() {
        let (base, rx) = serve_once(200);
        let notifier = WebhookNotifier::new(enabled(&format!("{base}/"), "casa", ""));

        assert!(notifier.send_attack_alert("Camera", &ddos(), &["Block source IPs"]));
        let request = rx.recv().unwrap();
        assert!(request.starts_with("POST /casa "), "{request}");
        let lower = request.to_lowercase();
        assert!(lower.contains("title: iot security alert: ddos detected on camera"));
        assert!(lower.contains("priority: urgent"));
        assert!(request.contains("- Block source IPs"));
    }

    #[test]
    fn discord_post_sends_json_content() {
        let (base, rx) = serve_once(204);
        let notifier = WebhookNotifier::new(enabled("https://ntfy.sh", "", &format!("{base}/hook")));

        assert!(notifier.send_attack_alert("Camera", &ddos(), &[]));
        let request = rx.recv().unwrap();
        assert!(request.starts_with("POST /hook "));
        assert!(request.contains("\"content\":\"**IoT Security Alert: DDoS detected on Camera**"));
    }

    #[test]
    fn server_error_is_not_delivered() {
        let (base, rx) = serve_once(500);
        let notifier = WebhookNotifier::new(enabled(&base, "casa", ""));

        assert!(!notifier.send_attack_alert("Camera", &ddos(), &[]));
        assert!(rx.recv().is_ok());
    }
}
