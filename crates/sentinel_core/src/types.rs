//! Tipos de detecção: vetor de features de tráfego e veredito.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ──────────────────────────────────────────────
// Feature vector
// ──────────────────────────────────────────────

/// Features de tráfego de um dispositivo (subconjunto UNSW-NB15).
///
/// Campos ausentes no relatório chegam como zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureVector {
    /// Bytes origem → destino
    pub sbytes: i64,
    /// Bytes destino → origem
    pub dbytes: i64,
    /// Pacotes por segundo
    pub rate: f64,
    /// Tempo entre pacotes no destino (ms)
    pub dinpkt: i64,
    /// Round-trip TCP (ms)
    pub tcprtt: f64,
    /// Tempo SYN → SYN-ACK (ms)
    pub synack: f64,
    /// Tempo SYN-ACK → ACK (ms)
    pub ackdat: f64,
    /// Média de tamanho/entropia na origem (0–1)
    pub smean: f64,
    /// Média de tamanho/entropia no destino (0–1)
    pub dmean: f64,
}

// ──────────────────────────────────────────────
// Severity
// ──────────────────────────────────────────────

/// Severidade de um ataque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Attack type
// ──────────────────────────────────────────────

/// Categoria de ataque reconhecida pelo classificador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackType {
    Normal,
    Malware,
    Phishing,
    #[serde(rename = "DoS")]
    DoS,
    #[serde(rename = "DDoS")]
    DDoS,
    #[serde(rename = "Man-in-the-Middle")]
    ManInTheMiddle,
    #[serde(rename = "SQL Injection")]
    SqlInjection,
    #[serde(rename = "Cross-Site Scripting")]
    CrossSiteScripting,
    #[serde(rename = "Social Engineering")]
    SocialEngineering,
    #[serde(rename = "Zero-Day Exploit")]
    ZeroDayExploit,
    #[serde(rename = "Insider Threat")]
    InsiderThreat,
    #[serde(rename = "Spoofing / Password Attack")]
    SpoofingPasswordAttack,
}

impl AttackType {
    pub const ALL: [AttackType; 12] = [
        AttackType::Normal,
        AttackType::Malware,
        AttackType::Phishing,
        AttackType::DoS,
        AttackType::DDoS,
        AttackType::ManInTheMiddle,
        AttackType::SqlInjection,
        AttackType::CrossSiteScripting,
        AttackType::SocialEngineering,
        AttackType::ZeroDayExploit,
        AttackType::InsiderThreat,
        AttackType::SpoofingPasswordAttack,
    ];

    /// Nome canônico (o mesmo gravado no banco e enviado ao display).
    pub fn as_str(self) -> &'static str {
        match self {
            AttackType::Normal => "Normal",
            AttackType::Malware => "Malware",
            AttackType::Phishing => "Phishing",
            AttackType::DoS => "DoS",
            AttackType::DDoS => "DDoS",
            AttackType::ManInTheMiddle => "Man-in-the-Middle",
            AttackType::SqlInjection => "SQL Injection",
            AttackType::CrossSiteScripting => "Cross-Site Scripting",
            AttackType::SocialEngineering => "Social Engineering",
            AttackType::ZeroDayExploit => "Zero-Day Exploit",
            AttackType::InsiderThreat => "Insider Threat",
            AttackType::SpoofingPasswordAttack => "Spoofing / Password Attack",
        }
    }

    /// Severidade fixa associada ao tipo de ataque.
    pub fn severity(self) -> Severity {
        match self {
            AttackType::DDoS | AttackType::ZeroDayExploit => Severity::Critical,
            AttackType::DoS
            | AttackType::Malware
            | AttackType::Phishing
            | AttackType::ManInTheMiddle
            | AttackType::InsiderThreat
            | AttackType::SpoofingPasswordAttack => Severity::High,
            AttackType::SqlInjection
            | AttackType::CrossSiteScripting
            | AttackType::SocialEngineering => Severity::Medium,
            AttackType::Normal => Severity::Low,
        }
    }

    pub fn is_normal(self) -> bool {
        self == AttackType::Normal
    }

    /// Busca pelo nome canônico exato (sem ignorar maiúsculas).
    pub fn from_canonical(name: &str) -> Option<AttackType> {
        AttackType::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

impl fmt::Display for AttackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nome de ataque desconhecido.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Tipo de ataque desconhecido: {0}")]
pub struct UnknownAttackType(pub String);

impl FromStr for AttackType {
    type Err = UnknownAttackType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        AttackType::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownAttackType(name.to_string()))
    }
}

// ──────────────────────────────────────────────
// Verdict
// ──────────────────────────────────────────────

/// Resultado da classificação.
///
/// A severidade é derivada do tipo de ataque na construção; os campos só
/// podem ser lidos, então os dois nunca divergem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    attack_type: AttackType,
    confidence: f64,
    severity: Severity,
    risk_score: u8,
    indicators: Vec<String>,
}

impl Verdict {
    pub fn new(
        attack_type: AttackType,
        confidence: f64,
        risk_score: u8,
        indicators: Vec<String>,
    ) -> Self {
        Self {
            attack_type,
            confidence,
            severity: attack_type.severity(),
            risk_score: risk_score.min(100),
            indicators,
        }
    }

    pub fn attack_type(&self) -> AttackType {
        self.attack_type
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn risk_score(&self) -> u8 {
        self.risk_score
    }

    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    pub fn is_attack(&self) -> bool {
        !self.attack_type.is_normal()
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
