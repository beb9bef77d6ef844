//! Classificador de ataques baseado em regras fixas.
//!
//! Duas etapas independentes sobre o mesmo [`FeatureVector`]:
//!
//! 1. **Risk score** – 9 checagens de threshold, todas avaliadas; cada uma que
//!    dispara soma seu peso e registra um indicador. Soma limitada a 0–100.
//! 2. **Tipo de ataque** – tabela ordenada de predicados compostos; vence o
//!    primeiro que casar. A ordem da tabela faz parte do contrato.
//!
//! Todas as comparações são estritas (`>` / `<`).

use crate::types::{AttackType, FeatureVector, Verdict};

// ──────────────────────────────────────────────
// Thresholds
// ──────────────────────────────────────────────

pub const RATE_THRESHOLD: f64 = 5000.0;
pub const SYNACK_THRESHOLD: f64 = 200.0;
pub const TCPRTT_THRESHOLD: f64 = 1500.0;
pub const DINPKT_THRESHOLD: i64 = 800;
pub const SBYTES_THRESHOLD: i64 = 90_000;
pub const DBYTES_THRESHOLD: i64 = 1000;
pub const DMEAN_THRESHOLD: f64 = 0.7;
pub const SMEAN_THRESHOLD: f64 = 0.3;
pub const ACKDAT_THRESHOLD: f64 = 500.0;

/// Confiança do veredito `Normal`.
pub const NORMAL_CONFIDENCE: f64 = 0.98;

/// Indicadores usados quando nenhum threshold disparou.
pub const NORMAL_INDICATORS: [&str; 2] = ["Normal traffic pattern", "No malicious indicators detected"];

const MAX_RISK: u32 = 100;

// ──────────────────────────────────────────────
// Risk score
// ──────────────────────────────────────────────

/// Uma checagem de threshold que contribui para o risk score.
struct ThresholdCheck {
    weight: u32,
    indicator: &'static str,
    fires: fn(&FeatureVector) -> bool,
}

const THRESHOLD_CHECKS: [ThresholdCheck; 9] = [
    ThresholdCheck {
        weight: 25,
        indicator: "High traffic rate detected",
        fires: |v| v.rate > RATE_THRESHOLD,
    },
    ThresholdCheck {
        weight: 20,
        indicator: "Multiple SYN-ACK packets",
        fires: |v| v.synack > SYNACK_THRESHOLD,
    },
    ThresholdCheck {
        weight: 15,
        indicator: "High TCP round-trip time",
        fires: |v| v.tcprtt > TCPRTT_THRESHOLD,
    },
    ThresholdCheck {
        weight: 15,
        indicator: "High destination input packets",
        fires: |v| v.dinpkt > DINPKT_THRESHOLD,
    },
    ThresholdCheck {
        weight: 20,
        indicator: "Abnormally high source bytes",
        fires: |v| v.sbytes > SBYTES_THRESHOLD,
    },
    ThresholdCheck {
        weight: 10,
        indicator: "Minimal response from destination",
        fires: |v| v.dbytes < DBYTES_THRESHOLD && v.sbytes > 50_000,
    },
    ThresholdCheck {
        weight: 10,
        indicator: "Destination entropy high",
        fires: |v| v.dmean > DMEAN_THRESHOLD,
    },
    ThresholdCheck {
        weight: 10,
        indicator: "Source entropy anomaly",
        fires: |v| v.smean < SMEAN_THRESHOLD && v.dmean > 0.5,
    },
    ThresholdCheck {
        weight: 15,
        indicator: "High ACK-DAT packets detected",
        fires: |v| v.ackdat > ACKDAT_THRESHOLD,
    },
];

/// Calcula o risk score (0–100) e os indicadores dos thresholds disparados,
/// na ordem das checagens.
pub fn risk_assessment(v: &FeatureVector) -> (u8, Vec<String>) {
    let mut score = 0u32;
    let mut indicators = Vec::new();

    for check in &THRESHOLD_CHECKS {
        if (check.fires)(v) {
            score += check.weight;
            indicators.push(check.indicator.to_string());
        }
    }

    (score.min(MAX_RISK) as u8, indicators)
}

// ──────────────────────────────────────────────
// Regras de tipo de ataque
// ──────────────────────────────────────────────

/// Predicado composto e o resultado que ele produz.
pub struct AttackRule {
    pub attack: AttackType,
    pub confidence: f64,
    pub indicator: &'static str,
    pub matches: fn(&FeatureVector) -> bool,
}

/// Regras na ordem de avaliação. DDoS precede DoS, etc.
pub const ATTACK_RULES: [AttackRule; 11] = [
    AttackRule {
        attack: AttackType::DDoS,
        confidence: 0.95,
        indicator: "Distributed attack pattern",
        matches: |v| v.rate > 5000.0 && v.synack > 200.0,
    },
    AttackRule {
        attack: AttackType::DoS,
        confidence: 0.92,
        indicator: "Congestion pattern detected",
        matches: |v| v.tcprtt > 1500.0 && v.dinpkt > 800,
    },
    AttackRule {
        attack: AttackType::Malware,
        confidence: 0.88,
        indicator: "Possible data exfiltration",
        matches: |v| v.sbytes > 90_000 && v.dbytes < 1000,
    },
    AttackRule {
        attack: AttackType::Phishing,
        confidence: 0.85,
        indicator: "Credential harvesting pattern",
        matches: |v| v.dmean > 0.7 && v.smean < 0.3,
    },
    AttackRule {
        attack: AttackType::ManInTheMiddle,
        confidence: 0.82,
        indicator: "Possible session hijacking",
        matches: |v| v.ackdat > 500.0 && v.synack < 50.0 && v.rate > 3000.0,
    },
    AttackRule {
        attack: AttackType::SqlInjection,
        confidence: 0.79,
        indicator: "Database query manipulation",
        matches: |v| v.dinpkt > 1000 && v.tcprtt < 100.0 && v.rate > 4000.0,
    },
    AttackRule {
        attack: AttackType::CrossSiteScripting,
        confidence: 0.76,
        indicator: "Script injection pattern",
        matches: |v| v.smean > 0.8 && v.dmean > 0.8 && v.sbytes > 50_000,
    },
    AttackRule {
        attack: AttackType::SocialEngineering,
        confidence: 0.73,
        indicator: "Possible human interaction attack",
        matches: |v| v.rate < 100.0 && v.tcprtt > 2000.0,
    },
    AttackRule {
        attack: AttackType::ZeroDayExploit,
        confidence: 0.89,
        indicator: "Unknown vulnerability pattern",
        matches: |v| v.sbytes > 100_000 && v.rate > 6000.0 && v.synack > 300.0,
    },
    AttackRule {
        attack: AttackType::InsiderThreat,
        confidence: 0.81,
        indicator: "Internal actor behavior",
        matches: |v| v.dmean < 0.2 && v.smean > 0.9 && v.ackdat > 300.0,
    },
    AttackRule {
        attack: AttackType::SpoofingPasswordAttack,
        confidence: 0.84,
        indicator: "Brute force attempt pattern",
        matches: |v| v.synack > 400.0 || (v.rate > 2000.0 && v.tcprtt < 50.0),
    },
];

/// Classifica um vetor de features. Função total e determinística.
pub fn classify(v: &FeatureVector) -> Verdict {
    let (risk_score, mut indicators) = risk_assessment(v);

    if let Some(rule) = ATTACK_RULES.iter().find(|rule| (rule.matches)(v)) {
        indicators.push(rule.indicator.to_string());
        return Verdict::new(rule.attack, rule.confidence, risk_score, indicators);
    }

    // Indicadores de thresholds são preservados mesmo caindo em Normal
    if indicators.is_empty() {
        indicators = NORMAL_INDICATORS.iter().map(|s| s.to_string()).collect();
    }
    Verdict::new(AttackType::Normal, NORMAL_CONFIDENCE, risk_score, indicators)
}

// ──────────────────────────────────────────────
// Recomendações
// ──────────────────────────────────────────────

/// Recomendações para nomes de ataque não reconhecidos.
pub const DEFAULT_RECOMMENDATIONS: &[&str] = &["Review security policies", "Monitor device activity"];

/// Ações recomendadas para um tipo de ataque.
pub fn recommendations(attack: AttackType) -> &'static [&'static str] {
    match attack {
        AttackType::Normal => &["Monitor regularly", "Continue normal operations"],
        AttackType::Malware => &[
            "Run antivirus scan immediately",
            "Isolate device from network",
            "Check for unauthorized software",
            "Review recent file modifications",
        ],
        AttackType::Phishing => &[
            "Review recent communications",
            "Change passwords immediately",
            "Enable two-factor authentication",
            "Check email forwarding rules",
        ],
        AttackType::DoS => &[
            "Block suspicious source IPs",
            "Increase bandwidth capacity",
            "Enable rate limiting",
            "Contact ISP for mitigation",
        ],
        AttackType::DDoS => &[
            "Activate DDoS protection service",
            "Contact ISP immediately",
            "Enable traffic filtering",
            "Implement geo-blocking if needed",
        ],
        AttackType::ManInTheMiddle => &[
            "Verify SSL certificates",
            "Update encryption protocols",
            "Check network integrity",
            "Audit VPN connections",
        ],
        AttackType::SqlInjection => &[
            "Patch application immediately",
            "Review database access logs",
            "Implement parameterized queries",
            "Enable SQL query monitoring",
        ],
        AttackType::CrossSiteScripting => &[
            "Sanitize all user inputs",
            "Update security headers",
            "Patch vulnerabilities",
            "Run security audit",
        ],
        AttackType::SocialEngineering => &[
            "Train users on security",
            "Review access logs",
            "Implement additional verification",
            "Audit permission changes",
        ],
        AttackType::ZeroDayExploit => &[
            "Isolate system immediately",
            "Contact vendor for patches",
            "Monitor for further activity",
            "Document incident thoroughly",
        ],
        AttackType::InsiderThreat => &[
            "Review access logs",
            "Audit user permissions",
            "Investigate activity",
            "Implement additional monitoring",
        ],
        AttackType::SpoofingPasswordAttack => &[
            "Force password reset for all users",
            "Enable multi-factor authentication",
            "Review authentication logs",
            "Check for compromised credentials",
        ],
    }
}

/// Recomendações a partir do nome canônico exato (par padrão se desconhecido).
pub fn recommendations_for(name: &str) -> &'static [&'static str] {
    match AttackType::from_canonical(name) {
        Some(attack) => recommendations(attack),
        None => DEFAULT_RECOMMENDATIONS,
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    fn all_checks_firing() -> FeatureVector {
        FeatureVector {
            rate: 6000.0,
            synack: 250.0,
            tcprtt: 2000.0,
            dinpkt: 900,
            sbytes: 95_000,
            dbytes: 10,
            dmean: 0.8,
            smean: 0.1,
            ackdat: 600.0,
        }
    }

    #[test]
    fn zero_vector_is_normal() {
        let verdict = classify(&FeatureVector::default());
        assert_eq!(verdict.attack_type(), AttackType::Normal);
        assert_eq!(verdict.risk_score(), 0);
        assert_eq!(verdict.confidence(), 0.98);
        assert_eq!(verdict.severity(), Severity::Low);
        assert_eq!(
            verdict.indicators(),
            ["Normal traffic pattern", "No malicious indicators detected"]
        );
    }

    #[test]
    fn rate_and_synack_classify_as_ddos() {
        let v = FeatureVector {
            rate: 6000.0,
            synack: 250.0,
            ..Default::default()
        };
        let verdict = classify(&v);
        assert_eq!(verdict.attack_type(), AttackType::DDoS);
        assert_eq!(verdict.risk_score(), 45);
        assert_eq!(verdict.confidence(), 0.95);
        assert_eq!(verdict.severity(), Severity::Critical);
        assert_eq!(
            verdict.indicators(),
            [
                "High traffic rate detected",
                "Multiple SYN-ACK packets",
                "Distributed attack pattern"
            ]
        );
    }

    #[test]
    fn ddos_wins_over_dos() {
        let v = FeatureVector {
            rate: 6000.0,
            synack: 250.0,
            tcprtt: 2000.0,
            dinpkt: 900,
            ..Default::default()
        };
        assert_eq!(classify(&v).attack_type(), AttackType::DDoS);

        let dos_only = FeatureVector {
            tcprtt: 2000.0,
            dinpkt: 900,
            rate: 500.0,
            ..Default::default()
        };
        assert_eq!(classify(&dos_only).attack_type(), AttackType::DoS);
    }

    #[test]
    fn all_checks_clamp_to_100() {
        let (score, indicators) = risk_assessment(&all_checks_firing());
        assert_eq!(indicators.len(), 9);
        assert_eq!(score, 100);
        assert_eq!(classify(&all_checks_firing()).risk_score(), 100);
    }

    #[test]
    fn thresholds_are_strict() {
        let at_boundary = FeatureVector {
            rate: 5000.0,
            synack: 200.0,
            tcprtt: 1500.0,
            dinpkt: 800,
            sbytes: 90_000,
            dbytes: 1000,
            dmean: 0.7,
            smean: 0.3,
            ackdat: 500.0,
        };
        let (score, indicators) = risk_assessment(&at_boundary);
        assert_eq!(score, 0, "indicadores inesperados: {indicators:?}");
    }

    #[test]
    fn risk_is_monotonic_per_field() {
        let base = FeatureVector::default();
        let mut last = 0;
        for rate in [0.0, 4999.0, 5000.0, 5001.0, 10_000.0, 1e9] {
            let (score, _) = risk_assessment(&FeatureVector { rate, ..base });
            assert!(score >= last);
            last = score;
        }
        let mut last = 0;
        for ackdat in [0.0, 500.0, 500.5, 5000.0] {
            let (score, _) = risk_assessment(&FeatureVector { ackdat, ..base });
            assert!(score >= last);
            last = score;
        }
    }

    #[test]
    fn threshold_indicators_survive_normal_fallthrough() {
        // dmean alto sozinho: dispara threshold mas nenhuma regra
        let v = FeatureVector {
            dmean: 0.75,
            smean: 0.5,
            ..Default::default()
        };
        let verdict = classify(&v);
        assert_eq!(verdict.attack_type(), AttackType::Normal);
        assert_eq!(verdict.risk_score(), 10);
        assert_eq!(verdict.indicators(), ["Destination entropy high"]);
    }

    #[test]
    fn each_rule_is_reachable() {
        let cases = [
            (
                FeatureVector { sbytes: 95_000, dbytes: 10, rate: 500.0, ..Default::default() },
                AttackType::Malware,
            ),
            (
                FeatureVector { dmean: 0.8, smean: 0.1, rate: 500.0, ..Default::default() },
                AttackType::Phishing,
            ),
            (
                FeatureVector { ackdat: 600.0, synack: 10.0, rate: 3500.0, tcprtt: 200.0, ..Default::default() },
                AttackType::ManInTheMiddle,
            ),
            (
                FeatureVector { dinpkt: 1200, tcprtt: 60.0, rate: 4500.0, ..Default::default() },
                AttackType::SqlInjection,
            ),
            (
                FeatureVector { smean: 0.9, dmean: 0.9, sbytes: 60_000, dbytes: 5000, rate: 500.0, ..Default::default() },
                AttackType::CrossSiteScripting,
            ),
            (
                FeatureVector { rate: 50.0, tcprtt: 2500.0, ..Default::default() },
                AttackType::SocialEngineering,
            ),
            (
                FeatureVector { dmean: 0.1, smean: 0.95, ackdat: 350.0, rate: 500.0, ..Default::default() },
                AttackType::InsiderThreat,
            ),
            (
                FeatureVector { synack: 450.0, rate: 500.0, ..Default::default() },
                AttackType::SpoofingPasswordAttack,
            ),
            (
                FeatureVector { rate: 2500.0, tcprtt: 10.0, ..Default::default() },
                AttackType::SpoofingPasswordAttack,
            ),
        ];

        for (v, expected) in cases {
            let verdict = classify(&v);
            assert_eq!(verdict.attack_type(), expected, "vetor: {v:?}");
            assert_eq!(verdict.severity(), expected.severity());
        }
    }

    #[test]
    fn zero_day_is_shadowed_by_ddos() {
        // Qualquer vetor de Zero-Day também satisfaz DDoS, que vem antes
        let v = FeatureVector {
            sbytes: 150_000,
            rate: 7000.0,
            synack: 350.0,
            ..Default::default()
        };
        assert_eq!(classify(&v).attack_type(), AttackType::DDoS);
    }

    #[test]
    fn severity_always_matches_attack_type() {
        let samples = [
            FeatureVector::default(),
            all_checks_firing(),
            FeatureVector { synack: 450.0, ..Default::default() },
            FeatureVector { rate: 50.0, tcprtt: 2500.0, ..Default::default() },
        ];
        for v in samples {
            let verdict = classify(&v);
            assert_eq!(verdict.severity(), verdict.attack_type().severity());
        }
    }

    #[test]
    fn odd_inputs_never_panic() {
        let v = FeatureVector {
            sbytes: i64::MIN,
            dbytes: i64::MAX,
            rate: f64::NAN,
            tcprtt: f64::INFINITY,
            synack: -1.0,
            ..Default::default()
        };
        let verdict = classify(&v);
        assert!(verdict.risk_score() <= 100);
    }

    #[test]
    fn recommendations_lookup() {
        assert_eq!(recommendations(AttackType::DDoS)[0], "Activate DDoS protection service");
        assert_eq!(recommendations(AttackType::Normal).len(), 2);
        for attack in AttackType::ALL {
            assert!(!recommendations(attack).is_empty());
        }
        assert_eq!(recommendations_for("Ransomware"), DEFAULT_RECOMMENDATIONS);
        assert_eq!(recommendations_for("Malware"), recommendations(AttackType::Malware));
    }

    #[test]
    fn recommendations_by_name_are_case_sensitive() {
        assert_eq!(recommendations_for("DDoS"), recommendations(AttackType::DDoS));
        assert_eq!(recommendations_for("ddos"), DEFAULT_RECOMMENDATIONS);
        assert_eq!(recommendations_for("sql injection"), DEFAULT_RECOMMENDATIONS);
        assert_eq!(
            recommendations_for("Spoofing / Password Attack"),
            recommendations(AttackType::SpoofingPasswordAttack)
        );
    }
}
