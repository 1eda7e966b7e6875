use crate::domain::keys::TaxpayerId;
use crate::domain::model::RecognizedText;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 辨識結果中常見的誤讀字元；僅為預設值，可由設定覆寫
pub fn default_substitutions() -> BTreeMap<char, char> {
    [
        ('O', '0'),
        ('o', '0'),
        ('D', '0'),
        ('Q', '0'),
        ('I', '1'),
        ('l', '1'),
        ('Z', '2'),
        ('S', '5'),
        ('s', '5'),
        ('G', '6'),
        ('B', '8'),
        ('g', '9'),
    ]
    .into_iter()
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRules {
    pub min_confidence: f32,
    pub substitutions: BTreeMap<char, char>,
}

impl Default for CandidateRules {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            substitutions: default_substitutions(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaxpayerCandidate {
    pub taxpayer_id: TaxpayerId,
    pub confidence: f32,
    /// Whether a character substitution was needed to read it.
    pub corrected: bool,
}

pub struct CandidateSelector {
    rules: CandidateRules,
    pattern: Regex,
}

impl CandidateSelector {
    pub fn new(rules: CandidateRules) -> Self {
        // 11 個字元位置，允許 CPF 格式的分隔符號
        let pattern = Regex::new(r"\b\w{3}[.\s]?\w{3}[.\s]?\w{3}[-\s]?\w{2}\b")
            .expect("valid CPF token pattern");
        Self { rules, pattern }
    }

    pub fn rules(&self) -> &CandidateRules {
        &self.rules
    }

    /// Accepted taxpayer ids, highest confidence first, without duplicates.
    pub fn select(&self, recognized: &[RecognizedText]) -> Vec<TaxpayerCandidate> {
        let mut best: HashMap<TaxpayerId, TaxpayerCandidate> = HashMap::new();

        for line in recognized {
            if line.confidence < self.rules.min_confidence {
                tracing::debug!(
                    "Skipping OCR line '{}' (confidence {:.2})",
                    line.text,
                    line.confidence
                );
                continue;
            }

            for token in self.pattern.find_iter(&line.text) {
                let Some(candidate) = self.repair(token.as_str(), line.confidence) else {
                    continue;
                };
                match best.get(&candidate.taxpayer_id) {
                    Some(existing) if existing.confidence >= candidate.confidence => {}
                    _ => {
                        best.insert(candidate.taxpayer_id.clone(), candidate);
                    }
                }
            }
        }

        let mut selected: Vec<TaxpayerCandidate> = best.into_values().collect();
        selected.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.taxpayer_id.cmp(&b.taxpayer_id))
        });
        selected
    }

    fn repair(&self, token: &str, confidence: f32) -> Option<TaxpayerCandidate> {
        let mut corrected = false;
        let mut digits = String::with_capacity(11);

        for c in token.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if let Some(sub) = self.rules.substitutions.get(&c) {
                digits.push(*sub);
                corrected = true;
            } else if matches!(c, '.' | '-' | ' ') {
                continue;
            } else {
                return None;
            }
        }

        if digits.len() != 11 {
            return None;
        }
        let taxpayer_id = TaxpayerId::parse(&digits).ok()?;
        if !taxpayer_id.has_valid_check_digits() {
            tracing::debug!("Rejecting OCR token '{}': check digits do not match", token);
            return None;
        }

        Some(TaxpayerCandidate {
            taxpayer_id,
            confidence,
            corrected,
        })
    }
}
