//! Canonicalization of administrative codes to their 4-digit city form.
//!
//! Raw codes are 6-digit county-level codes. Flows are counted between
//! cities, so both endpoints are cut to the prefecture prefix and then run
//! through a fixed set of rewrites:
//!
//! * municipalities (Beijing, Tianjin, Shanghai, Chongqing) collapse every
//!   district onto `xx00`;
//! * `5424` (the former Nagqu prefecture) becomes `5406`;
//! * on the place side, a bare province code `xx00` points at its capital
//!   `xx01`, because a symbol such as "河北" resolves to `130000`.

use std::collections::HashMap;

/// Immutable rewrite tables used by [`CodeNormalizer`].
#[derive(Debug, Clone)]
pub struct NormalizerRules {
    /// Ordered `(prefix, replacement)` rules on the 4-digit code.
    pub municipality_prefixes: Vec<(String, String)>,
    /// Exact 4-digit rewrites applied after the prefix rules.
    pub exact_rewrites: Vec<(String, String)>,
    /// Province code `xx00` → provincial capital `xx01`, place side only.
    pub provincial_capitals: HashMap<String, String>,
    /// Exact 6-digit rewrites applied to raw place codes before truncation.
    pub place_code_rewrites: Vec<(String, String)>,
}

const CAPITAL_PROVINCES: [&str; 27] = [
    "13", "14", "15", "21", "22", "23", "32", "33", "34", "35", "36", "37", "41", "42", "43",
    "44", "45", "46", "51", "52", "53", "54", "61", "62", "63", "64", "65",
];

impl Default for NormalizerRules {
    fn default() -> Self {
        let pairs = |items: &[(&str, &str)]| -> Vec<(String, String)> {
            items
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect()
        };
        Self {
            municipality_prefixes: pairs(&[
                ("31", "3100"),
                ("11", "1100"),
                ("12", "1200"),
                ("50", "5000"),
            ]),
            exact_rewrites: pairs(&[("5424", "5406")]),
            provincial_capitals: CAPITAL_PROVINCES
                .iter()
                .map(|p| (format!("{p}00"), format!("{p}01")))
                .collect(),
            // Laiwu district was carved out of the former Laiwu city.
            place_code_rewrites: pairs(&[("370116", "371200")]),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CodeNormalizer {
    rules: NormalizerRules,
}

impl CodeNormalizer {
    pub fn new(rules: NormalizerRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &NormalizerRules {
        &self.rules
    }

    /// Normalize the POI's own administrative code.
    pub fn normalize_own(&self, raw: &str) -> String {
        self.apply_municipality(truncate4(raw))
    }

    /// Normalize a matched place code.
    ///
    /// The municipality pass runs both before and after the capital table.
    pub fn normalize_place(&self, raw: &str) -> String {
        let raw = raw.trim();
        let six: String = raw.chars().take(6).collect();
        let rewritten = self
            .rules
            .place_code_rewrites
            .iter()
            .find(|(from, _)| *from == six)
            .map(|(_, to)| to.as_str())
            .unwrap_or(raw);

        let code = self.apply_municipality(truncate4(rewritten));
        let code = self
            .rules
            .provincial_capitals
            .get(&code)
            .cloned()
            .unwrap_or(code);
        self.apply_municipality(code)
    }

    fn apply_municipality(&self, mut code: String) -> String {
        for (prefix, replacement) in &self.rules.municipality_prefixes {
            if code.chars().count() == 4 && code.starts_with(prefix.as_str()) {
                code = replacement.clone();
            }
        }
        for (from, to) in &self.rules.exact_rewrites {
            if code == *from {
                code = to.clone();
            }
        }
        code
    }
}

/// First four characters of a trimmed code string.
pub fn truncate4(raw: &str) -> String {
    raw.trim().chars().take(4).collect()
}
