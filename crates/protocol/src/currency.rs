//! Numeric currency codes used by the remote service, mapped to ISO 4217.

use std::collections::BTreeMap;

/// Immutable code → ISO-4217 lookup.
///
/// Built once (usually [`CurrencyTable::standard`]) and shared by reference
/// between a client and every response it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyTable {
    codes: BTreeMap<u32, String>,
}

const STANDARD: [(u32, &str); 21] = [
    (1, "EUR"),
    (2, "GBP"),
    (3, "CHF"),
    (4, "USD"),
    (5, "ZAR"),
    (6, "AUD"),
    (7, "CAD"),
    (8, "PLN"),
    (9, "CZK"),
    (10, "CNY"),
    (11, "HUF"),
    (12, "BRL"),
    (13, "RON"),
    (14, "CVE"),
    (15, "DKK"),
    (16, "SEK"),
    (17, "INR"),
    (18, "RUB"),
    (20, "HRK"),
    (22, "MXN"),
    (25, "NOK"),
];

impl CurrencyTable {
    /// The table of codes the service currently documents.
    pub fn standard() -> Self {
        Self::from_pairs(STANDARD.iter().map(|&(code, iso)| (code, iso)))
    }

    /// Builds a custom table, e.g. for a service version with more codes.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        Self {
            codes: pairs.into_iter().map(|(c, iso)| (c, iso.into())).collect(),
        }
    }

    /// Returns the ISO code for a numeric currency code.
    pub fn iso_code(&self, code: u32) -> Option<&str> {
        self.codes.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for CurrencyTable {
    fn default() -> Self {
        Self::standard()
    }
}
