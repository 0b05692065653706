use anyhow::bail;
use rand::Rng;
use std::collections::HashSet;

/// Where count-based requests get their numbers from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberSource {
    /// Pre-provisioned rows earmarked for the user, deleted once handed out.
    Inventory,
    /// Freshly generated numbers, independent of any inventory.
    Synthetic,
}

impl NumberSource {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inventory" => Ok(NumberSource::Inventory),
            "synthetic" => Ok(NumberSource::Synthetic),
            other => bail!("Unsupported NUMBER_SOURCE: {}", other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NumberSource::Inventory => "inventory",
            NumberSource::Synthetic => "synthetic",
        }
    }
}

/// Produces `+<country><area><exchange><line>` numbers in NANP shape: area
/// code and exchange never start with 0 or 1.
#[derive(Debug, Clone)]
pub struct SyntheticNumbers {
    country_code: String,
}

impl SyntheticNumbers {
    pub fn new(country_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
        }
    }

    /// Numbers within one batch are distinct. Callers bound `count` well
    /// below the size of the number space.
    pub fn generate(&self, count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        let mut seen = HashSet::new();
        let mut numbers = Vec::new();

        while numbers.len() < count {
            let number = format!(
                "+{}{:03}{:03}{:04}",
                self.country_code,
                rng.gen_range(200..1000),
                rng.gen_range(200..1000),
                rng.gen_range(0..10000),
            );
            if seen.insert(number.clone()) {
                numbers.push(number);
            }
        }

        numbers
    }
}

/// Removes every `+` from a number.
pub fn strip_plus(number: &str) -> String {
    number.replace('+', "")
}
