//! Hosting cost estimates.
//!
//! A [`RateTable`] prices each database as an hourly instance rate plus a
//! per-GB storage rate. Monthly cost is hourly × 730 and the annual estimate
//! is the monthly total × 12.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    model::{DatabaseRecord, Provider},
    version::EngineFamily,
};

pub const HOURS_PER_MONTH: u32 = 730;
pub const MONTHS_PER_YEAR: u32 = 12;
const HOURLY_DP: u32 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    pub base_hourly: Decimal,
    pub storage_gb_hourly: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRule {
    #[serde(default)]
    pub provider: Option<Provider>,
    /// Engine family (`postgres`, `mysql`, `mssql`) or an exact engine name.
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    pub base_hourly: Decimal,
    /// Falls back to the table default when omitted.
    #[serde(default)]
    pub storage_gb_hourly: Option<Decimal>,
}

impl RateRule {
    fn matches(&self, record: &DatabaseRecord) -> bool {
        if self.provider.is_some_and(|provider| provider != record.provider) {
            return false;
        }
        if let Some(region) = &self.region
            && !region.eq_ignore_ascii_case(&record.region)
        {
            return false;
        }
        match &self.engine {
            None => true,
            Some(engine) => match engine.parse::<EngineFamily>() {
                Ok(family) => EngineFamily::classify(&record.engine) == Some(family),
                Err(_) => engine.eq_ignore_ascii_case(&record.engine),
            },
        }
    }

    fn specificity(&self) -> usize {
        [
            self.provider.is_some(),
            self.engine.is_some(),
            self.region.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    pub default: Rate,
    #[serde(default)]
    pub rates: Vec<RateRule>,
}

fn rule(provider: Provider, engine: &str, base_cents_per_hour: i64) -> RateRule {
    RateRule {
        provider: Some(provider),
        engine: Some(engine.to_string()),
        region: None,
        base_hourly: Decimal::new(base_cents_per_hour, 3),
        storage_gb_hourly: None,
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            default: Rate {
                base_hourly: Decimal::new(100, 3),
                storage_gb_hourly: Decimal::new(158, 6),
            },
            rates: vec![
                rule(Provider::Aws, "postgres", 120),
                rule(Provider::Aws, "mysql", 110),
                rule(Provider::Aws, "mssql", 480),
                rule(Provider::Azure, "postgres", 130),
                rule(Provider::Azure, "mysql", 120),
                rule(Provider::Azure, "mssql", 500),
            ],
        }
    }
}

impl RateTable {
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("Reading rate table {path:?}"))?;
        serde_yaml::from_str(&text).with_context(|| format!("Parsing rate table {path:?}"))
    }

    /// The most specific matching rule's rate; earlier rules win ties.
    pub fn rate_for(&self, record: &DatabaseRecord) -> Rate {
        let mut best: Option<&RateRule> = None;
        for candidate in self.rates.iter().filter(|rule| rule.matches(record)) {
            if best.is_none_or(|current| candidate.specificity() > current.specificity()) {
                best = Some(candidate);
            }
        }
        match best {
            Some(rule) => Rate {
                base_hourly: rule.base_hourly,
                storage_gb_hourly: rule
                    .storage_gb_hourly
                    .unwrap_or(self.default.storage_gb_hourly),
            },
            None => self.default.clone(),
        }
    }

    pub fn hourly_cost(&self, record: &DatabaseRecord) -> Decimal {
        let rate = self.rate_for(record);
        (rate.base_hourly + rate.storage_gb_hourly * Decimal::from(record.storage_gb))
            .round_dp(HOURLY_DP)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PricedDatabase<'a> {
    #[serde(flatten)]
    pub record: &'a DatabaseRecord,
    #[serde(with = "rust_decimal::serde::float")]
    pub hourly_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub monthly_cost: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricingSummary<'a> {
    pub databases: Vec<PricedDatabase<'a>>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_hourly: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_monthly: Decimal,
    pub count: usize,
}

impl PricingSummary<'_> {
    pub fn annual_estimate(&self) -> Decimal {
        self.total_monthly * Decimal::from(MONTHS_PER_YEAR)
    }
}

pub fn monthly_cost(hourly: Decimal) -> Decimal {
    hourly * Decimal::from(HOURS_PER_MONTH)
}

pub fn compute_pricing<'a, I>(records: I, rates: &RateTable) -> PricingSummary<'a>
where
    I: IntoIterator<Item = &'a DatabaseRecord>,
{
    let databases: Vec<PricedDatabase<'a>> = records
        .into_iter()
        .map(|record| {
            let hourly_cost = rates.hourly_cost(record);
            PricedDatabase {
                record,
                hourly_cost,
                monthly_cost: monthly_cost(hourly_cost),
            }
        })
        .collect();
    let total_hourly: Decimal = databases.iter().map(|priced| priced.hourly_cost).sum();
    let total_monthly: Decimal = databases.iter().map(|priced| priced.monthly_cost).sum();
    PricingSummary {
        count: databases.len(),
        databases,
        total_hourly,
        total_monthly,
    }
}
