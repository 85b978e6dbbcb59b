//! Refresher configuration.

use kurs_common::{CommonError, Currency};
use kurs_fx::{
    AggregatorConfig, CentralBankConfig, CommercialBankConfig, RefreshConfig, ResolverConfig,
};

/// Main refresher configuration.
#[derive(Debug, Clone)]
pub struct RefresherConfig {
    /// Database URL.
    pub database_url: String,
    /// Connection pool size.
    pub max_connections: u32,
    /// Currencies refreshed against the pivot.
    pub currencies: Vec<Currency>,
    pub central_bank: CentralBankConfig,
    pub commercial_bank: CommercialBankConfig,
    pub aggregator: AggregatorConfig,
    pub resolver: ResolverConfig,
    pub refresh: RefreshConfig,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/kurs".to_string(),
            max_connections: 5,
            currencies: vec![
                Currency::usd(),
                Currency::eur(),
                Currency::gbp(),
                Currency::pln(),
            ],
            central_bank: CentralBankConfig::default(),
            commercial_bank: CommercialBankConfig::default(),
            aggregator: AggregatorConfig::default(),
            resolver: ResolverConfig::default(),
            refresh: RefreshConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl RefresherConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from any variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(url) = var("DATABASE_URL") {
            config.database_url = url;
        }

        if let Some(size) = var("KURS_DB_MAX_CONNECTIONS") {
            if let Ok(size) = size.parse() {
                config.max_connections = size;
            }
        }

        config.resolver = ResolverConfig::from_vars(&var)?;
        config.refresh = RefreshConfig::from_vars(&var)?;

        // Providers publish in the pivot and share the fetch timeout.
        let pivot = config.refresh.pivot.clone();
        config.central_bank.home_currency = pivot.clone();
        config.commercial_bank.home_currency = pivot;

        let timeout = config.refresh.fetch_timeout;
        config.central_bank.timeout = timeout;
        config.commercial_bank.timeout = timeout;
        config.aggregator.timeout = timeout;

        if let Some(list) = var("KURS_CURRENCIES") {
            config.currencies = parse_currency_list(&list).map_err(|e| e.to_string())?;
        }

        if let Some(url) = var("KURS_CENTRAL_BANK_URL") {
            config.central_bank.url = url;
        }

        if let Some(url) = var("KURS_COMMERCIAL_BANK_URL") {
            config.commercial_bank.url = url;
        }

        if let Some(url) = var("KURS_AGGREGATOR_URL") {
            config.aggregator.url = url;
        }

        if let Some(key) = var("KURS_AGGREGATOR_API_KEY") {
            config.aggregator.api_key = Some(key);
        }

        if let Some(level) = var("LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.max_connections == 0 {
            return Err("Connection pool size cannot be 0".to_string());
        }

        if self.currencies.is_empty() {
            return Err("At least one currency must be configured".to_string());
        }

        if self.resolver.pivot != self.refresh.pivot {
            return Err("Resolver and refresh pivots differ".to_string());
        }

        self.resolver.validate()?;
        self.refresh.validate()
    }
}

/// Parse a comma-separated list such as `USD, eur,GBP`.
pub fn parse_currency_list(list: &str) -> Result<Vec<Currency>, CommonError> {
    let mut currencies = Vec::new();
    for code in list.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let currency = Currency::parse(code)?;
        if !currencies.contains(&currency) {
            currencies.push(currency);
        }
    }
    Ok(currencies)
}
