//! kurs refresher binary
//!
//! Refreshes pivot rates from the configured providers and answers one-off
//! rate and conversion queries against the rate store.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kurs_common::{CommonError, Currency, Money};
use kurs_fx::{
    AggregatorProvider, CentralBankProvider, CommercialBankProvider, Converter, MemoryRateCache,
    PgRateStore, RateCache, RateProvider, RateStore, RefreshJob, RefreshRequester, Resolver,
};

mod config;

use config::{parse_currency_list, RefresherConfig};

/// kurs rate refresher CLI
#[derive(Parser, Debug)]
#[command(name = "kurs-refresher")]
#[command(about = "Refresh and query exchange rates")]
struct Args {
    /// Log as plain text instead of JSON
    #[arg(long, global = true)]
    plain_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch rates for the configured currencies
    Refresh {
        /// Comma-separated currency codes, overriding KURS_CURRENCIES
        #[arg(long)]
        currencies: Option<String>,

        /// Repeat every N seconds until interrupted
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Print the rate from BASE to TARGET
    Rate {
        base: String,
        target: String,

        /// Skip the cache
        #[arg(long)]
        force_refresh: bool,
    },

    /// Convert AMOUNT of FROM into TO
    Convert {
        amount: Decimal,
        from: String,
        to: String,
    },
}

/// Shared services built from configuration.
struct Services {
    store: Arc<dyn RateStore>,
    cache: Arc<dyn RateCache>,
    job: Arc<RefreshJob>,
}

impl Services {
    async fn connect(config: &RefresherConfig) -> anyhow::Result<Self> {
        let store = PgRateStore::connect(&config.database_url, config.max_connections).await?;
        store.migrate().await?;

        let store: Arc<dyn RateStore> = Arc::new(store);
        let cache: Arc<dyn RateCache> = Arc::new(MemoryRateCache::new());

        let providers: Vec<Arc<dyn RateProvider>> = vec![
            Arc::new(CentralBankProvider::new(config.central_bank.clone())?),
            Arc::new(CommercialBankProvider::new(config.commercial_bank.clone())?),
            Arc::new(AggregatorProvider::new(config.aggregator.clone())?),
        ];

        let job = Arc::new(RefreshJob::new(
            providers,
            store.clone(),
            cache.clone(),
            config.refresh.clone(),
        ));

        Ok(Self { store, cache, job })
    }

    /// Resolver wired to a refresh worker. Await the returned handle after
    /// dropping the resolver to let queued refreshes finish.
    fn resolver(&self, config: &RefresherConfig) -> (Resolver, tokio::task::JoinHandle<()>) {
        let (requester, queue) = RefreshRequester::channel(config.refresh.queue_capacity);
        let worker = tokio::spawn(self.job.clone().run_worker(queue));

        let resolver = Resolver::new(self.cache.clone(), self.store.clone(), config.resolver.clone())
            .with_refresh_requests(requester);

        (resolver, worker)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = RefresherConfig::from_env();

    let log_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(&log_level, args.plain_logs);

    let config = match config.and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(anyhow::anyhow!("Configuration error: {}", e));
        }
    };

    info!(pivot = %config.resolver.pivot, "Starting kurs refresher");

    let services = Services::connect(&config).await?;

    match args.command {
        Command::Refresh {
            currencies,
            interval_secs,
        } => {
            let currencies = match currencies {
                Some(list) => {
                    parse_currency_list(&list).map_err(|e| invalid_argument("currencies", e))?
                }
                None => config.currencies.clone(),
            };
            run_refresh(&services, &currencies, interval_secs).await
        }
        Command::Rate {
            base,
            target,
            force_refresh,
        } => {
            let base = currency_arg("base", &base)?;
            let target = currency_arg("target", &target)?;

            let (resolver, worker) = services.resolver(&config);
            let result = resolver.get_rate(&base, &target, force_refresh).await;
            drop(resolver);
            worker.await?;

            if matches!(&result, Err(e) if e.is_not_found()) {
                info!("Queued refreshes finished; retry the query");
            }
            let rate = result?;
            println!("{base}/{target} {rate}");
            Ok(())
        }
        Command::Convert { amount, from, to } => {
            let from = currency_arg("from", &from)?;
            let to = currency_arg("to", &to)?;

            let (resolver, worker) = services.resolver(&config);
            let converter = Converter::new(Arc::new(resolver));
            let result = converter.convert(&Money::new(amount, from), to).await;
            drop(converter);
            worker.await?;

            let conversion = result?;
            println!("{}", serde_json::to_string_pretty(&conversion)?);
            Ok(())
        }
    }
}

/// Parse a currency code given on the command line.
fn currency_arg(name: &'static str, code: &str) -> anyhow::Result<Currency> {
    Currency::parse(code).map_err(|e| invalid_argument(name, e))
}

fn invalid_argument(name: &'static str, e: CommonError) -> anyhow::Error {
    error!(argument = name, code = e.error_code(), error = %e, "Invalid argument");
    anyhow::Error::new(e).context(format!("invalid {name}"))
}

fn init_logging(default_level: &str, plain: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
    );

    if plain {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    }
}

async fn run_refresh(
    services: &Services,
    currencies: &[Currency],
    interval_secs: Option<u64>,
) -> anyhow::Result<()> {
    let Some(secs) = interval_secs else {
        let summary = services.job.refresh_all(currencies).await;
        if summary.refreshed.is_empty() && !summary.failed.is_empty() {
            anyhow::bail!("No currency could be refreshed");
        }
        return Ok(());
    };

    if secs == 0 {
        anyhow::bail!("Refresh interval must be positive");
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(secs));
    info!(interval_secs = secs, "Refresh loop running");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let summary = services.job.refresh_all(currencies).await;
                if !summary.is_complete() {
                    warn!(failed = ?summary.failed, "Some currencies were not refreshed");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Refresher shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_arg() {
        assert_eq!(currency_arg("base", "usd").unwrap(), Currency::usd());

        let err = currency_arg("base", "dollars").unwrap_err();
        assert_eq!(err.to_string(), "invalid base");
        assert_eq!(
            err.downcast_ref::<CommonError>().map(CommonError::error_code),
            Some("INVALID_CURRENCY")
        );
    }
}
