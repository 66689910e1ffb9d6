use figment::{Figment, providers::Env};

pub trait ContextProvider<Config> {
    fn new(config: Config) -> impl Future<Output = Self>;
}

/// Install the process-wide tracing subscriber.
///
/// Output is JSON so the host can be run under a log collector. The level
/// is taken from `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .json()
        // allow log level to be overridden by RUST_LOG env var
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        // this needs to be set to remove duplicated information in the log.
        .with_current_span(false)
        .with_ansi(false)
        // remove the name of the module from every log entry
        .with_target(false)
        .init();
}

/// Extract the configuration from environment variables.
///
/// # Errors
/// If a required variable is missing or cannot be converted into the
/// field's type.
pub fn load_config<'a, Config: serde::Deserialize<'a>>()
-> Result<Config, figment::Error> {
    config_figment().extract()
}

fn config_figment() -> Figment {
    Figment::new().merge(Env::raw())
}

/// Initialize the application context with configuration from environment
/// variables. The configuration is extracted using figment.
///
/// # Arguments
/// None
///
/// # Returns
/// The application context with the configuration as specified by the
/// trait.
///
/// # Errors
/// If the configuration cannot be extracted from the environment variables.
///
pub async fn create_app_context<'a, A, Config: serde::Deserialize<'a>>()
-> Result<A, figment::Error>
where
    A: ContextProvider<Config>,
{
    init_tracing();

    let config: Config = load_config()?;

    let context = A::new(config).await;

    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Config {
        site_url: String,
        #[serde(default)]
        cache_ttl_secs: Option<u64>,
    }

    #[test]
    fn test_config_is_read_from_raw_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SITE_URL", "https://zzx.example");
            jail.set_env("CACHE_TTL_SECS", "300");

            let config: Config = load_config()?;

            assert_eq!(config.site_url, "https://zzx.example");
            assert_eq!(config.cache_ttl_secs, Some(300));
            Ok(())
        });
    }

    #[test]
    fn test_missing_required_value_is_an_error() {
        figment::Jail::expect_with(|_jail| {
            let result: Result<Config, _> = load_config();
            assert!(result.is_err());
            Ok(())
        });
    }
}
