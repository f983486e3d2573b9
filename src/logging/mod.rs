//! Tracing setup
//!
//! Logs always go to stderr so table and JSON output on stdout stay clean.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Build filter directives string from LoggingConfig
///
/// Produces `base_level,costmesh::component=level,...` with components in
/// sorted order.
///
/// # Examples
///
/// ```
/// use costmesh::config::LoggingConfig;
/// use costmesh::logging::build_filter_directives;
/// use std::collections::HashMap;
///
/// let mut component_levels = HashMap::new();
/// component_levels.insert("engine".to_string(), "debug".to_string());
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     component_levels: Some(component_levels),
///     ..Default::default()
/// };
///
/// assert_eq!(build_filter_directives(&config), "info,costmesh::engine=debug");
/// ```
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    if let Some(component_levels) = &config.component_levels {
        let mut components: Vec<_> = component_levels.iter().collect();
        components.sort();
        for (component, level) in components {
            filter_str.push_str(&format!(",costmesh::{}={}", component, level));
        }
    }

    filter_str
}

/// Install the global subscriber. `RUST_LOG` wins over the configuration.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter_str = build_filter_directives(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    match config.format {
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer.compact())
                .try_init()?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer.pretty())
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer.json())
                .try_init()?;
        }
    }

    Ok(())
}
