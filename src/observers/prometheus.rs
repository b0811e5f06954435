//! Prometheus text exposition.
//!
//! Each tally becomes an `IntCounter` in a fresh registry per render, named
//! `<namespace>_<name>` and carrying the tally's help text.
//!
//! ```rust,ignore
//! use contavisite::observers::prometheus::PrometheusObserver;
//!
//! let observer = PrometheusObserver::new()
//!     .with_namespace("contavisite")
//!     .with_const_label("page", "profile");
//! let text = observer.render(stats.tallies().into_iter())?;
//! // # HELP contavisite_page_loads Page loads that ran the visitor counting protocol
//! // # TYPE contavisite_page_loads counter
//! // contavisite_page_loads{page="profile"} 3
//! ```

use std::collections::HashMap;

use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

use crate::stats::Observable;

use super::{ObserverError, Result};

/// Renders tallies in the Prometheus text format.
#[derive(Debug, Clone, Default)]
pub struct PrometheusObserver {
    namespace: Option<String>,
    const_labels: HashMap<String, String>,
}

impl PrometheusObserver {
    /// No namespace and no labels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes every metric name with `namespace_`.
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Adds a label to every metric.
    pub fn with_const_label(mut self, name: &str, value: &str) -> Self {
        self.const_labels
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
    fn sanitize_name(name: &str) -> String {
        let mut result: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if result.is_empty() {
            result.push_str("unnamed");
        }
        if result.starts_with(|c: char| c.is_ascii_digit()) {
            result.insert(0, '_');
        }
        result
    }

    fn full_name(&self, name: &str) -> String {
        let sanitized = Self::sanitize_name(name);
        match &self.namespace {
            Some(ns) => format!("{}_{}", ns, sanitized),
            None => sanitized,
        }
    }

    /// Renders `tallies`.
    ///
    /// # Errors
    ///
    /// Fails if two tallies map to the same metric name or encoding fails.
    pub fn render<'a>(&self, tallies: impl Iterator<Item = &'a dyn Observable>) -> Result<String> {
        let registry = Registry::new();

        for tally in tallies {
            let name = self.full_name(tally.name());
            let help = if tally.help().is_empty() {
                format!("{} tally", name)
            } else {
                tally.help().to_string()
            };

            let opts = Opts::new(name.as_str(), help).const_labels(self.const_labels.clone());
            let counter = IntCounter::with_opts(opts)?;
            counter.inc_by(tally.value());
            registry
                .register(Box::new(counter))
                .map_err(|e| ObserverError::Metric(format!("{}: {}", name, e)))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Renders `tallies` to bytes, for HTTP bodies.
    pub fn render_bytes<'a>(
        &self,
        tallies: impl Iterator<Item = &'a dyn Observable>,
    ) -> Result<Vec<u8>> {
        Ok(self.render(tallies)?.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{ProtocolStats, Tally};

    #[test]
    fn test_render_empty() {
        let tallies: Vec<&dyn Observable> = vec![];
        let output = PrometheusObserver::new()
            .render(tallies.into_iter())
            .unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_render_stats() {
        let stats = ProtocolStats::new();
        stats.page_loads.add(3);
        stats.new_visitors.add(1);

        let output = PrometheusObserver::new()
            .render(stats.tallies().into_iter())
            .unwrap();
        assert!(output.contains("page_loads 3"));
        assert!(output.contains("new_visitors 1"));
        assert!(output.contains("# TYPE pulses counter"));
        assert!(output.contains("# HELP new_visitors Visitors counted for the first time"));
    }

    #[test]
    fn test_namespace_and_labels() {
        let tally = Tally::new().with_name("pulses");
        tally.add(2);
        let tallies: Vec<&dyn Observable> = vec![&tally];

        let output = PrometheusObserver::new()
            .with_namespace("contavisite")
            .with_const_label("page", "profile")
            .render(tallies.into_iter())
            .unwrap();
        assert!(output.contains(r#"contavisite_pulses{page="profile"} 2"#));
    }

    #[test]
    fn test_default_help() {
        let tally = Tally::new().with_name("pulses");
        let tallies: Vec<&dyn Observable> = vec![&tally];
        let output = PrometheusObserver::new()
            .render(tallies.into_iter())
            .unwrap();
        assert!(output.contains("# HELP pulses pulses tally"));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(PrometheusObserver::sanitize_name("live-updates"), "live_updates");
        assert_eq!(PrometheusObserver::sanitize_name("page.loads"), "page_loads");
        assert_eq!(PrometheusObserver::sanitize_name("9lives"), "_9lives");
        assert_eq!(PrometheusObserver::sanitize_name(""), "unnamed");
    }

    #[test]
    fn test_duplicate_names_fail() {
        let a = Tally::new().with_name("pulses");
        let b = Tally::new().with_name("pulses");
        let tallies: Vec<&dyn Observable> = vec![&a, &b];
        let err = PrometheusObserver::new()
            .render(tallies.into_iter())
            .unwrap_err();
        assert!(matches!(err, ObserverError::Metric(_)));
    }
}
