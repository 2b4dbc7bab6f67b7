//! Named, ordered columns backed by historian points with bounded history.

mod history;
mod mapping;
mod meta;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use futures::future::join_all;
use tidemark_core::connector::{point_fetch, point_lookup};
use tidemark_core::{
    HistorianConnector, ResourceConfig, Retrieval, Row, SourceId, TidemarkError, TimeRange, Tz,
    Value, truncate_to_second,
};
use tidemark_types::{RangeMode, RangeOptions};

pub use history::{HistoryColumn, TIMESTAMP_COLUMN};
pub(crate) use mapping::ColumnLayout;
pub use mapping::ResourceMapping;
pub use meta::Meta;

use history::HistoryCache;
use mapping::Binding;

use crate::range::{RangePlan, RowStream};

/// Lookback used by [`ResourceCache::last`] when none is given.
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(15 * 60);

/// A named set of data items resolved against the historian, with a rolling
/// history of refreshed rows.
pub struct ResourceCache {
    id: String,
    connector: Arc<dyn HistorianConnector>,
    mapping: ResourceMapping,
    layout: Arc<ColumnLayout>,
    config: ResourceConfig,
    tz: Option<Tz>,
    history: Mutex<HistoryCache>,
    refresh_lock: tokio::sync::Mutex<()>,
    meta: Mutex<Meta>,
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("id", &self.id)
            .field("connector", &self.connector.name())
            .field("mapping", &self.mapping)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ResourceCache`].
pub struct ResourceCacheBuilder {
    id: String,
    connector: Arc<dyn HistorianConnector>,
    mapping: ResourceMapping,
    config: ResourceConfig,
    meta: Meta,
}

impl ResourceCacheBuilder {
    /// Replace the item mapping.
    #[must_use]
    pub fn mapping(mut self, mapping: ResourceMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Number of refreshes kept per column (default 15).
    #[must_use]
    pub const fn retention(mut self, retention: usize) -> Self {
        self.config.retention = retention;
        self
    }

    /// IANA timezone rows are reported in (UTC when unset).
    #[must_use]
    pub fn timezone(mut self, tz: impl Into<String>) -> Self {
        self.config.timezone = Some(tz.into());
        self
    }

    /// Data server passed to point lookups.
    #[must_use]
    pub fn dataserver(mut self, server: impl Into<String>) -> Self {
        self.config.dataserver = Some(server.into());
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: ResourceConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed the meta table.
    #[must_use]
    pub fn meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// Validate the configuration and resolve the mapping.
    ///
    /// Points the lookup cannot resolve become permanently empty columns.
    ///
    /// # Errors
    /// Returns `InvalidArg` for a zero retention, an unknown timezone, or a
    /// malformed mapping; `Unsupported` if the connector has no point lookup;
    /// and any error the lookup itself reports.
    pub async fn build(self) -> Result<ResourceCache, TidemarkError> {
        self.mapping.validate()?;
        if self.mapping.contains(TIMESTAMP_COLUMN) {
            return Err(TidemarkError::InvalidArg(format!(
                "'{TIMESTAMP_COLUMN}' is a reserved column name"
            )));
        }
        let tz = match self.config.timezone.as_deref() {
            Some(name) => Some(name.parse::<Tz>().map_err(|_| {
                TidemarkError::InvalidArg(format!("unknown timezone '{name}'"))
            })?),
            None => None,
        };
        let history = HistoryCache::new(self.mapping.iter().map(|(n, _)| n), self.config.retention)?;

        let names = self.mapping.lookup_names();
        let resolution = if names.is_empty() {
            tidemark_core::Resolution::default()
        } else {
            point_lookup(&*self.connector)?
                .resolve(&names, self.config.dataserver.as_deref())
                .await?
        };
        let layout = ColumnLayout::resolve(&self.mapping, &resolution);

        #[cfg(feature = "tracing")]
        tracing::info!(
            resource = %self.id,
            resolved = layout.resolved_count(),
            requested = names.len(),
            "resolved {} of {} points",
            layout.resolved_count(),
            names.len()
        );

        Ok(ResourceCache {
            id: self.id,
            connector: self.connector,
            mapping: self.mapping,
            layout: Arc::new(layout),
            config: self.config,
            tz,
            history: Mutex::new(history),
            refresh_lock: tokio::sync::Mutex::new(()),
            meta: Mutex::new(self.meta),
        })
    }
}

impl ResourceCache {
    /// Start building a resource served by `connector`.
    pub fn builder(
        id: impl Into<String>,
        connector: Arc<dyn HistorianConnector>,
    ) -> ResourceCacheBuilder {
        ResourceCacheBuilder {
            id: id.into(),
            connector,
            mapping: ResourceMapping::new(),
            config: ResourceConfig::default(),
            meta: Meta::default(),
        }
    }

    /// Resource identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The declared mapping.
    #[must_use]
    pub const fn mapping(&self) -> &ResourceMapping {
        &self.mapping
    }

    /// The connector serving this resource.
    #[must_use]
    pub fn connector(&self) -> &Arc<dyn HistorianConnector> {
        &self.connector
    }

    /// Column names in declaration order (row value order).
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.layout.declared_columns().map(|c| c.name.as_str()).collect()
    }

    /// `timestamp` followed by the column names.
    #[must_use]
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(TIMESTAMP_COLUMN).chain(self.columns()).collect()
    }

    /// Position of `name` within a row's values.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.layout.declared_columns().position(|c| c.name == name)
    }

    /// Source id backing `name`, if it resolved.
    #[must_use]
    pub fn source_of(&self, name: &str) -> Option<&SourceId> {
        self.layout
            .declared_columns()
            .find(|c| c.name == name)
            .and_then(|c| match &c.binding {
                Binding::Resolved(s) => Some(s),
                Binding::Unmapped | Binding::Unbound => None,
            })
    }

    /// Items bound to a point the lookup could not resolve.
    #[must_use]
    pub fn unmapped(&self) -> Vec<&str> {
        self.layout
            .declared_columns()
            .filter(|c| c.binding == Binding::Unmapped)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Resolved sources in fetch order.
    #[must_use]
    pub fn sources(&self) -> Vec<SourceId> {
        self.layout.sources()
    }

    /// Timezone rows are reported in (UTC when `None`).
    #[must_use]
    pub const fn timezone(&self) -> Option<Tz> {
        self.tz
    }

    /// Configured history depth.
    #[must_use]
    pub const fn retention(&self) -> usize {
        self.config.retention
    }

    /// Read the value of every column at the current second.
    ///
    /// Columns whose fetch fails, or that never resolved, carry "no value".
    ///
    /// # Errors
    /// Returns `Unsupported` if the connector lacks point-in-time fetch, or the
    /// last `Connector` error when every resolved column failed.
    pub async fn current(&self, retrieval: Retrieval) -> Result<Row, TidemarkError> {
        let now = truncate_to_second(Utc::now());
        let sources = self.layout.sources();
        if sources.is_empty() {
            return Ok(self.row_at(now, Vec::new()));
        }
        let fetcher = point_fetch(&*self.connector)?;
        let results = join_all(sources.iter().map(|s| fetcher.fetch_at(s, now, retrieval))).await;

        let mut failures = 0usize;
        let mut last_err = None;
        let mut values = Vec::with_capacity(results.len());
        for (source, res) in sources.iter().zip(results) {
            match res {
                Ok(sample) => values.push(sample.and_then(|s| s.reading().cloned())),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(resource = %self.id, source = %source, error = %e, "point-in-time fetch failed");
                    #[cfg(not(feature = "tracing"))]
                    let _ = source;
                    failures += 1;
                    last_err = Some(e);
                    values.push(None);
                }
            }
        }
        if failures == sources.len()
            && let Some(e) = last_err
        {
            return Err(e);
        }
        Ok(self.row_at(now, values))
    }

    fn row_at(&self, at: chrono::DateTime<Utc>, resolved: Vec<Option<Value>>) -> Row {
        let tz = self.tz.unwrap_or(Tz::UTC);
        Row::new(at.with_timezone(&tz), self.layout.arrange(resolved))
    }

    /// Read `range` as aligned rows, one partition at a time.
    ///
    /// # Errors
    /// Returns `InvalidArg` for an invalid mode or options and `Unsupported`
    /// when the connector cannot serve the needed fetches.
    pub fn range(
        &self,
        range: TimeRange,
        mode: RangeMode,
        options: RangeOptions,
    ) -> Result<RowStream, TidemarkError> {
        let plan = RangePlan::new(
            Arc::clone(&self.connector),
            Arc::clone(&self.layout),
            range,
            mode,
            options,
            self.tz,
        )?;
        Ok(plan.into_stream())
    }

    /// Read the trailing `lookback` up to the current second.
    ///
    /// A zero lookback means [`DEFAULT_LOOKBACK`].
    ///
    /// # Errors
    /// See [`ResourceCache::range`].
    pub fn last(
        &self,
        lookback: Duration,
        mode: RangeMode,
        options: RangeOptions,
    ) -> Result<RowStream, TidemarkError> {
        let lookback = if lookback.is_zero() {
            DEFAULT_LOOKBACK
        } else {
            lookback
        };
        let delta = TimeDelta::from_std(lookback)
            .map_err(|_| TidemarkError::InvalidArg("lookback out of range".into()))?;
        let range = TimeRange::ending_at(truncate_to_second(Utc::now()), delta)?;
        self.range(range, mode, options)
    }

    /// Read [`current`](Self::current) and append it to the history.
    ///
    /// Concurrent refreshes of one resource run one after another.
    ///
    /// # Errors
    /// Propagates errors from [`current`](Self::current); nothing is appended then.
    pub async fn refresh(&self, retrieval: Retrieval) -> Result<Row, TidemarkError> {
        let _serial = self.refresh_lock.lock().await;
        let row = self.current(retrieval).await?;
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(&row);
        Ok(row)
    }

    /// Snapshot of the history column `name` (including `timestamp`).
    #[must_use]
    pub fn history(&self, name: &str) -> Option<HistoryColumn> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .column(name)
    }

    /// Number of refreshes currently retained.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Set a meta entry.
    ///
    /// # Errors
    /// Returns `InvalidArg` if `key` is already set.
    pub fn set_meta(
        &self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<(), TidemarkError> {
        self.meta
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value)
    }

    /// Copy of the meta table.
    #[must_use]
    pub fn meta(&self) -> Meta {
        self.meta
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// New resource holding only `items`, resolved afresh.
    ///
    /// # Errors
    /// Returns `NotFound` naming the first item absent from this mapping, or
    /// any error from building the new resource.
    pub async fn derive(&self, items: &[&str]) -> Result<Self, TidemarkError> {
        let mut mapping = ResourceMapping::new();
        for item in items {
            let point = self
                .mapping
                .get(item)
                .ok_or_else(|| TidemarkError::not_found(format!("data item '{item}'")))?;
            mapping.insert(*item, point.map(str::to_string))?;
        }
        self.rebuild(mapping).await
    }

    /// New resource with this resource's columns plus `external`, whose items
    /// are renamed to `{prefix}_{item}`. On a name clash this resource's
    /// binding wins.
    ///
    /// # Errors
    /// Any error from building the new resource.
    pub async fn join(&self, prefix: &str, external: &ResourceMapping) -> Result<Self, TidemarkError> {
        let mut mapping = self.mapping.clone();
        for (item, point) in external.iter() {
            let name = format!("{prefix}_{item}");
            if !mapping.contains(&name) {
                mapping.insert(name, point.map(str::to_string))?;
            }
        }
        self.rebuild(mapping).await
    }

    async fn rebuild(&self, mapping: ResourceMapping) -> Result<Self, TidemarkError> {
        Self::builder(self.id.clone(), Arc::clone(&self.connector))
            .mapping(mapping)
            .config(self.config.clone())
            .meta(self.meta())
            .build()
            .await
    }
}
