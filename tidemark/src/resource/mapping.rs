use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tidemark_core::{Resolution, SourceId, TidemarkError, Value};

/// Ordered `item name -> point name` bindings for a resource.
///
/// Declaration order is the column order of every row the resource produces.
/// An item bound to `None` is intentionally unbound and always yields "no value".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMapping {
    entries: Vec<(String, Option<String>)>,
}

impl ResourceMapping {
    /// Empty mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Bind `item` to the historian point `point`.
    #[must_use]
    pub fn bind(mut self, item: impl Into<String>, point: impl Into<String>) -> Self {
        self.entries.push((item.into(), Some(point.into())));
        self
    }

    /// Declare `item` without a point.
    #[must_use]
    pub fn unbound(mut self, item: impl Into<String>) -> Self {
        self.entries.push((item.into(), None));
        self
    }

    /// Append an entry, refusing duplicate item names.
    ///
    /// # Errors
    /// Returns `InvalidArg` if `item` is already declared.
    pub fn insert(
        &mut self,
        item: impl Into<String>,
        point: Option<String>,
    ) -> Result<(), TidemarkError> {
        let item = item.into();
        if self.contains(&item) {
            return Err(TidemarkError::InvalidArg(format!(
                "duplicate data item '{item}'"
            )));
        }
        self.entries.push((item, point));
        Ok(())
    }

    /// Whether `item` is declared.
    #[must_use]
    pub fn contains(&self, item: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == item)
    }

    /// Point bound to `item`: `None` if undeclared, `Some(None)` if unbound.
    #[must_use]
    pub fn get(&self, item: &str) -> Option<Option<&str>> {
        self.entries
            .iter()
            .find(|(name, _)| name == item)
            .map(|(_, point)| point.as_deref())
    }

    /// Entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(name, point)| (name.as_str(), point.as_deref()))
    }

    /// Number of declared items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check item names are unique and non-empty.
    ///
    /// # Errors
    /// Returns `InvalidArg` naming the offending item.
    pub fn validate(&self) -> Result<(), TidemarkError> {
        let mut seen = HashSet::new();
        for (name, _) in &self.entries {
            if name.is_empty() {
                return Err(TidemarkError::InvalidArg("empty data item name".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(TidemarkError::InvalidArg(format!(
                    "duplicate data item '{name}'"
                )));
            }
        }
        Ok(())
    }

    /// Point names to resolve, upper-cased, in declaration order.
    pub(crate) fn lookup_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|(_, point)| point.as_ref().map(|p| p.to_uppercase()))
            .collect()
    }
}

impl<K, V> FromIterator<(K, Option<V>)> for ResourceMapping
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.map(Into::into)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Binding {
    Resolved(SourceId),
    Unmapped,
    Unbound,
}

#[derive(Debug, Clone)]
pub(crate) struct Column {
    pub(crate) name: String,
    pub(crate) binding: Binding,
}

/// Physical column order (resolved, unmapped, unbound) plus the permutation
/// back to declaration order.
#[derive(Debug, Clone)]
pub(crate) struct ColumnLayout {
    columns: Vec<Column>,
    declared: Vec<usize>,
    resolved: usize,
}

impl ColumnLayout {
    pub(crate) fn resolve(mapping: &ResourceMapping, resolution: &Resolution) -> Self {
        let mut slots: Vec<Option<Binding>> = vec![None; mapping.len()];
        let mut resolved_order = Vec::new();

        for (point, source) in &resolution.mapped {
            let hit = mapping.iter().enumerate().position(|(i, (_, bound))| {
                slots[i].is_none() && bound.is_some_and(|b| b.eq_ignore_ascii_case(point))
            });
            if let Some(i) = hit {
                slots[i] = Some(Binding::Resolved(source.clone()));
                resolved_order.push(i);
            }
        }

        let mut order = resolved_order;
        let resolved = order.len();
        for (i, (_, bound)) in mapping.iter().enumerate() {
            if slots[i].is_none() && bound.is_some() {
                slots[i] = Some(Binding::Unmapped);
                order.push(i);
            }
        }
        for (i, (_, bound)) in mapping.iter().enumerate() {
            if bound.is_none() {
                slots[i] = Some(Binding::Unbound);
                order.push(i);
            }
        }

        let mut declared = vec![0; mapping.len()];
        for (physical, &decl) in order.iter().enumerate() {
            declared[decl] = physical;
        }
        let names: Vec<&str> = mapping.iter().map(|(n, _)| n).collect();
        let columns = order
            .iter()
            .map(|&decl| Column {
                name: names[decl].to_string(),
                binding: slots[decl].clone().unwrap_or(Binding::Unbound),
            })
            .collect();

        Self {
            columns,
            declared,
            resolved,
        }
    }

    /// Sources of the resolved columns in physical order.
    pub(crate) fn sources(&self) -> Vec<SourceId> {
        self.columns[..self.resolved]
            .iter()
            .filter_map(|c| match &c.binding {
                Binding::Resolved(s) => Some(s.clone()),
                Binding::Unmapped | Binding::Unbound => None,
            })
            .collect()
    }

    pub(crate) fn resolved_count(&self) -> usize {
        self.resolved
    }

    pub(crate) fn declared_columns(&self) -> impl Iterator<Item = &Column> {
        self.declared.iter().map(|&p| &self.columns[p])
    }

    /// Pad values for the resolved columns and reorder into declaration order.
    pub(crate) fn arrange(&self, resolved_values: Vec<Option<Value>>) -> Vec<Option<Value>> {
        let mut physical = resolved_values;
        physical.resize(self.columns.len(), None);
        self.declared
            .iter()
            .map(|&p| physical.get_mut(p).and_then(Option::take))
            .collect()
    }
}
