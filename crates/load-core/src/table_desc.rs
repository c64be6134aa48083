//! Table descriptor: the shape of the load target.
//!
//! A descriptor is assembled from explicit configuration, the producer's field
//! list, and defaults. It may be partial while the connector is being
//! configured; the command compiler is where completeness is enforced.

use crate::error::{LoadError, Result};
use crate::fields::Fields;
use crate::properties::{
    split_list, Properties, COLUMN_DEFS, COLUMN_NAMES, DEFAULT_SEPARATOR, DISTRIBUTION_KEY,
    FIELD_SEPARATOR, SORT_KEYS, TABLE_NAME,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDesc {
    pub name: Option<String>,
    pub columns: Vec<String>,
    /// DDL type per column, positionally aligned with `columns`. May be
    /// shorter or longer than `columns` when configured explicitly.
    pub column_types: Vec<Option<String>>,
    pub distribution_key: Option<String>,
    pub sort_keys: Vec<String>,
}

impl TableDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, ddl_type: Option<&str>) -> Self {
        self.columns.push(name.into());
        self.column_types.push(ddl_type.map(str::to_string));
        self
    }

    pub fn with_distribution_key(mut self, key: impl Into<String>) -> Self {
        self.distribution_key = Some(key.into());
        self
    }

    pub fn with_sort_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Build a descriptor from configuration and the producer's fields.
    ///
    /// - name: `tablename`; required when `require_table_name` is set
    /// - columns: `columnnames` split on `separator`, else the field names
    /// - types: `columndefs` split on `separator`, else the field types
    /// - distribution key: `distributionkey`, unsplit
    /// - sort keys: `sortkeys` split on `separator`
    pub fn build(fields: &Fields, properties: &Properties, require_table_name: bool) -> Result<Self> {
        let name = properties.get_non_empty(TABLE_NAME).map(|n| n.trim().to_string());
        if require_table_name && name.is_none() {
            return Err(LoadError::Configuration("no tablename given".to_string()));
        }

        let separator = properties
            .get(FIELD_SEPARATOR)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SEPARATOR);

        let columns = match properties.get_non_empty(COLUMN_NAMES) {
            Some(names) => split_list(names, separator),
            None => fields.names(),
        };

        let column_types = match properties.get_non_empty(COLUMN_DEFS) {
            Some(defs) => {
                let defs = split_list(defs, separator);
                if defs.is_empty() {
                    return Err(LoadError::Configuration(format!(
                        "column definitions '{}' contain no types",
                        properties.get_or(COLUMN_DEFS, "")
                    )));
                }
                defs.into_iter().map(Some).collect()
            }
            None => fields.ddl_types(),
        };

        let distribution_key = properties
            .get_non_empty(DISTRIBUTION_KEY)
            .map(|k| k.trim().to_string());

        let sort_keys = properties
            .get_non_empty(SORT_KEYS)
            .map(|keys| split_list(keys, separator))
            .unwrap_or_default();

        Ok(Self {
            name,
            columns,
            column_types,
            distribution_key,
            sort_keys,
        })
    }

    pub fn table_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Declared type of the column at `index`, if any.
    pub fn column_type(&self, index: usize) -> Option<&str> {
        self.column_types.get(index).and_then(|t| t.as_deref())
    }

    /// True when name, at least one column, and a type for every column are
    /// present.
    pub fn has_required_table_information(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
            && !self.columns.is_empty()
            && (0..self.columns.len()).all(|i| self.column_type(i).is_some())
    }

    /// Fill missing columns and types from `fields` without overwriting what
    /// is already present.
    pub fn complete_from_fields(&mut self, fields: &Fields) {
        if self.columns.is_empty() {
            self.columns = fields.names();
        }

        let inferred = fields.ddl_types();
        if self.column_types.len() < self.columns.len() {
            self.column_types.resize(self.columns.len(), None);
        }
        for (slot, inferred) in self.column_types.iter_mut().zip(inferred) {
            if slot.is_none() {
                *slot = inferred;
            }
        }

        debug!(
            "Completed table descriptor from fields: columns={:?}, types={:?}",
            self.columns, self.column_types
        );
    }

    /// Take the distribution key and sort keys from `other` where this
    /// descriptor has none.
    pub fn inherit_layout(&mut self, other: &TableDesc) {
        if self.distribution_key.is_none() {
            self.distribution_key = other.distribution_key.clone();
        }
        if self.sort_keys.is_empty() {
            self.sort_keys = other.sort_keys.clone();
        }
    }
}
