use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use basedrop::{Handle, Shared, SharedCell};
use serde::{Deserialize, Serialize};

use super::snapshot::{ModuleValues, ParamReader, ParamSnapshot};
use crate::effect::{EffectInfo, ModuleId};
use crate::engine::gc::gc_handle;

/// Errors from parameter edits
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("Unknown module {0}")]
    UnknownModule(ModuleId),

    #[error("{effect} module {module} has no parameter '{name}'")]
    UnknownParam {
        module: ModuleId,
        effect: &'static str,
        name: String,
    },
}

/// Result type for parameter operations
pub type ParamResult<T> = Result<T, ParamError>;

/// Serializable copy of the store contents, keyed by module and parameter name
///
/// This is what preset persistence round-trips. The file format is up to
/// the caller; the type itself is plain serde.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamValues(BTreeMap<ModuleId, BTreeMap<String, f32>>);

impl ParamValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: ModuleId, name: impl Into<String>, value: f32) {
        self.0.entry(module).or_default().insert(name.into(), value);
    }

    pub fn get(&self, module: ModuleId, name: &str) -> Option<f32> {
        self.0.get(&module)?.get(name).copied()
    }

    /// Iterate over `(module, name, value)` entries
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &str, f32)> + '_ {
        self.0
            .iter()
            .flat_map(|(&id, params)| params.iter().map(move |(name, &v)| (id, name.as_str(), v)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|m| m.is_empty())
    }
}

/// Staged edits applied by [`ParamStore::update`]
pub struct ParamBatch<'a> {
    modules: &'a mut BTreeMap<ModuleId, ModuleValues>,
}

impl ParamBatch<'_> {
    /// Set a value in the batch; returns the (possibly clamped) applied value
    pub fn set(&mut self, module: ModuleId, name: &str, value: f32) -> ParamResult<f32> {
        set_value(self.modules, module, name, value)
    }
}

/// Control-thread owner of all effect parameters
///
/// Every mutating call publishes exactly one new snapshot. Out-of-range
/// values are clamped to the schema range (and logged), never rejected;
/// unknown modules or parameter names are errors and publish nothing.
pub struct ParamStore {
    handle: Handle,
    cell: Arc<SharedCell<ParamSnapshot>>,
    modules: BTreeMap<ModuleId, ModuleValues>,
    version: u64,
}

impl ParamStore {
    pub fn new() -> Self {
        let handle = gc_handle();
        let cell = Arc::new(SharedCell::new(Shared::new(&handle, ParamSnapshot::default())));
        Self {
            handle,
            cell,
            modules: BTreeMap::new(),
            version: 0,
        }
    }

    /// Handle for the audio thread
    pub fn reader(&self) -> ParamReader {
        ParamReader::new(Arc::clone(&self.cell))
    }

    /// Version of the last published snapshot
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Add a module with default values for its whole schema
    pub fn register(&mut self, module: ModuleId, info: &'static EffectInfo) {
        self.modules.insert(module, ModuleValues::defaults(info));
        self.publish();
    }

    /// Drop a module's values
    pub fn unregister(&mut self, module: ModuleId) {
        if self.modules.remove(&module).is_some() {
            self.publish();
        }
    }

    /// Replace the whole module set in one publication
    pub fn reset_modules(&mut self, modules: impl IntoIterator<Item = (ModuleId, &'static EffectInfo)>) {
        self.modules = modules
            .into_iter()
            .map(|(id, info)| (id, ModuleValues::defaults(info)))
            .collect();
        self.publish();
    }

    /// Add several modules and set their initial values in one publication
    ///
    /// Used when a whole chain is swapped in: the new modules become visible
    /// together with their values, while the old ones stay until
    /// [`unregister_all`](Self::unregister_all). Nothing is published if
    /// `edit` fails.
    pub fn register_modules<F>(
        &mut self,
        modules: impl IntoIterator<Item = (ModuleId, &'static EffectInfo)>,
        edit: F,
    ) -> ParamResult<()>
    where
        F: FnOnce(&mut ParamBatch<'_>) -> ParamResult<()>,
    {
        let mut staged = self.modules.clone();
        for (id, info) in modules {
            staged.insert(id, ModuleValues::defaults(info));
        }
        edit(&mut ParamBatch { modules: &mut staged })?;
        self.modules = staged;
        self.publish();
        Ok(())
    }

    /// Drop several modules in one publication
    pub fn unregister_all(&mut self, modules: impl IntoIterator<Item = ModuleId>) {
        let before = self.modules.len();
        for id in modules {
            self.modules.remove(&id);
        }
        if self.modules.len() != before {
            self.publish();
        }
    }

    /// Registered module ids
    pub fn modules(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.modules.keys().copied()
    }

    pub fn is_registered(&self, module: ModuleId) -> bool {
        self.modules.contains_key(&module)
    }

    /// Set one parameter; returns the value actually applied
    pub fn set(&mut self, module: ModuleId, name: &str, value: f32) -> ParamResult<f32> {
        let applied = set_value(&mut self.modules, module, name, value)?;
        self.publish();
        Ok(applied)
    }

    /// Current value of one parameter
    pub fn get(&self, module: ModuleId, name: &str) -> ParamResult<f32> {
        let values = self.modules.get(&module).ok_or(ParamError::UnknownModule(module))?;
        let index = param_index(module, values.info(), name)?;
        Ok(values.values()[index])
    }

    /// All `(name, value)` pairs of one module, in schema order
    pub fn module_values(&self, module: ModuleId) -> ParamResult<Vec<(&'static str, f32)>> {
        let values = self.modules.get(&module).ok_or(ParamError::UnknownModule(module))?;
        Ok(values
            .info()
            .params
            .iter()
            .zip(values.values())
            .map(|(p, &v)| (p.name, v))
            .collect())
    }

    /// Apply several edits as one snapshot
    ///
    /// If the closure fails, none of its edits are published.
    pub fn update<F>(&mut self, edit: F) -> ParamResult<()>
    where
        F: FnOnce(&mut ParamBatch<'_>) -> ParamResult<()>,
    {
        let mut staged = self.modules.clone();
        edit(&mut ParamBatch { modules: &mut staged })?;
        self.modules = staged;
        self.publish();
        Ok(())
    }

    /// Serializable copy of every value
    pub fn snapshot(&self) -> ParamValues {
        let mut out = ParamValues::new();
        for (&id, values) in &self.modules {
            for (param, &value) in values.info().params.iter().zip(values.values()) {
                out.insert(id, param.name, value);
            }
        }
        out
    }

    /// Restore values captured by [`snapshot`](Self::snapshot)
    ///
    /// Applied as one atomic swap. Any unknown module or parameter rejects
    /// the whole restore; parameters not mentioned keep their current value.
    pub fn restore(&mut self, values: &ParamValues) -> ParamResult<()> {
        self.update(|batch| {
            for (module, name, value) in values.iter() {
                batch.set(module, name, value)?;
            }
            Ok(())
        })
    }

    fn publish(&mut self) {
        self.version += 1;
        let modules: HashMap<_, _> = self.modules.iter().map(|(&id, v)| (id, v.clone())).collect();
        let snapshot = ParamSnapshot::new(self.version, modules);
        self.cell.set(Shared::new(&self.handle, snapshot));
    }
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}

fn param_index(module: ModuleId, info: &'static EffectInfo, name: &str) -> ParamResult<usize> {
    info.param_index(name).ok_or_else(|| ParamError::UnknownParam {
        module,
        effect: info.name,
        name: name.to_string(),
    })
}

fn set_value(
    modules: &mut BTreeMap<ModuleId, ModuleValues>,
    module: ModuleId,
    name: &str,
    value: f32,
) -> ParamResult<f32> {
    let values = modules.get_mut(&module).ok_or(ParamError::UnknownModule(module))?;
    let info = values.info();
    let index = param_index(module, info, name)?;
    let param = &info.params[index];
    let applied = param.clamp(value);
    if applied != value {
        log::warn!(
            "{} {}: {} = {} out of range [{}, {}], clamped to {}",
            info.name,
            module,
            name,
            value,
            param.min,
            param.max,
            applied
        );
    }
    values.values_mut()[index] = applied;
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::EffectKind;

    fn store_with_echo() -> (ParamStore, ModuleId) {
        let mut store = ParamStore::new();
        let id = ModuleId(1);
        store.register(id, EffectKind::Echo.info());
        (store, id)
    }

    #[test]
    fn test_register_publishes_defaults() {
        let (store, id) = store_with_echo();
        let snapshot = store.reader().load();
        assert_eq!(snapshot.version(), store.version());
        let default = EffectKind::Echo.info().params[0].default;
        assert_eq!(snapshot.value(id, EffectKind::Echo.info().params[0].name), Some(default));
    }

    #[test]
    fn test_set_clamps_out_of_range() {
        let (mut store, id) = store_with_echo();
        let applied = store.set(id, "feedback", 5.0).unwrap();
        let max = EffectKind::Echo.info().params[EffectKind::Echo.info().param_index("feedback").unwrap()].max;
        assert_eq!(applied, max);
        assert!(applied < 1.0);
        assert_eq!(store.reader().load().value(id, "feedback"), Some(max));
    }

    #[test]
    fn test_unknown_names_rejected() {
        let (mut store, id) = store_with_echo();
        let version = store.version();
        assert!(matches!(store.set(id, "nope", 1.0), Err(ParamError::UnknownParam { .. })));
        assert_eq!(store.set(ModuleId(9), "mix", 1.0), Err(ParamError::UnknownModule(ModuleId(9))));
        assert_eq!(store.version(), version);
    }

    #[test]
    fn test_reader_keeps_old_snapshot_until_reload() {
        let (mut store, id) = store_with_echo();
        let reader = store.reader();
        let before = reader.load();
        store.set(id, "mix", 0.9).unwrap();
        let after = reader.load();

        assert_ne!(before.value(id, "mix"), Some(0.9));
        assert_eq!(after.value(id, "mix"), Some(0.9));
        assert!(after.version() > before.version());
    }

    #[test]
    fn test_batch_publishes_once() {
        let (mut store, id) = store_with_echo();
        let version = store.version();
        store
            .update(|batch| {
                batch.set(id, "mix", 0.1)?;
                batch.set(id, "feedback", 0.2)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.version(), version + 1);
        assert_eq!(store.get(id, "mix"), Ok(0.1));
        assert_eq!(store.get(id, "feedback"), Ok(0.2));
    }

    #[test]
    fn test_failed_batch_publishes_nothing() {
        let (mut store, id) = store_with_echo();
        let version = store.version();
        let result = store.update(|batch| {
            batch.set(id, "mix", 0.1)?;
            batch.set(id, "bogus", 0.2)?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(store.version(), version);
        assert_ne!(store.get(id, "mix"), Ok(0.1));
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let (mut store, id) = store_with_echo();
        store.set(id, "mix", 0.7).unwrap();
        let saved = store.snapshot();

        store.set(id, "mix", 0.2).unwrap();
        store.restore(&saved).unwrap();
        assert_eq!(store.get(id, "mix"), Ok(0.7));

        let yaml = serde_yaml::to_string(&saved).unwrap();
        let parsed: ParamValues = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, saved);
    }

    #[test]
    fn test_restore_is_all_or_nothing() {
        let (mut store, id) = store_with_echo();
        store.set(id, "mix", 0.3).unwrap();

        let mut values = ParamValues::new();
        values.insert(id, "mix", 0.9);
        values.insert(ModuleId(42), "mix", 0.5);

        let version = store.version();
        assert_eq!(store.restore(&values), Err(ParamError::UnknownModule(ModuleId(42))));
        assert_eq!(store.version(), version);
        assert_eq!(store.get(id, "mix"), Ok(0.3));
    }

    #[test]
    fn test_register_modules_publishes_values_once() {
        let (mut store, id) = store_with_echo();
        let version = store.version();
        store
            .register_modules([(ModuleId(5), EffectKind::Gain.info())], |batch| {
                batch.set(ModuleId(5), "gain", 2.0)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.version(), version + 1);
        assert!(store.is_registered(id));
        assert_eq!(store.reader().load().value(ModuleId(5), "gain"), Some(2.0));

        let failed = store.register_modules([(ModuleId(6), EffectKind::Gain.info())], |batch| {
            batch.set(ModuleId(6), "volume", 2.0)?;
            Ok(())
        });
        assert!(failed.is_err());
        assert!(!store.is_registered(ModuleId(6)));

        store.unregister_all([id, ModuleId(77)]);
        assert_eq!(store.modules().collect::<Vec<_>>(), vec![ModuleId(5)]);
    }

    #[test]
    fn test_reset_modules_replaces_everything() {
        let (mut store, id) = store_with_echo();
        store.reset_modules([(ModuleId(5), EffectKind::Gain.info())]);
        assert!(!store.is_registered(id));
        assert!(store.is_registered(ModuleId(5)));
        assert_eq!(store.reader().load().len(), 1);
    }
}
