use std::collections::HashMap;
use std::sync::Arc;

use basedrop::{Shared, SharedCell};

use crate::effect::{EffectInfo, ModuleId};

/// Parameter values of one effect instance, in schema order
#[derive(Debug, Clone)]
pub struct ModuleValues {
    info: &'static EffectInfo,
    values: Box<[f32]>,
}

impl ModuleValues {
    /// Values initialized to the schema defaults
    pub fn defaults(info: &'static EffectInfo) -> Self {
        Self {
            info,
            values: info.defaults().into_boxed_slice(),
        }
    }

    #[inline]
    pub fn info(&self) -> &'static EffectInfo {
        self.info
    }

    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub(crate) fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }
}

/// Immutable, fully built set of parameter values
///
/// Published as a whole; never modified after construction.
#[derive(Debug, Default)]
pub struct ParamSnapshot {
    version: u64,
    modules: HashMap<ModuleId, ModuleValues>,
}

impl ParamSnapshot {
    pub fn new(version: u64, modules: HashMap<ModuleId, ModuleValues>) -> Self {
        Self { version, modules }
    }

    /// Publication counter; increases with every published edit
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Parameter view for one module
    ///
    /// Modules missing from the snapshot (or registered under a different
    /// effect kind) read their schema defaults.
    #[inline]
    pub fn module(&self, id: ModuleId, info: &'static EffectInfo) -> ModuleParams<'_> {
        let values = self
            .modules
            .get(&id)
            .filter(|m| std::ptr::eq(m.info, info))
            .map(|m| &m.values[..]);
        ModuleParams { info, values }
    }

    /// Look up a single value by module and parameter name
    pub fn value(&self, id: ModuleId, name: &str) -> Option<f32> {
        let module = self.modules.get(&id)?;
        let index = module.info.param_index(name)?;
        module.values.get(index).copied()
    }

    pub fn contains_module(&self, id: ModuleId) -> bool {
        self.modules.contains_key(&id)
    }

    /// Number of modules with registered parameters
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Read-only view of one module's parameters inside a snapshot
#[derive(Debug, Clone, Copy)]
pub struct ModuleParams<'a> {
    info: &'static EffectInfo,
    values: Option<&'a [f32]>,
}

impl ModuleParams<'static> {
    /// View that reads the schema defaults for every parameter
    pub fn defaults(info: &'static EffectInfo) -> Self {
        Self { info, values: None }
    }
}

impl<'a> ModuleParams<'a> {
    /// View over explicit values (schema order)
    pub fn from_values(info: &'static EffectInfo, values: &'a [f32]) -> Self {
        Self {
            info,
            values: Some(values),
        }
    }

    /// Value of the parameter at `index` in the effect's schema
    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        match self.values.and_then(|v| v.get(index)) {
            Some(&value) => value,
            None => self.info.params.get(index).map_or(0.0, |p| p.default),
        }
    }

    #[inline]
    pub fn info(&self) -> &'static EffectInfo {
        self.info
    }
}

/// Audio-thread handle onto the published snapshot
#[derive(Clone)]
pub struct ParamReader {
    cell: Arc<SharedCell<ParamSnapshot>>,
}

impl ParamReader {
    pub(crate) fn new(cell: Arc<SharedCell<ParamSnapshot>>) -> Self {
        Self { cell }
    }

    /// Load the current snapshot (real-time safe)
    ///
    /// The returned reference keeps the snapshot alive for the frame; when
    /// it is dropped the memory is reclaimed by the GC thread.
    #[inline]
    pub fn load(&self) -> Shared<ParamSnapshot> {
        self.cell.get()
    }
}
