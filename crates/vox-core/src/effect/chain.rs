//! Effect chain - ordered, fixed-capacity sequence of effect modules
//!
//! The chain is bound to the audio thread and edited there only at frame
//! boundaries (see [`crate::engine::ChainCommand`]). Modules live in an arena
//! of [`MAX_MODULES`] slots with stable indices; the processing order is a
//! separate index list, so reordering never moves module state.
//!
//! Every edit that runs on the audio thread works within capacity reserved
//! at construction. Slots removed from the chain hold their module in a
//! `basedrop::Owned`, so dropping one there only queues it for the collector.

use basedrop::Owned;

use super::{Effect, EffectFault, EffectKind, EffectModule, ModuleId};
use crate::engine::gc::gc_handle;
use crate::params::ParamSnapshot;
use crate::types::{Frame, FrameFormat};

/// Maximum number of modules in one chain
pub const MAX_MODULES: usize = 16;

/// Reasons the audio side rejects a chain edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Effect chain is full ({max} modules)", max = MAX_MODULES)]
    Full,

    #[error("Module {0} is already in the chain")]
    DuplicateId(ModuleId),

    #[error("Module {0} is not in the chain")]
    UnknownModule(ModuleId),

    #[error("Chain was built for a different frame format")]
    FormatMismatch,
}

/// A module fault observed while processing one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleFault {
    pub module: ModuleId,
    pub kind: EffectKind,
    pub fault: EffectFault,
}

/// One module instance with its chain bookkeeping
pub struct ChainSlot {
    id: ModuleId,
    module: Owned<EffectModule>,
    enabled: bool,
}

impl ChainSlot {
    /// Wrap a module for insertion (control thread)
    pub fn new(id: ModuleId, module: EffectModule) -> Self {
        Self {
            id,
            module: Owned::new(&gc_handle(), module),
            enabled: true,
        }
    }

    /// Build a fresh instance of `kind` sized for `format`
    pub fn instantiate(id: ModuleId, kind: EffectKind, format: &FrameFormat) -> Self {
        Self::new(id, kind.instantiate(format))
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn kind(&self) -> EffectKind {
        self.module.kind()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn module(&self) -> &EffectModule {
        &self.module
    }
}

/// Ordered chain of effect modules applied in place to each frame
pub struct EffectChain {
    format: FrameFormat,
    generation: u64,
    slots: Vec<Option<ChainSlot>>,
    order: Vec<usize>,
}

impl EffectChain {
    /// Empty chain for frames of `format`
    pub fn with_format(format: FrameFormat) -> Self {
        let mut slots = Vec::with_capacity(MAX_MODULES);
        slots.resize_with(MAX_MODULES, || None);
        Self {
            format,
            generation: 0,
            slots,
            order: Vec::with_capacity(MAX_MODULES),
        }
    }

    /// Build a chain from slots in processing order (control thread)
    pub fn from_slots(format: FrameFormat, slots: impl IntoIterator<Item = ChainSlot>) -> Result<Self, ChainError> {
        let mut chain = Self::with_format(format);
        for slot in slots {
            chain.insert(chain.len(), slot)?;
        }
        Ok(chain)
    }

    /// Tag the chain with the generation that requested it
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Module ids in processing order
    pub fn ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.iter().map(ChainSlot::id)
    }

    /// Slots in processing order
    pub fn iter(&self) -> impl Iterator<Item = &ChainSlot> + '_ {
        self.order.iter().filter_map(|&i| self.slots[i].as_ref())
    }

    pub fn contains(&self, id: ModuleId) -> bool {
        self.find(id).is_some()
    }

    pub fn slot(&self, id: ModuleId) -> Option<&ChainSlot> {
        self.find(id).and_then(|i| self.slots[i].as_ref())
    }

    /// Arena index of a module
    fn find(&self, id: ModuleId) -> Option<usize> {
        self.order
            .iter()
            .copied()
            .find(|&i| self.slots[i].as_ref().is_some_and(|s| s.id == id))
    }

    fn slot_mut(&mut self, id: ModuleId) -> Result<&mut ChainSlot, ChainError> {
        let index = self.find(id).ok_or(ChainError::UnknownModule(id))?;
        self.slots[index].as_mut().ok_or(ChainError::UnknownModule(id))
    }

    /// Insert a slot at `position` in processing order (clamped to the end)
    pub fn insert(&mut self, position: usize, slot: ChainSlot) -> Result<(), ChainError> {
        if self.contains(slot.id) {
            return Err(ChainError::DuplicateId(slot.id));
        }
        let free = self.slots.iter().position(Option::is_none).ok_or(ChainError::Full)?;
        self.slots[free] = Some(slot);
        self.order.insert(position.min(self.order.len()), free);
        Ok(())
    }

    /// Take a module out of the chain
    ///
    /// Dropping the returned slot on the audio thread defers its
    /// deallocation to the collector.
    pub fn remove(&mut self, id: ModuleId) -> Option<ChainSlot> {
        let index = self.find(id)?;
        self.order.retain(|&i| i != index);
        self.slots[index].take()
    }

    /// Move a module to `position` in processing order (clamped to the end)
    pub fn move_to(&mut self, id: ModuleId, position: usize) -> Result<(), ChainError> {
        let index = self.find(id).ok_or(ChainError::UnknownModule(id))?;
        let from = self
            .order
            .iter()
            .position(|&i| i == index)
            .ok_or(ChainError::UnknownModule(id))?;
        self.order.remove(from);
        self.order.insert(position.min(self.order.len()), index);
        Ok(())
    }

    /// Enable or disable a module; disabled modules keep their state frozen
    pub fn set_enabled(&mut self, id: ModuleId, enabled: bool) -> Result<(), ChainError> {
        self.slot_mut(id)?.enabled = enabled;
        Ok(())
    }

    /// Disable a module and clear its state
    pub fn disable_and_reset(&mut self, id: ModuleId) -> Result<(), ChainError> {
        let slot = self.slot_mut(id)?;
        slot.enabled = false;
        slot.module.reset();
        Ok(())
    }

    pub fn reset_module(&mut self, id: ModuleId) -> Result<(), ChainError> {
        self.slot_mut(id)?.module.reset();
        Ok(())
    }

    pub fn reset_all(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.module.reset();
        }
    }

    /// Total latency of the enabled modules
    pub fn latency_samples(&self) -> u32 {
        self.iter()
            .filter(|s| s.enabled)
            .map(|s| s.module.latency_samples())
            .sum()
    }

    /// Run every enabled module over `frame`, in order
    ///
    /// On the first fault (an error from the module or non-finite output)
    /// the faulting module is reset, the frame is replaced by silence and
    /// the remaining modules are skipped for this frame.
    pub fn process(&mut self, frame: &mut Frame, params: &ParamSnapshot) -> Result<(), ModuleFault> {
        for &index in &self.order {
            let Some(slot) = self.slots[index].as_mut() else {
                continue;
            };
            if !slot.enabled {
                continue;
            }

            let module_params = params.module(slot.id, slot.module.info());
            let result = slot.module.process(frame, &module_params).and_then(|()| {
                if frame.is_finite() {
                    Ok(())
                } else {
                    Err(EffectFault::NonFinite)
                }
            });

            if let Err(fault) = result {
                slot.module.reset();
                frame.fill_silence();
                return Err(ModuleFault {
                    module: slot.id,
                    kind: slot.module.kind(),
                    fault,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::native::testing::sine;

    fn format() -> FrameFormat {
        FrameFormat::mono(44100, 256).unwrap()
    }

    fn chain_of(kinds: &[EffectKind]) -> EffectChain {
        let format = format();
        EffectChain::from_slots(
            format,
            kinds
                .iter()
                .enumerate()
                .map(|(i, &kind)| ChainSlot::instantiate(ModuleId(i as u32), kind, &format)),
        )
        .unwrap()
    }

    fn frame_of(samples: &[f32]) -> Frame {
        Frame::from_interleaved(1, samples.to_vec())
    }

    #[test]
    fn test_all_disabled_is_identity() {
        let mut chain = chain_of(&EffectKind::ALL);
        for id in 0..EffectKind::ALL.len() as u32 {
            chain.set_enabled(ModuleId(id), false).unwrap();
        }
        let input = sine(440.0, 256, 0.8);
        let mut frame = frame_of(&input);
        chain.process(&mut frame, &ParamSnapshot::default()).unwrap();
        assert_eq!(frame.as_slice(), &input[..]);
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let mut chain = EffectChain::with_format(format());
        let input = sine(440.0, 256, 0.8);
        let mut frame = frame_of(&input);
        chain.process(&mut frame, &ParamSnapshot::default()).unwrap();
        assert_eq!(frame.as_slice(), &input[..]);
    }

    #[test]
    fn test_silence_through_distortion_and_low_pass() {
        let format = format();
        let mut chain = chain_of(&[EffectKind::Distortion, EffectKind::LowPass]);
        let mut store = crate::params::ParamStore::new();
        store.register(ModuleId(0), EffectKind::Distortion.info());
        store.register(ModuleId(1), EffectKind::LowPass.info());
        store.set(ModuleId(0), "drive", 1.0).unwrap();
        store.set(ModuleId(1), "cutoff", format.nyquist() / 2.0).unwrap();
        let snapshot = store.reader().load();

        for _ in 0..20 {
            let mut frame = frame_of(&[0.0; 256]);
            chain.process(&mut frame, &snapshot).unwrap();
            assert!(frame.as_slice().iter().all(|s| s.abs() < 1e-9));
        }
    }

    #[test]
    fn test_insert_order_and_move() {
        let mut chain = chain_of(&[EffectKind::Gain, EffectKind::Echo, EffectKind::Robot]);
        assert_eq!(chain.ids().collect::<Vec<_>>(), vec![ModuleId(0), ModuleId(1), ModuleId(2)]);

        chain.move_to(ModuleId(2), 0).unwrap();
        assert_eq!(chain.ids().collect::<Vec<_>>(), vec![ModuleId(2), ModuleId(0), ModuleId(1)]);

        chain.move_to(ModuleId(2), 99).unwrap();
        assert_eq!(chain.ids().collect::<Vec<_>>(), vec![ModuleId(0), ModuleId(1), ModuleId(2)]);

        let removed = chain.remove(ModuleId(1)).unwrap();
        assert_eq!(removed.kind(), EffectKind::Echo);
        assert_eq!(chain.ids().collect::<Vec<_>>(), vec![ModuleId(0), ModuleId(2)]);
        assert!(chain.remove(ModuleId(1)).is_none());

        // Freed slot is reused
        let slot = ChainSlot::instantiate(ModuleId(7), EffectKind::Chorus, &format());
        chain.insert(1, slot).unwrap();
        assert_eq!(chain.ids().collect::<Vec<_>>(), vec![ModuleId(0), ModuleId(7), ModuleId(2)]);
    }

    #[test]
    fn test_capacity_and_duplicates() {
        let format = format();
        let mut chain = EffectChain::with_format(format);
        for i in 0..MAX_MODULES as u32 {
            chain
                .insert(usize::MAX, ChainSlot::instantiate(ModuleId(i), EffectKind::Gain, &format))
                .unwrap();
        }
        let extra = ChainSlot::instantiate(ModuleId(100), EffectKind::Gain, &format);
        assert_eq!(chain.insert(0, extra), Err(ChainError::Full));

        chain.remove(ModuleId(3));
        let dup = ChainSlot::instantiate(ModuleId(4), EffectKind::Gain, &format);
        assert_eq!(chain.insert(0, dup), Err(ChainError::DuplicateId(ModuleId(4))));
        assert_eq!(chain.len(), MAX_MODULES - 1);
    }

    #[test]
    fn test_unknown_module_errors() {
        let mut chain = chain_of(&[EffectKind::Gain]);
        assert_eq!(chain.set_enabled(ModuleId(9), false), Err(ChainError::UnknownModule(ModuleId(9))));
        assert_eq!(chain.move_to(ModuleId(9), 0), Err(ChainError::UnknownModule(ModuleId(9))));
        assert_eq!(chain.reset_module(ModuleId(9)), Err(ChainError::UnknownModule(ModuleId(9))));
    }

    #[test]
    fn test_fault_silences_frame_and_resets_module() {
        let mut chain = chain_of(&[EffectKind::Echo, EffectKind::Gain]);
        let params = ParamSnapshot::default();

        let mut frame = frame_of(&sine(300.0, 256, 0.5));
        chain.process(&mut frame, &params).unwrap();

        let mut bad = frame_of(&[f32::INFINITY; 256]);
        let fault = chain.process(&mut bad, &params).unwrap_err();
        assert_eq!(fault.module, ModuleId(0));
        assert_eq!(fault.kind, EffectKind::Echo);
        assert_eq!(fault.fault, EffectFault::NonFinite);
        assert!(bad.as_slice().iter().all(|&s| s == 0.0));

        // Echo was flushed: silence in gives silence out
        for _ in 0..40 {
            let mut frame = frame_of(&[0.0; 256]);
            chain.process(&mut frame, &params).unwrap();
            assert!(frame.as_slice().iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_disable_freezes_state() {
        let mut chain = chain_of(&[EffectKind::Echo]);
        let params = ParamSnapshot::default();
        let mut impulse = vec![0.0; 256];
        impulse[0] = 1.0;

        chain.process(&mut frame_of(&impulse), &params).unwrap();
        chain.set_enabled(ModuleId(0), false).unwrap();
        for _ in 0..100 {
            chain.process(&mut frame_of(&[0.0; 256]), &params).unwrap();
        }
        chain.set_enabled(ModuleId(0), true).unwrap();

        // The echo tail is still pending after re-enabling
        let mut energy = 0.0;
        for _ in 0..40 {
            let mut frame = frame_of(&[0.0; 256]);
            chain.process(&mut frame, &params).unwrap();
            energy += frame.as_slice().iter().map(|s| s * s).sum::<f32>();
        }
        assert!(energy > 0.0);
    }

    #[test]
    fn test_disable_and_reset_flushes_state() {
        let mut chain = chain_of(&[EffectKind::Echo]);
        let params = ParamSnapshot::default();
        let mut impulse = vec![0.0; 256];
        impulse[0] = 1.0;

        chain.process(&mut frame_of(&impulse), &params).unwrap();
        chain.disable_and_reset(ModuleId(0)).unwrap();
        assert!(!chain.slot(ModuleId(0)).unwrap().is_enabled());
        chain.set_enabled(ModuleId(0), true).unwrap();

        for _ in 0..40 {
            let mut frame = frame_of(&[0.0; 256]);
            chain.process(&mut frame, &params).unwrap();
            assert!(frame.as_slice().iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_latency_counts_enabled_modules() {
        let mut chain = chain_of(&[EffectKind::Gain, EffectKind::PitchShift]);
        assert_eq!(chain.latency_samples(), 0);
        chain.set_enabled(ModuleId(1), false).unwrap();
        assert_eq!(chain.latency_samples(), 0);
    }
}
