//! Control-side mirror of the effect chain
//!
//! The editor keeps the staged layout (ids, kinds, enabled flags), allocates
//! module ids and numbers every edit with a generation. While a session is
//! running each edit is validated here first and then sent to the audio
//! thread as one [`ChainCommand`]; while idle only the layout changes, and
//! the next session builds its chain from it.
//!
//! The layout is updated only after the command was queued, so a full queue
//! leaves both sides unchanged.

use basedrop::Owned;

use super::command::{ChainCommand, CommandError, CommandSender, EngineCommand};
use super::gc::gc_handle;
use crate::effect::{ChainError, ChainSlot, EffectChain, EffectKind, ModuleId, MAX_MODULES};
use crate::types::FrameFormat;

/// Reasons an edit was refused before reaching the audio thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// One module in the staged layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleEntry {
    pub id: ModuleId,
    pub kind: EffectKind,
    pub enabled: bool,
}

pub struct ChainEditor {
    layout: Vec<ModuleEntry>,
    next_id: u32,
    requested_generation: u64,
}

impl ChainEditor {
    pub fn new() -> Self {
        Self {
            layout: Vec::with_capacity(MAX_MODULES),
            next_id: 0,
            requested_generation: 0,
        }
    }

    /// Modules in processing order
    pub fn layout(&self) -> &[ModuleEntry] {
        &self.layout
    }

    /// Generation of the last edit handed to the audio thread
    pub fn requested_generation(&self) -> u64 {
        self.requested_generation
    }

    pub fn contains(&self, id: ModuleId) -> bool {
        self.position(id).is_some()
    }

    pub fn kind(&self, id: ModuleId) -> Option<EffectKind> {
        self.entry(id).map(|e| e.kind)
    }

    pub fn entry(&self, id: ModuleId) -> Option<&ModuleEntry> {
        self.layout.iter().find(|e| e.id == id)
    }

    fn position(&self, id: ModuleId) -> Option<usize> {
        self.layout.iter().position(|e| e.id == id)
    }

    fn require(&self, id: ModuleId) -> Result<usize, EditError> {
        self.position(id).ok_or(EditError::Chain(ChainError::UnknownModule(id)))
    }

    fn allocate_id(&self, offset: u32) -> ModuleId {
        ModuleId(self.next_id + offset)
    }

    /// Ids the next [`replace`](Self::replace) with `count` modules will assign
    pub fn upcoming_ids(&self, count: usize) -> impl Iterator<Item = ModuleId> + '_ {
        (0..count as u32).map(|i| self.allocate_id(i))
    }

    /// Queue a command when a session is running
    fn submit(
        &mut self,
        sender: Option<&mut CommandSender>,
        command: impl FnOnce(u64) -> ChainCommand,
    ) -> Result<(), EditError> {
        if let Some(sender) = sender {
            let generation = self.requested_generation + 1;
            sender.send(EngineCommand::Chain {
                generation,
                command: command(generation),
            })?;
            self.requested_generation = generation;
        }
        Ok(())
    }

    /// Build a fresh chain from the layout for a new session
    pub fn build_chain(&self, format: FrameFormat) -> Result<EffectChain, ChainError> {
        let slots = self
            .layout
            .iter()
            .map(|e| ChainSlot::instantiate(e.id, e.kind, &format).with_enabled(e.enabled));
        Ok(EffectChain::from_slots(format, slots)?.with_generation(self.requested_generation))
    }

    /// Insert a new module of `kind` at `position` (clamped to the end)
    pub fn insert(
        &mut self,
        position: usize,
        kind: EffectKind,
        format: &FrameFormat,
        sender: Option<&mut CommandSender>,
    ) -> Result<ModuleId, EditError> {
        if self.layout.len() >= MAX_MODULES {
            return Err(ChainError::Full.into());
        }
        let id = self.allocate_id(0);
        let position = position.min(self.layout.len());
        self.submit(sender, |_| ChainCommand::Insert {
            position,
            slot: ChainSlot::instantiate(id, kind, format),
        })?;
        self.next_id += 1;
        self.layout.insert(position, ModuleEntry { id, kind, enabled: true });
        Ok(id)
    }

    pub fn remove(&mut self, id: ModuleId, sender: Option<&mut CommandSender>) -> Result<ModuleEntry, EditError> {
        let index = self.require(id)?;
        self.submit(sender, |_| ChainCommand::Remove(id))?;
        Ok(self.layout.remove(index))
    }

    pub fn move_to(&mut self, id: ModuleId, position: usize, sender: Option<&mut CommandSender>) -> Result<(), EditError> {
        let index = self.require(id)?;
        self.submit(sender, |_| ChainCommand::Move { module: id, position })?;
        let entry = self.layout.remove(index);
        let position = position.min(self.layout.len());
        self.layout.insert(position, entry);
        Ok(())
    }

    pub fn set_enabled(&mut self, id: ModuleId, enabled: bool, sender: Option<&mut CommandSender>) -> Result<(), EditError> {
        let index = self.require(id)?;
        self.submit(sender, |_| ChainCommand::SetEnabled { module: id, enabled })?;
        self.layout[index].enabled = enabled;
        Ok(())
    }

    pub fn disable_and_reset(&mut self, id: ModuleId, sender: Option<&mut CommandSender>) -> Result<(), EditError> {
        let index = self.require(id)?;
        self.submit(sender, |_| ChainCommand::DisableAndReset(id))?;
        self.layout[index].enabled = false;
        Ok(())
    }

    pub fn reset(&mut self, id: ModuleId, sender: Option<&mut CommandSender>) -> Result<(), EditError> {
        self.require(id)?;
        self.submit(sender, |_| ChainCommand::Reset(id))
    }

    pub fn reset_all(&mut self, sender: Option<&mut CommandSender>) -> Result<(), EditError> {
        self.submit(sender, |_| ChainCommand::ResetAll)
    }

    /// Swap the whole chain for fresh modules of the given kinds
    ///
    /// Returns the new ids in processing order.
    pub fn replace(
        &mut self,
        modules: &[(EffectKind, bool)],
        format: &FrameFormat,
        sender: Option<&mut CommandSender>,
    ) -> Result<Vec<ModuleId>, EditError> {
        if modules.len() > MAX_MODULES {
            return Err(ChainError::Full.into());
        }
        let layout: Vec<ModuleEntry> = modules
            .iter()
            .enumerate()
            .map(|(i, &(kind, enabled))| ModuleEntry {
                id: self.allocate_id(i as u32),
                kind,
                enabled,
            })
            .collect();

        if let Some(sender) = sender {
            let slots = layout
                .iter()
                .map(|e| ChainSlot::instantiate(e.id, e.kind, format).with_enabled(e.enabled));
            let chain = EffectChain::from_slots(*format, slots)?;
            self.submit(Some(sender), |generation| {
                ChainCommand::Replace(Owned::new(&gc_handle(), chain.with_generation(generation)))
            })?;
        }

        self.next_id += layout.len() as u32;
        let ids = layout.iter().map(|e| e.id).collect();
        self.layout = layout;
        Ok(ids)
    }
}

impl Default for ChainEditor {
    fn default() -> Self {
        Self::new()
    }
}
