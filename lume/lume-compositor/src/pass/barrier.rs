//! Barrier/hazard emulation.
//!
//! Placement walks passes in execution order against one [`BarrierState`]. Each pass records
//! the transitions it needs into its own list, which it replays every time it executes. The
//! per-resource access map models read-after-read (no barrier), allowed write-after-write (no
//! barrier) and every other hazard (barrier).

use std::collections::HashMap;

use lume_rhi::{
    GpuResource, ReadBarrier, ResourceAccess, ResourceLayout, ResourceTransition, TextureId,
    TextureSurface,
};

use super::UavDependency;
use crate::error::{CompositorError, Result};

/// A resource bound to a UAV slot by a UAV pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundUav {
    pub resource: GpuResource,
    pub access: ResourceAccess,
}

#[derive(Debug, Clone)]
pub struct BarrierState {
    explicit_api: bool,
    layouts: HashMap<GpuResource, ResourceLayout>,
    access: HashMap<GpuResource, ResourceAccess>,
    bound_uavs: Vec<Option<BoundUav>>,
}

impl BarrierState {
    pub fn new(explicit_api: bool, uav_slots: usize) -> Self {
        Self {
            explicit_api,
            layouts: HashMap::new(),
            access: HashMap::new(),
            bound_uavs: vec![None; uav_slots],
        }
    }

    pub fn explicit_api(&self) -> bool {
        self.explicit_api
    }

    pub fn layout(&self, resource: GpuResource) -> ResourceLayout {
        self.layouts.get(&resource).copied().unwrap_or_default()
    }

    pub fn access(&self, resource: GpuResource) -> ResourceAccess {
        self.access.get(&resource).copied().unwrap_or_default()
    }

    pub fn bound_uav(&self, slot: u32) -> Option<BoundUav> {
        self.bound_uavs.get(slot as usize).copied().flatten()
    }

    pub(crate) fn clear_uavs(&mut self) {
        self.bound_uavs.iter_mut().for_each(|slot| *slot = None);
    }

    pub(crate) fn bind_uav(&mut self, slot: u32, bound: BoundUav) -> Result<()> {
        let num_slots = self.bound_uavs.len();
        let entry = self.bound_uavs.get_mut(slot as usize).ok_or_else(|| {
            CompositorError::InvalidState(format!(
                "UAV slot {} out of range (max {})",
                slot, num_slots
            ))
        })?;
        *entry = Some(bound);
        Ok(())
    }

    /// Records `resource -> new_layout`. Non-explicit APIs additionally merge the barrier bits
    /// into one global barrier at the front of `out`.
    pub(crate) fn transition(
        &mut self,
        out: &mut Vec<ResourceTransition>,
        resource: GpuResource,
        new_layout: ResourceLayout,
        read_barriers: ReadBarrier,
    ) {
        let old_layout = self.layout(resource);
        let transition = ResourceTransition {
            resource: Some(resource),
            old_layout,
            new_layout,
            write_barriers: old_layout.pending_writes(),
            read_barriers,
        };
        if !self.explicit_api {
            match out.first_mut() {
                Some(global) => {
                    global.write_barriers |= transition.write_barriers;
                    global.read_barriers |= transition.read_barriers;
                }
                None => out.push(ResourceTransition {
                    resource: None,
                    old_layout: ResourceLayout::Undefined,
                    new_layout: ResourceLayout::Undefined,
                    write_barriers: transition.write_barriers,
                    read_barriers: transition.read_barriers,
                }),
            }
        }
        out.push(transition);
        self.layouts.insert(resource, new_layout);
    }

    /// Explicit APIs transition anything not already a render target; every API leaves Uav.
    pub(crate) fn require_render_target(&mut self, out: &mut Vec<ResourceTransition>, resource: GpuResource) {
        let layout = self.layout(resource);
        if (layout != ResourceLayout::RenderTarget && self.explicit_api) || layout == ResourceLayout::Uav {
            self.transition(out, resource, ResourceLayout::RenderTarget, ReadBarrier::RENDER_TARGET);
        }
    }

    pub(crate) fn require_texture(&mut self, out: &mut Vec<ResourceTransition>, resource: GpuResource) {
        let layout = self.layout(resource);
        if (layout != ResourceLayout::Texture && self.explicit_api) || layout == ResourceLayout::Uav {
            self.transition(out, resource, ResourceLayout::Texture, ReadBarrier::TEXTURE);
        }
    }

    /// Unconditionally moves `resource` to `layout` unless it is already there.
    pub(crate) fn force_layout(
        &mut self,
        out: &mut Vec<ResourceTransition>,
        resource: GpuResource,
        layout: ResourceLayout,
        read_barriers: ReadBarrier,
    ) {
        if self.layout(resource) != layout {
            self.transition(out, resource, layout, read_barriers);
        }
    }

    /// Moves each surface of `texture` to `layout`, starting from the whole texture's layout.
    /// Afterwards the whole texture is tracked in `layout` again, so later passes sampling or
    /// rendering it see where the surfaces were left.
    pub(crate) fn force_surfaces(
        &mut self,
        out: &mut Vec<ResourceTransition>,
        texture: TextureId,
        surfaces: impl IntoIterator<Item = TextureSurface>,
        layout: ResourceLayout,
        read_barriers: ReadBarrier,
    ) {
        let whole = GpuResource::Texture(texture);
        let start = self.layout(whole);
        for surface in surfaces {
            let resource = GpuResource::Surface(surface);
            self.layouts.insert(resource, start);
            self.force_layout(out, resource, layout, read_barriers);
            self.layouts.remove(&resource);
        }
        self.layouts.insert(whole, layout);
    }

    /// The UAV hazard rule. Skipped only when already in Uav layout and the access pair is
    /// read/read, an allowed write/write, or the previous access is Undefined.
    pub(crate) fn require_uav(
        &mut self,
        out: &mut Vec<ResourceTransition>,
        resource: GpuResource,
        access: ResourceAccess,
        allow_write_after_write: bool,
    ) {
        let layout = self.layout(resource);
        let previous = *self.access.entry(resource).or_insert(ResourceAccess::Undefined);
        let skip = layout == ResourceLayout::Uav
            && ((access == ResourceAccess::Read && previous == ResourceAccess::Read)
                || (access == ResourceAccess::Write
                    && previous == ResourceAccess::Write
                    && allow_write_after_write)
                || previous == ResourceAccess::Undefined);
        if !skip {
            self.transition(out, resource, ResourceLayout::Uav, ReadBarrier::UAV);
        }
        self.access.insert(resource, access);
    }

    /// Resolves each dependency through the bound-UAV table and applies [`Self::require_uav`].
    pub(crate) fn require_uav_dependencies(
        &mut self,
        out: &mut Vec<ResourceTransition>,
        dependencies: &[UavDependency],
        owner: &str,
    ) -> Result<()> {
        for dep in dependencies {
            let bound = self.bound_uav(dep.slot).ok_or_else(|| {
                CompositorError::InvalidState(format!(
                    "{}: UAV slot {} is used but no UAV pass bound it",
                    owner, dep.slot
                ))
            })?;
            if !bound.access.grants(dep.access) {
                return Err(CompositorError::InvalidState(format!(
                    "{}: UAV slot {} is bound for {:?} but used as {:?}",
                    owner, dep.slot, bound.access, dep.access
                )));
            }
            self.require_uav(out, bound.resource, dep.access, dep.allow_write_after_write);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lume_rhi::{BufferId, WriteBarrier};

    const BUF: GpuResource = GpuResource::Buffer(BufferId(7));

    fn uav_between(first: ResourceAccess, second: ResourceAccess, allow_waw: bool) -> usize {
        let mut state = BarrierState::new(true, 8);
        let mut a = Vec::new();
        state.require_uav(&mut a, BUF, first, false);
        let mut b = Vec::new();
        state.require_uav(&mut b, BUF, second, allow_waw);
        b.len()
    }

    #[test]
    fn hazard_taxonomy() {
        use ResourceAccess::*;
        assert_eq!(uav_between(Read, Read, false), 0);
        assert_eq!(uav_between(Write, Read, false), 1);
        assert_eq!(uav_between(Read, Write, false), 1);
        assert_eq!(uav_between(Write, Write, false), 1);
        assert_eq!(uav_between(Write, Write, true), 0);
    }

    #[test]
    fn first_uav_use_transitions_from_undefined() {
        let mut state = BarrierState::new(true, 8);
        let mut out = Vec::new();
        state.require_uav(&mut out, BUF, ResourceAccess::Write, false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].old_layout, ResourceLayout::Undefined);
        assert_eq!(out[0].new_layout, ResourceLayout::Uav);
        assert_eq!(out[0].read_barriers, ReadBarrier::UAV);
        assert_eq!(state.access(BUF), ResourceAccess::Write);
    }

    #[test]
    fn undefined_access_in_uav_layout_is_treated_as_fresh() {
        let mut state = BarrierState::new(true, 8);
        let mut out = Vec::new();
        state.transition(&mut out, BUF, ResourceLayout::Uav, ReadBarrier::UAV);
        out.clear();
        state.require_uav(&mut out, BUF, ResourceAccess::Write, false);
        assert!(out.is_empty());
    }

    #[test]
    fn render_target_rule_depends_on_api() {
        let tex = GpuResource::Texture(TextureId(1));
        let mut explicit = BarrierState::new(true, 1);
        let mut out = Vec::new();
        explicit.require_render_target(&mut out, tex);
        explicit.require_render_target(&mut out, tex);
        assert_eq!(out.len(), 1);

        let mut implicit = BarrierState::new(false, 1);
        let mut out = Vec::new();
        implicit.require_render_target(&mut out, tex);
        assert!(out.is_empty());
        implicit.require_uav(&mut out, tex, ResourceAccess::Write, false);
        let mut out = Vec::new();
        implicit.require_render_target(&mut out, tex);
        // Global barrier first, then the individual transition.
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].resource, None);
        assert_eq!(out[0].write_barriers, WriteBarrier::UAV);
        assert_eq!(out[1].new_layout, ResourceLayout::RenderTarget);
    }

    #[test]
    fn non_explicit_merges_bits_into_first_barrier() {
        let mut state = BarrierState::new(false, 1);
        let a = GpuResource::Texture(TextureId(1));
        let b = GpuResource::Texture(TextureId(2));
        let mut out = Vec::new();
        state.transition(&mut out, a, ResourceLayout::Uav, ReadBarrier::UAV);
        state.transition(&mut out, b, ResourceLayout::Texture, ReadBarrier::TEXTURE);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].read_barriers, ReadBarrier::UAV | ReadBarrier::TEXTURE);
    }

    #[test]
    fn surfaces_start_from_and_fold_back_into_the_texture() {
        let texture = TextureId(3);
        let whole = GpuResource::Texture(texture);
        let surface = |mip| TextureSurface {
            texture,
            face: 0,
            mip,
            slice: 0,
        };
        let mut state = BarrierState::new(true, 1);
        let mut out = Vec::new();
        state.require_texture(&mut out, whole);

        let mut mips = Vec::new();
        state.force_surfaces(
            &mut mips,
            texture,
            [surface(0), surface(1)],
            ResourceLayout::RenderTarget,
            ReadBarrier::RENDER_TARGET,
        );
        assert_eq!(mips.len(), 2);
        assert!(mips.iter().all(|t| t.old_layout == ResourceLayout::Texture));
        assert_eq!(state.layout(whole), ResourceLayout::RenderTarget);
        assert_eq!(state.layout(GpuResource::Surface(surface(0))), ResourceLayout::Undefined);

        let mut sample = Vec::new();
        state.require_texture(&mut sample, whole);
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].old_layout, ResourceLayout::RenderTarget);
    }

    #[test]
    fn dependencies_require_matching_binding() {
        let mut state = BarrierState::new(true, 4);
        let dep = UavDependency {
            slot: 1,
            access: ResourceAccess::Write,
            allow_write_after_write: false,
        };
        let mut out = Vec::new();
        assert!(matches!(
            state.require_uav_dependencies(&mut out, &[dep], "n"),
            Err(CompositorError::InvalidState(_))
        ));
        state
            .bind_uav(
                1,
                BoundUav {
                    resource: BUF,
                    access: ResourceAccess::Read,
                },
            )
            .unwrap();
        assert!(state.require_uav_dependencies(&mut out, &[dep], "n").is_err());
        state
            .bind_uav(
                1,
                BoundUav {
                    resource: BUF,
                    access: ResourceAccess::ReadWrite,
                },
            )
            .unwrap();
        state.require_uav_dependencies(&mut out, &[dep], "n").unwrap();
        assert_eq!(out.len(), 1);
        assert!(state.bind_uav(4, state.bound_uav(1).unwrap()).is_err());
        state.clear_uavs();
        assert!(state.bound_uav(1).is_none());
    }
}
