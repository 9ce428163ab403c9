//! Per-frame shadow map execution
//!
//! [`ShadowMapRenderer::begin`] opens a [`ShadowMapExecution`]. While it is
//! active, [`ShadowMapExecution::render_light`] renders one depth-variance
//! map per shadow-casting light. [`ShadowMapExecution::complete`] ends the
//! execution and hands the maps to a [`ShadowMapContext`], which answers
//! lookups until [`ShadowMapContext::finish`] returns the maps to the pool.

use std::collections::BTreeMap;

use glam::Mat4;

use crate::backend::{GraphicsBackend, TextureHandle};
use crate::error::{RenderError, RenderResult};
use crate::resources::{RenderTarget, RenderTargetPool, TextureUnitContext};
use crate::scene::{
    DepthInstances, Light, LightId, Matrices, Projection, ShadowDepthVariance, ShadowId,
    TransformContext,
};
use crate::shadow::depth::DepthVarianceRenderer;

/// Owner of the shadow map pool and the caster renderer
pub struct ShadowMapRenderer {
    pool: RenderTargetPool,
    depth: Box<dyn DepthVarianceRenderer>,
}

impl std::fmt::Debug for ShadowMapRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowMapRenderer")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl ShadowMapRenderer {
    pub fn new(pool: RenderTargetPool, depth: impl DepthVarianceRenderer + 'static) -> Self {
        Self {
            pool,
            depth: Box::new(depth),
        }
    }

    pub fn pool(&self) -> &RenderTargetPool {
        &self.pool
    }

    /// Start a new execution. The renderer stays borrowed until the
    /// execution and the context it produces are gone.
    pub fn begin(&mut self) -> RenderResult<ShadowMapExecution<'_>> {
        if self.pool.is_deleted() {
            return Err(RenderError::PoolDeleted(self.pool.label().to_string()));
        }
        log::debug!("Shadow execution started");
        Ok(ShadowMapExecution {
            state: ExecutionState::Active,
            renderer: Some(self),
            maps: BTreeMap::new(),
        })
    }

    /// Destroy every pooled shadow map.
    pub fn delete(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        tc: &TextureUnitContext,
    ) -> RenderResult<()> {
        self.pool.delete(backend, tc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutionState {
    Active,
    Complete,
}

/// A shadow map rendered for one light
#[derive(Debug)]
pub struct ShadowMap {
    pub shadow: ShadowId,
    pub target: RenderTarget,
}

impl ShadowMap {
    /// Texture holding the depth moments
    pub fn texture(&self) -> Option<TextureHandle> {
        self.target.color_texture(0)
    }
}

/// Shadow maps being rendered this frame
#[derive(Debug)]
pub struct ShadowMapExecution<'r> {
    state: ExecutionState,
    renderer: Option<&'r mut ShadowMapRenderer>,
    maps: BTreeMap<LightId, ShadowMap>,
}

impl<'r> ShadowMapExecution<'r> {
    pub fn is_active(&self) -> bool {
        self.state == ExecutionState::Active
    }

    /// Number of maps rendered so far
    pub fn rendered_count(&self) -> usize {
        self.maps.len()
    }

    /// Render the shadow map of `light` from `instances`.
    ///
    /// Rendering a light a second time replaces its previous map.
    pub fn render_light(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        tc: &TextureUnitContext,
        matrices: &Matrices,
        light: &Light,
        instances: &DepthInstances<'_>,
    ) -> RenderResult<()> {
        let renderer = match (self.state, self.renderer.as_deref_mut()) {
            (ExecutionState::Active, Some(renderer)) => renderer,
            _ => return Err(RenderError::ExecutionNotActive),
        };
        let projective = match light {
            Light::Projective(projective) => projective,
            Light::Volume(volume) => return Err(RenderError::LightWithoutShadow(volume.id)),
        };
        let shadow = projective
            .shadow
            .as_ref()
            .ok_or(RenderError::LightWithoutShadow(projective.id))?;

        let view = TransformContext::with_thread_local(|ctx| projective.view_matrix(ctx))?;
        let target = renderer.pool.get(backend, tc, &shadow.map_description)?;
        let rendered = render_map(
            backend,
            tc,
            matrices,
            renderer.depth.as_mut(),
            &target,
            view,
            projective.projection,
            shadow,
            instances,
        );
        backend.bind_framebuffer(None);

        if let Err(err) = rendered {
            renderer.pool.return_target(target)?;
            return Err(err);
        }

        log::trace!(
            "Shadow {:?} rendered for light {:?}",
            shadow.shadow_id,
            projective.id
        );
        let map = ShadowMap {
            shadow: shadow.shadow_id,
            target,
        };
        if let Some(previous) = self.maps.insert(projective.id, map) {
            log::warn!("Light {:?} rendered twice in one execution", projective.id);
            renderer.pool.return_target(previous.target)?;
        }
        Ok(())
    }

    /// End the execution and hand the maps to a lookup context.
    pub fn complete(&mut self) -> RenderResult<ShadowMapContext<'r>> {
        let renderer = match (self.state, self.renderer.take()) {
            (ExecutionState::Active, Some(renderer)) => renderer,
            _ => return Err(RenderError::ExecutionNotActive),
        };
        self.state = ExecutionState::Complete;
        log::debug!("Shadow execution complete ({} map(s))", self.maps.len());
        Ok(ShadowMapContext {
            state: ContextState::Active,
            pool: &mut renderer.pool,
            maps: std::mem::take(&mut self.maps),
        })
    }
}

impl Drop for ShadowMapExecution<'_> {
    fn drop(&mut self) {
        if let Some(renderer) = self.renderer.as_deref_mut() {
            if !self.maps.is_empty() {
                log::warn!(
                    "Shadow execution dropped before completion, returning {} map(s)",
                    self.maps.len()
                );
            }
            for (_, map) in std::mem::take(&mut self.maps) {
                let _ = renderer.pool.return_target(map.target);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn render_map(
    backend: &mut dyn GraphicsBackend,
    tc: &TextureUnitContext,
    matrices: &Matrices,
    depth: &mut dyn DepthVarianceRenderer,
    target: &RenderTarget,
    view: Mat4,
    projection: Projection,
    shadow: &ShadowDepthVariance,
    instances: &DepthInstances<'_>,
) -> RenderResult<()> {
    target.bind_for_drawing(backend);
    matrices.with_observer(view, projection, |observer| {
        depth.render_depth_variance(backend, tc, observer, shadow, instances)
    })?;
    if !shadow.map_description.kind.min_filter().is_mipmapped() {
        return Ok(());
    }
    if let Some(texture) = target.color_texture(0) {
        tc.with_child(backend, |backend, child| {
            let unit = child.bind_texture(backend, texture)?;
            backend.regenerate_mipmaps(unit);
            Ok(())
        })?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    Active,
    Finished,
}

/// Read-only view of the shadow maps of a completed execution
#[derive(Debug)]
pub struct ShadowMapContext<'r> {
    state: ContextState,
    pool: &'r mut RenderTargetPool,
    maps: BTreeMap<LightId, ShadowMap>,
}

impl ShadowMapContext<'_> {
    pub fn is_active(&self) -> bool {
        self.state == ContextState::Active
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Shadow map rendered for `light`.
    pub fn get(&self, light: &Light) -> RenderResult<&ShadowMap> {
        if self.state != ContextState::Active {
            return Err(RenderError::ContextNotActive);
        }
        let shadow = light
            .shadow()
            .ok_or(RenderError::LightWithoutShadow(light.id()))?;
        match self.maps.get(&light.id()) {
            Some(map) if map.shadow == shadow.shadow_id => Ok(map),
            _ => Err(RenderError::ShadowNotRendered {
                light: light.id(),
                shadow: shadow.shadow_id,
            }),
        }
    }

    /// Return every map to the pool. Lookups fail afterwards.
    pub fn finish(&mut self) -> RenderResult<()> {
        if self.state != ContextState::Active {
            return Err(RenderError::ContextNotActive);
        }
        self.state = ContextState::Finished;
        self.release()
    }

    fn release(&mut self) -> RenderResult<()> {
        let mut result = Ok(());
        for (_, map) in std::mem::take(&mut self.maps) {
            let returned = self.pool.return_target(map.target);
            if result.is_ok() {
                result = returned;
            }
        }
        result
    }
}

impl Drop for ShadowMapContext<'_> {
    fn drop(&mut self) {
        if self.state == ContextState::Active {
            if !self.maps.is_empty() {
                log::warn!(
                    "Shadow map context dropped without finish, returning {} map(s)",
                    self.maps.len()
                );
            }
            let _ = self.release();
        }
    }
}
