//! Per-frame control flow
//!
//! [`DeferredRenderer::render`] runs one frame:
//! 1. Open the root texture unit context
//! 2. Render the shadow maps of every visible shadow-casting light
//! 3. Open the camera observer and run the stencil, geometry and lighting
//!    passes against pooled targets
//! 4. Finish the shadow map context and the root context
//!
//! Shadows are evaluated through a dedicated [`Matrices`], so the camera
//! observer is never nested inside a shadow observer.

use glam::Mat4;

use crate::backend::{
    ClearValues, FramebufferDescriptor, GraphicsBackend, MagFilter, MinFilter, TextureFormat,
};
use crate::error::RenderResult;
use crate::pipeline::gbuffer_pass::GeometryPass;
use crate::pipeline::lighting_pass::LightingPass;
use crate::pipeline::mask_pass::MaskPass;
use crate::pipeline::profiling::ProfilingContext;
use crate::pipeline::stencil_pass::StencilPass;
use crate::pipeline::{DeferredShaders, PipelineConfig};
use crate::resources::{
    Area, PoolLimits, RenderTarget, RenderTargetDescription, RenderTargetKind, RenderTargetPool,
    TextureUnitAllocator, TextureUnitContext,
};
use crate::scene::{
    DepthInstances, MaskInstances, Matrices, MatricesObserver, Projection, SceneLights,
    SceneOpaques, SceneStencils,
};
use crate::shadow::{DepthVarianceShaderRenderer, ShadowMapContext, ShadowMapRenderer};

/// Visible content and camera of one frame
#[derive(Debug, Clone, Copy)]
pub struct DeferredFrame<'a> {
    /// Area of the lit image
    pub area: Area,
    pub view: Mat4,
    pub projection: Projection,
    pub opaques: &'a SceneOpaques<'a>,
    pub lights: &'a SceneLights<'a>,
    pub stencils: &'a SceneStencils<'a>,
    /// Instances drawn into every shadow map
    pub shadow_casters: &'a DepthInstances<'a>,
}

/// Description of the lit image produced by a frame
pub fn lit_image_description(area: Area) -> RenderTargetDescription {
    RenderTargetDescription::new(
        area,
        RenderTargetKind::Image {
            format: TextureFormat::Rgba16Float,
            depth: None,
            min_filter: MinFilter::Linear,
            mag_filter: MagFilter::Linear,
        },
    )
}

/// Owner of the per-process state of the deferred pipeline
#[derive(Debug)]
pub struct DeferredRenderer {
    config: PipelineConfig,
    shaders: DeferredShaders,
    units: TextureUnitAllocator,
    targets: RenderTargetPool,
    shadows: ShadowMapRenderer,
    matrices: Matrices,
    shadow_matrices: Matrices,
    frames: u64,
}

impl DeferredRenderer {
    pub fn new(
        backend: &dyn GraphicsBackend,
        config: PipelineConfig,
        shaders: DeferredShaders,
    ) -> Self {
        let units: Vec<_> = backend
            .texture_units()
            .into_iter()
            .take(config.texture_units)
            .collect();
        let limits = PoolLimits {
            soft: config.render_target_soft_limit,
            hard: config.render_target_hard_limit,
        };
        let depth = DepthVarianceShaderRenderer::new(shaders.depth_single, shaders.depth_batched);
        log::debug!(
            "Deferred renderer on `{}`: {} texture units",
            backend.name(),
            units.len()
        );
        Self {
            units: TextureUnitAllocator::new(config.texture_unit_stack_depth, units),
            targets: RenderTargetPool::new("frame", limits),
            shadows: ShadowMapRenderer::new(RenderTargetPool::new("shadows", limits), depth),
            matrices: Matrices::new(),
            shadow_matrices: Matrices::new(),
            config,
            shaders,
            frames: 0,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn texture_units(&self) -> &TextureUnitAllocator {
        &self.units
    }

    pub fn targets(&self) -> &RenderTargetPool {
        &self.targets
    }

    pub fn shadows(&self) -> &ShadowMapRenderer {
        &self.shadows
    }

    /// Number of frames rendered so far
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Empty opaque collection honouring the configured group count
    pub fn opaques<'a>(&self) -> SceneOpaques<'a> {
        SceneOpaques::with_maximum_groups(self.config.maximum_groups)
    }

    /// Empty light collection honouring the configured group count
    pub fn lights<'a>(&self) -> SceneLights<'a> {
        SceneLights::with_maximum_groups(self.config.maximum_groups)
    }

    /// Render `frame` and return the lit image. The caller hands the image
    /// back with [`DeferredRenderer::return_target`] once it is consumed.
    pub fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &DeferredFrame<'_>,
        profiling: &mut dyn ProfilingContext,
    ) -> RenderResult<RenderTarget> {
        let root = self.units.root_context()?;
        let result = self.render_with(backend, &root, frame, profiling);
        let finished = root.finish(backend);
        self.frames += 1;
        match (result, finished) {
            (Ok(output), Ok(())) => Ok(output),
            (Ok(output), Err(err)) => {
                self.targets.return_target(output)?;
                Err(err)
            }
            (Err(err), _) => Err(err),
        }
    }

    fn render_with(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        root: &TextureUnitContext,
        frame: &DeferredFrame<'_>,
        profiling: &mut dyn ProfilingContext,
    ) -> RenderResult<RenderTarget> {
        self.targets.trim(backend);

        profiling.begin("shadows");
        let shadows = render_shadows(
            &mut self.shadows,
            backend,
            root,
            &self.shadow_matrices,
            frame,
        );
        profiling.end("shadows");
        let mut shadows = shadows?;

        let targets = &mut self.targets;
        let shaders = &self.shaders;
        let result = self
            .matrices
            .with_observer(frame.view, frame.projection, |observer| {
                render_scene(
                    backend, root, observer, targets, shaders, &shadows, frame, profiling,
                )
            });
        let finished = shadows.finish();

        let output = result?;
        if let Err(err) = finished {
            self.targets.return_target(output)?;
            return Err(err);
        }
        Ok(output)
    }

    /// Render `instances` into a coverage mask over `area`.
    pub fn render_mask(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        view: Mat4,
        projection: Projection,
        area: Area,
        instances: &MaskInstances<'_>,
    ) -> RenderResult<RenderTarget> {
        let root = self.units.root_context()?;
        let result = self.render_mask_with(backend, &root, view, projection, area, instances);
        let finished = root.finish(backend);
        let target = result?;
        if let Err(err) = finished {
            self.targets.return_target(target)?;
            return Err(err);
        }
        Ok(target)
    }

    fn render_mask_with(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        root: &TextureUnitContext,
        view: Mat4,
        projection: Projection,
        area: Area,
        instances: &MaskInstances<'_>,
    ) -> RenderResult<RenderTarget> {
        let target = self
            .targets
            .get(backend, root, &RenderTargetDescription::mask(area))?;
        let shaders = self.shaders.mask;
        let drawn = self.matrices.with_observer(view, projection, |observer| {
            instances.execute(&mut MaskPass::new(backend, observer, &target, shaders))
        });
        match drawn {
            Ok(()) => Ok(target),
            Err(err) => {
                self.targets.return_target(target)?;
                Err(err)
            }
        }
    }

    /// Hand a target produced by this renderer back for reuse. After
    /// [`DeferredRenderer::delete`] the target is destroyed instead.
    pub fn return_target(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        target: RenderTarget,
    ) -> RenderResult<()> {
        self.targets.release(backend, target)
    }

    /// Destroy every pooled target and shadow map.
    pub fn delete(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        let root = self.units.root_context()?;
        let shadows = self.shadows.delete(backend, &root);
        let targets = self.targets.delete(backend, &root);
        let finished = root.finish(backend);
        log::debug!("Deferred renderer deleted after {} frame(s)", self.frames);
        shadows.and(targets).and(finished)
    }
}

fn render_shadows<'r>(
    renderer: &'r mut ShadowMapRenderer,
    backend: &mut dyn GraphicsBackend,
    tc: &TextureUnitContext,
    matrices: &Matrices,
    frame: &DeferredFrame<'_>,
) -> RenderResult<ShadowMapContext<'r>> {
    let mut execution = renderer.begin()?;
    for light in frame.lights.shadow_casters() {
        execution.render_light(backend, tc, matrices, light, frame.shadow_casters)?;
    }
    execution.complete()
}

#[allow(clippy::too_many_arguments)]
fn render_scene(
    backend: &mut dyn GraphicsBackend,
    tc: &TextureUnitContext,
    observer: &MatricesObserver<'_>,
    targets: &mut RenderTargetPool,
    shaders: &DeferredShaders,
    shadows: &ShadowMapContext<'_>,
    frame: &DeferredFrame<'_>,
    profiling: &mut dyn ProfilingContext,
) -> RenderResult<RenderTarget> {
    let gbuffer = targets.get(backend, tc, &RenderTargetDescription::geometry(frame.area))?;
    let output = match targets.get(backend, tc, &lit_image_description(frame.area)) {
        Ok(output) => output,
        Err(err) => {
            targets.return_target(gbuffer)?;
            return Err(err);
        }
    };

    let drawn = draw_passes(
        backend, tc, observer, &gbuffer, &output, shaders, shadows, frame, profiling,
    );
    let returned = targets.return_target(gbuffer);
    match drawn.and(returned) {
        Ok(()) => Ok(output),
        Err(err) => {
            targets.return_target(output)?;
            Err(err)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_passes(
    backend: &mut dyn GraphicsBackend,
    tc: &TextureUnitContext,
    observer: &MatricesObserver<'_>,
    gbuffer: &RenderTarget,
    output: &RenderTarget,
    shaders: &DeferredShaders,
    shadows: &ShadowMapContext<'_>,
    frame: &DeferredFrame<'_>,
    profiling: &mut dyn ProfilingContext,
) -> RenderResult<()> {
    profiling.begin("stencils");
    let stencils = frame
        .stencils
        .execute(&mut StencilPass::new(backend, observer, gbuffer, shaders.stencil));
    profiling.end("stencils");
    stencils?;

    profiling.begin("geometry");
    let geometry = frame
        .opaques
        .execute(&mut GeometryPass::new(backend, tc, observer, gbuffer));
    profiling.end("geometry");
    geometry?;

    // The light target shares the G-buffer's depth-stencil attachment
    let framebuffer = backend.create_framebuffer(&FramebufferDescriptor {
        label: Some("lighting".into()),
        color_attachments: output.color_textures().to_vec(),
        depth_attachment: gbuffer.depth_texture(),
    })?;
    output.bind_for_drawing(backend);
    backend.bind_framebuffer(Some(framebuffer));
    backend.clear(&ClearValues {
        color: Some([0.0, 0.0, 0.0, 1.0]),
        depth: None,
        stencil: None,
    });

    profiling.begin("lighting");
    let lighting = frame.lights.execute(&mut LightingPass::new(
        backend,
        tc,
        observer,
        gbuffer,
        shadows,
        shaders.clip_volume,
    ));
    profiling.end("lighting");

    backend.bind_framebuffer(None);
    backend.destroy_framebuffer(framebuffer);
    lighting
}
