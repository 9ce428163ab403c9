//! Render target descriptions and live render targets
//!
//! Every description is an [`Area`] plus a [`RenderTargetKind`]. The kind
//! fixes the attachment layout; the area is the only part that changes when
//! a description is rescaled, so two descriptions with equal kinds can share
//! pooled targets.

use crate::backend::{
    FramebufferDescriptor, FramebufferHandle, GraphicsBackend, MagFilter, MinFilter,
    TextureDescriptor, TextureFormat, TextureHandle,
};
use crate::error::{RenderError, RenderResult};
use crate::resources::texture_unit::TextureUnitContext;

/// Axis-aligned pixel rectangle, inclusive on both ends and never empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Area {
    x_min: u32,
    y_min: u32,
    x_max: u32,
    y_max: u32,
}

impl Area {
    pub fn new(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> RenderResult<Self> {
        if x_max < x_min || y_max < y_min {
            return Err(RenderError::InvalidArea(format!(
                "[{}, {}]..[{}, {}] is empty",
                x_min, y_min, x_max, y_max
            )));
        }
        // The extent must fit in a u32 so width and height never overflow
        if x_max - x_min == u32::MAX || y_max - y_min == u32::MAX {
            return Err(RenderError::InvalidArea(format!(
                "[{}, {}]..[{}, {}] is wider than {} pixels",
                x_min,
                y_min,
                x_max,
                y_max,
                u32::MAX
            )));
        }
        Ok(Self {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }

    /// Area of `width` x `height` pixels anchored at the origin
    pub fn of_size(width: u32, height: u32) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidArea(format!(
                "{}x{} has no pixels",
                width, height
            )));
        }
        Self::new(0, 0, width - 1, height - 1)
    }

    pub fn x_min(&self) -> u32 {
        self.x_min
    }

    pub fn y_min(&self) -> u32 {
        self.y_min
    }

    pub fn x_max(&self) -> u32 {
        self.x_max
    }

    pub fn y_max(&self) -> u32 {
        self.y_max
    }

    pub fn width(&self) -> u32 {
        self.x_max - self.x_min + 1
    }

    pub fn height(&self) -> u32 {
        self.y_max - self.y_min + 1
    }

    pub fn pixels(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Scale both extents by `factor`, keeping at least one pixel. Extents
    /// saturate at the largest area that still fits from the same origin.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            x_min: self.x_min,
            y_min: self.y_min,
            x_max: self.x_min + (scale_extent(self.width(), self.x_min, factor) - 1),
            y_max: self.y_min + (scale_extent(self.height(), self.y_min, factor) - 1),
        }
    }
}

/// Scaled extent in `1..=u32::MAX - origin`
fn scale_extent(extent: u32, origin: u32, factor: f64) -> u32 {
    let limit = u32::MAX - origin;
    // `as` saturates and maps NaN to zero
    let scaled = (extent as f64 * factor).round() as u64;
    scaled.clamp(1, limit.max(1) as u64) as u32
}

/// Depth attachment precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthPrecision {
    Depth16,
    Depth24,
    Depth32Float,
}

impl DepthPrecision {
    fn format(&self) -> TextureFormat {
        match self {
            DepthPrecision::Depth16 => TextureFormat::Depth16,
            DepthPrecision::Depth24 => TextureFormat::Depth24,
            DepthPrecision::Depth32Float => TextureFormat::Depth32Float,
        }
    }
}

/// Precision of the two depth moments in a depth-variance map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthVariancePrecision {
    Float16,
    Float32,
}

/// Attachment layout of a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTargetKind {
    /// One color attachment and an optional depth attachment
    Image {
        format: TextureFormat,
        depth: Option<DepthPrecision>,
        min_filter: MinFilter,
        mag_filter: MagFilter,
    },
    /// Albedo, normal and specular attachments over a depth-stencil buffer
    Geometry,
    /// Two depth moments over a plain depth buffer
    DepthVariance {
        depth: DepthPrecision,
        precision: DepthVariancePrecision,
        min_filter: MinFilter,
        mag_filter: MagFilter,
    },
    /// Single-channel occlusion term
    AmbientOcclusion {
        format: TextureFormat,
        min_filter: MinFilter,
        mag_filter: MagFilter,
    },
    /// Single-channel mask over a depth-stencil buffer
    Mask,
}

impl RenderTargetKind {
    fn label(&self) -> &'static str {
        match self {
            RenderTargetKind::Image { .. } => "image",
            RenderTargetKind::Geometry => "geometry",
            RenderTargetKind::DepthVariance { .. } => "depth-variance",
            RenderTargetKind::AmbientOcclusion { .. } => "ambient-occlusion",
            RenderTargetKind::Mask => "mask",
        }
    }

    /// Minification filter of the first color attachment
    pub fn min_filter(&self) -> MinFilter {
        match self {
            RenderTargetKind::Image { min_filter, .. }
            | RenderTargetKind::DepthVariance { min_filter, .. }
            | RenderTargetKind::AmbientOcclusion { min_filter, .. } => *min_filter,
            RenderTargetKind::Geometry | RenderTargetKind::Mask => MinFilter::Nearest,
        }
    }

    fn color_formats(&self) -> Vec<TextureFormat> {
        match self {
            RenderTargetKind::Image { format, .. } => vec![*format],
            RenderTargetKind::Geometry => vec![
                TextureFormat::Rgba8Unorm,
                TextureFormat::Rg16Float,
                TextureFormat::Rgba8Unorm,
            ],
            RenderTargetKind::DepthVariance { precision, .. } => match precision {
                DepthVariancePrecision::Float16 => vec![TextureFormat::Rg16Float],
                DepthVariancePrecision::Float32 => vec![TextureFormat::Rg32Float],
            },
            RenderTargetKind::AmbientOcclusion { format, .. } => vec![*format],
            RenderTargetKind::Mask => vec![TextureFormat::R8Unorm],
        }
    }

    fn depth_format(&self) -> Option<TextureFormat> {
        match self {
            RenderTargetKind::Image { depth, .. } => depth.map(|d| d.format()),
            RenderTargetKind::Geometry | RenderTargetKind::Mask => {
                Some(TextureFormat::Depth24Stencil8)
            }
            RenderTargetKind::DepthVariance { depth, .. } => Some(depth.format()),
            RenderTargetKind::AmbientOcclusion { .. } => None,
        }
    }

    fn filters(&self) -> (MinFilter, MagFilter) {
        match self {
            RenderTargetKind::Image {
                min_filter,
                mag_filter,
                ..
            }
            | RenderTargetKind::DepthVariance {
                min_filter,
                mag_filter,
                ..
            }
            | RenderTargetKind::AmbientOcclusion {
                min_filter,
                mag_filter,
                ..
            } => (*min_filter, *mag_filter),
            RenderTargetKind::Geometry | RenderTargetKind::Mask => {
                (MinFilter::Nearest, MagFilter::Nearest)
            }
        }
    }
}

/// Immutable description of a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetDescription {
    pub area: Area,
    pub kind: RenderTargetKind,
}

impl RenderTargetDescription {
    pub fn new(area: Area, kind: RenderTargetKind) -> Self {
        Self { area, kind }
    }

    pub fn geometry(area: Area) -> Self {
        Self::new(area, RenderTargetKind::Geometry)
    }

    pub fn mask(area: Area) -> Self {
        Self::new(area, RenderTargetKind::Mask)
    }

    /// Linear-filtered RGBA16F image with a 24-bit depth buffer
    pub fn image(area: Area) -> Self {
        Self::new(
            area,
            RenderTargetKind::Image {
                format: TextureFormat::Rgba16Float,
                depth: Some(DepthPrecision::Depth24),
                min_filter: MinFilter::Linear,
                mag_filter: MagFilter::Linear,
            },
        )
    }

    /// 16-bit moments with trilinear filtering and a 24-bit depth buffer
    pub fn depth_variance(area: Area) -> Self {
        Self::new(
            area,
            RenderTargetKind::DepthVariance {
                depth: DepthPrecision::Depth24,
                precision: DepthVariancePrecision::Float16,
                min_filter: MinFilter::LinearMipmapLinear,
                mag_filter: MagFilter::Linear,
            },
        )
    }

    pub fn ambient_occlusion(area: Area) -> Self {
        Self::new(
            area,
            RenderTargetKind::AmbientOcclusion {
                format: TextureFormat::R8Unorm,
                min_filter: MinFilter::Linear,
                mag_filter: MagFilter::Linear,
            },
        )
    }

    /// Same description over a different area
    pub fn with_area(&self, area: Area) -> Self {
        Self {
            area,
            kind: self.kind,
        }
    }

    /// Same description with the area scaled by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        self.with_area(self.area.scaled(factor))
    }

    /// True if targets of `other` can be reused for this description
    pub fn is_compatible(&self, other: &RenderTargetDescription) -> bool {
        self.kind == other.kind
    }

    fn texture(&self, format: TextureFormat, index: usize) -> TextureDescriptor {
        let (min_filter, mag_filter) = if format.is_depth() {
            (MinFilter::Nearest, MagFilter::Nearest)
        } else {
            self.kind.filters()
        };
        TextureDescriptor {
            label: Some(format!("{} {}", self.kind.label(), index)),
            width: self.area.width(),
            height: self.area.height(),
            format,
            min_filter,
            mag_filter,
        }
    }
}

/// A live render target owned by the pool that created it
#[derive(Debug)]
pub struct RenderTarget {
    id: u64,
    pub(crate) pool: u64,
    description: RenderTargetDescription,
    framebuffer: FramebufferHandle,
    color: Vec<TextureHandle>,
    depth: Option<TextureHandle>,
    deleted: bool,
}

impl RenderTarget {
    /// Allocate the attachments of `description` inside a child of `tc`.
    ///
    /// On failure every texture created so far is destroyed.
    pub(crate) fn allocate(
        backend: &mut dyn GraphicsBackend,
        tc: &TextureUnitContext,
        pool: u64,
        id: u64,
        description: RenderTargetDescription,
    ) -> RenderResult<Self> {
        let mut created: Vec<TextureHandle> = Vec::new();
        let result = tc.with_child(backend, |backend, child| {
            for (index, format) in description.kind.color_formats().into_iter().enumerate() {
                let (_, texture) =
                    child.allocate_texture_2d(backend, &description.texture(format, index))?;
                created.push(texture);
            }
            let depth = match description.kind.depth_format() {
                Some(format) => {
                    let (_, texture) = child.allocate_texture_2d(
                        backend,
                        &description.texture(format, created.len()),
                    )?;
                    created.push(texture);
                    Some(texture)
                }
                None => None,
            };
            let color: Vec<TextureHandle> = match depth {
                Some(_) => created[..created.len() - 1].to_vec(),
                None => created.clone(),
            };
            let framebuffer = backend.create_framebuffer(&FramebufferDescriptor {
                label: Some(format!("{} target {}", description.kind.label(), id)),
                color_attachments: color.clone(),
                depth_attachment: depth,
            })?;
            Ok((framebuffer, color, depth))
        });

        match result {
            Ok((framebuffer, color, depth)) => {
                log::trace!(
                    "Allocated {} render target {} ({}x{})",
                    description.kind.label(),
                    id,
                    description.area.width(),
                    description.area.height()
                );
                Ok(Self {
                    id,
                    pool,
                    description,
                    framebuffer,
                    color,
                    depth,
                    deleted: false,
                })
            }
            Err(err) => {
                for texture in created {
                    backend.destroy_texture(texture);
                }
                Err(err)
            }
        }
    }

    pub(crate) fn destroy(&mut self, backend: &mut dyn GraphicsBackend) {
        if self.deleted {
            return;
        }
        backend.destroy_framebuffer(self.framebuffer);
        for texture in self.color.drain(..).chain(self.depth.take()) {
            backend.destroy_texture(texture);
        }
        self.deleted = true;
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn description(&self) -> &RenderTargetDescription {
        &self.description
    }

    pub fn area(&self) -> Area {
        self.description.area
    }

    pub fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    /// Color attachment `index`, in the kind's attachment order
    pub fn color_texture(&self, index: usize) -> Option<TextureHandle> {
        self.color.get(index).copied()
    }

    pub fn color_textures(&self) -> &[TextureHandle] {
        &self.color
    }

    pub fn depth_texture(&self) -> Option<TextureHandle> {
        self.depth
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Bind the framebuffer and set the viewport to the target's area.
    pub fn bind_for_drawing(&self, backend: &mut dyn GraphicsBackend) {
        backend.bind_framebuffer(Some(self.framebuffer));
        backend.set_viewport(crate::backend::Viewport {
            x: self.description.area.x_min(),
            y: self.description.area.y_min(),
            width: self.description.area.width(),
            height: self.description.area.height(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::resources::TextureUnitAllocator;

    #[test]
    fn test_area_is_inclusive() {
        let area = Area::new(0, 0, 0, 0).unwrap();
        assert_eq!(area.width(), 1);
        assert_eq!(area.pixels(), 1);
        assert!(Area::new(2, 0, 1, 0).is_err());
        assert!(Area::of_size(0, 4).is_err());
        assert_eq!(Area::of_size(640, 480).unwrap().pixels(), 640 * 480);
    }

    #[test]
    fn test_rescale_keeps_kind() {
        let desc = RenderTargetDescription::depth_variance(Area::of_size(256, 256).unwrap());
        let half = desc.scaled(0.5);
        assert_eq!(half.area.width(), 128);
        assert_eq!(half.kind, desc.kind);
        assert!(half.is_compatible(&desc));
        assert_ne!(half, desc);
        assert_eq!(desc.scaled(0.0).area.pixels(), 1);
    }

    #[test]
    fn test_full_range_area_is_rejected() {
        assert!(matches!(
            Area::new(0, 0, u32::MAX, 0),
            Err(RenderError::InvalidArea(_))
        ));
        assert!(Area::new(0, 1, 0, u32::MAX).is_err());

        let widest = Area::new(1, 0, u32::MAX, 0).unwrap();
        assert_eq!(widest.width(), u32::MAX);
        assert_eq!(widest.pixels(), u32::MAX as u64);
    }

    #[test]
    fn test_scale_saturates() {
        let area = Area::new(10, 20, 1033, 275).unwrap();
        let huge = area.scaled(1.0e12);
        assert_eq!(huge.x_min(), 10);
        assert_eq!(huge.x_max(), u32::MAX - 1);
        assert_eq!(huge.height(), u32::MAX - 20);

        let edge = Area::new(u32::MAX, u32::MAX, u32::MAX, u32::MAX).unwrap();
        assert_eq!(edge.scaled(4.0), edge);
        assert_eq!(area.scaled(f64::NAN).pixels(), 1);
    }

    #[test]
    fn test_geometry_layout() {
        let mut backend = DummyBackend::new(8);
        let allocator = TextureUnitAllocator::for_backend(4, &backend);
        let root = allocator.root_context().unwrap();
        let desc = RenderTargetDescription::geometry(Area::of_size(4, 4).unwrap());

        let mut target = RenderTarget::allocate(&mut backend, &root, 0, 1, desc).unwrap();
        assert_eq!(target.color_textures().len(), 3);
        let depth = target.depth_texture().unwrap();
        assert_eq!(
            backend.texture_descriptor(depth).unwrap().format,
            TextureFormat::Depth24Stencil8
        );
        assert_eq!(backend.live_textures(), 4);
        assert!(root.is_current());

        target.destroy(&mut backend);
        assert!(target.is_deleted());
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_framebuffers(), 0);
    }

    #[test]
    fn test_failed_allocation_releases_textures() {
        // Geometry targets need four units; two are not enough
        let mut backend = DummyBackend::new(2);
        let allocator = TextureUnitAllocator::for_backend(4, &backend);
        let root = allocator.root_context().unwrap();
        let desc = RenderTargetDescription::geometry(Area::of_size(4, 4).unwrap());

        let err = RenderTarget::allocate(&mut backend, &root, 0, 1, desc).unwrap_err();
        assert!(matches!(err, RenderError::UnitsExhausted { .. }));
        assert_eq!(backend.live_textures(), 0);
        assert!(root.is_current());
    }
}
