//! Callback-scoped matrix evaluation
//!
//! [`Matrices::with_observer`] computes the view-level matrices and hands a
//! [`MatricesObserver`] to a closure. Inside it, exactly one of
//! [`MatricesObserver::with_transform`], [`MatricesObserver::with_projective_light`]
//! or [`MatricesObserver::with_volume_light`] may be active at a time. The
//! scope objects are only ever lent to closures, so they cannot outlive the
//! scope that produced them, and every scope flag is reset on the way out,
//! whether the closure succeeded or not.

use std::cell::{Cell, RefCell};

use glam::{Mat3, Mat4};

use crate::error::{RenderError, RenderResult};
use crate::scene::light::{LightProjective, LightSphericalVolume};
use crate::scene::projection::{Projection, ViewRays};
use crate::scene::transform::{Transform, TransformContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InnerScope {
    Instance,
    Projective,
    Volume,
}

impl InnerScope {
    fn already_active(&self) -> RenderError {
        match self {
            InnerScope::Instance => RenderError::InstanceAlreadyActive,
            InnerScope::Projective => RenderError::ProjectiveAlreadyActive,
            InnerScope::Volume => RenderError::VolumeLightAlreadyActive,
        }
    }
}

/// Resets a scope flag when dropped
struct ScopeReset<'a, T: Copy> {
    cell: &'a Cell<T>,
    value: T,
}

impl<T: Copy> Drop for ScopeReset<'_, T> {
    fn drop(&mut self) {
        self.cell.set(self.value);
    }
}

/// Matrix evaluator
///
/// One evaluator is owned per rendering thread and passed by reference to
/// everything that draws.
#[derive(Debug, Default)]
pub struct Matrices {
    observer: Cell<bool>,
    inner: Cell<Option<InnerScope>>,
    transforms: RefCell<TransformContext>,
}

impl Matrices {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while an observer scope is open
    pub fn is_observer_active(&self) -> bool {
        self.observer.get()
    }

    /// Evaluate observer matrices for `view` and `projection` and run `f`
    /// with them.
    pub fn with_observer<T>(
        &self,
        view: Mat4,
        projection: Projection,
        f: impl FnOnce(&MatricesObserver<'_>) -> RenderResult<T>,
    ) -> RenderResult<T> {
        if self.observer.get() {
            return Err(RenderError::ObserverAlreadyActive);
        }
        self.observer.set(true);
        let _reset = ScopeReset {
            cell: &self.observer,
            value: false,
        };

        let projection_matrix = projection.matrix();
        let projection_inverse = projection_matrix.inverse();
        let observer = MatricesObserver {
            matrices: self,
            view,
            view_inverse: view.inverse(),
            projection,
            projection_matrix,
            projection_inverse,
            view_rays: ViewRays::from_inverse_projection(projection_inverse),
        };
        f(&observer)
    }
}

/// Observer-level matrices, valid for one [`Matrices::with_observer`] call
#[derive(Debug)]
pub struct MatricesObserver<'a> {
    matrices: &'a Matrices,
    view: Mat4,
    view_inverse: Mat4,
    projection: Projection,
    projection_matrix: Mat4,
    projection_inverse: Mat4,
    view_rays: ViewRays,
}

impl<'a> MatricesObserver<'a> {
    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn view_inverse(&self) -> Mat4 {
        self.view_inverse
    }

    pub fn projection(&self) -> Mat4 {
        self.projection_matrix
    }

    pub fn projection_inverse(&self) -> Mat4 {
        self.projection_inverse
    }

    pub fn projection_kind(&self) -> &Projection {
        &self.projection
    }

    pub fn view_rays(&self) -> &ViewRays {
        &self.view_rays
    }

    fn enter(&self, scope: InnerScope) -> RenderResult<ScopeReset<'a, Option<InnerScope>>> {
        if !self.matrices.observer.get() {
            return Err(RenderError::ObserverNotActive);
        }
        if self.matrices.inner.get().is_some() {
            return Err(scope.already_active());
        }
        self.matrices.inner.set(Some(scope));
        Ok(ScopeReset {
            cell: &self.matrices.inner,
            value: None,
        })
    }

    /// Evaluate instance matrices for `transform` and run `f` with them.
    pub fn with_transform<T>(
        &self,
        transform: &dyn Transform,
        uv: Mat3,
        f: impl FnOnce(&MatricesInstance<'_>) -> RenderResult<T>,
    ) -> RenderResult<T> {
        let _reset = self.enter(InnerScope::Instance)?;
        let model = {
            let mut ctx = self.matrices.transforms.borrow_mut();
            transform.make_matrix(&mut ctx)
        };
        let model_view = self.view * model;
        let instance = MatricesInstance {
            observer: self,
            model,
            model_view,
            normal: normal_matrix(model_view),
            uv,
        };
        f(&instance)
    }

    /// Evaluate the matrices of a projective light and run `f` with them.
    pub fn with_projective_light<T>(
        &self,
        light: &LightProjective,
        f: impl FnOnce(&MatricesProjectiveLight<'_>) -> RenderResult<T>,
    ) -> RenderResult<T> {
        let _reset = self.enter(InnerScope::Projective)?;
        let (model, light_view) = {
            let mut ctx = self.matrices.transforms.borrow_mut();
            let model = light.transform.make_matrix(&mut ctx);
            (model, light.view_matrix(&mut ctx))
        };
        let scope = MatricesProjectiveLight {
            observer: self,
            model_view: self.view * model,
            projective_view: light_view,
            projective_projection: light.projection_matrix(),
            eye_to_light_eye: light_view * self.view_inverse,
        };
        f(&scope)
    }

    /// Evaluate the matrices of a spherical volume light and run `f` with
    /// them.
    pub fn with_volume_light<T>(
        &self,
        light: &LightSphericalVolume,
        f: impl FnOnce(&MatricesVolumeLight<'_>) -> RenderResult<T>,
    ) -> RenderResult<T> {
        let _reset = self.enter(InnerScope::Volume)?;
        let model = {
            let mut ctx = self.matrices.transforms.borrow_mut();
            light.volume_transform().make_matrix(&mut ctx)
        };
        let scope = MatricesVolumeLight {
            observer: self,
            model_view: self.view * model,
        };
        f(&scope)
    }
}

/// Transpose of the inverse of the upper 3x3 of `model_view`
fn normal_matrix(model_view: Mat4) -> Mat3 {
    Mat3::from_mat4(model_view).inverse().transpose()
}

/// Per-instance matrices
#[derive(Debug)]
pub struct MatricesInstance<'a> {
    observer: &'a MatricesObserver<'a>,
    model: Mat4,
    model_view: Mat4,
    normal: Mat3,
    uv: Mat3,
}

impl<'a> MatricesInstance<'a> {
    pub fn observer(&self) -> &MatricesObserver<'a> {
        self.observer
    }

    pub fn model(&self) -> Mat4 {
        self.model
    }

    pub fn model_view(&self) -> Mat4 {
        self.model_view
    }

    pub fn normal(&self) -> Mat3 {
        self.normal
    }

    pub fn uv(&self) -> Mat3 {
        self.uv
    }
}

/// Matrices of a projective light relative to the observer
#[derive(Debug)]
pub struct MatricesProjectiveLight<'a> {
    observer: &'a MatricesObserver<'a>,
    model_view: Mat4,
    projective_view: Mat4,
    projective_projection: Mat4,
    eye_to_light_eye: Mat4,
}

impl<'a> MatricesProjectiveLight<'a> {
    pub fn observer(&self) -> &MatricesObserver<'a> {
        self.observer
    }

    pub fn model_view(&self) -> Mat4 {
        self.model_view
    }

    /// World to light-eye
    pub fn projective_view(&self) -> Mat4 {
        self.projective_view
    }

    pub fn projective_projection(&self) -> Mat4 {
        self.projective_projection
    }

    /// Observer eye space to light eye space
    pub fn eye_to_light_eye(&self) -> Mat4 {
        self.eye_to_light_eye
    }
}

/// Matrices of a spherical volume light relative to the observer
#[derive(Debug)]
pub struct MatricesVolumeLight<'a> {
    observer: &'a MatricesObserver<'a>,
    model_view: Mat4,
}

impl<'a> MatricesVolumeLight<'a> {
    pub fn observer(&self) -> &MatricesObserver<'a> {
        self.observer
    }

    pub fn model_view(&self) -> Mat4 {
        self.model_view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ArrayObjectHandle, ShaderId};
    use crate::scene::ids::LightId;
    use crate::scene::transform::{TransformOrthogonal, TransformView};
    use glam::Vec3;

    fn view() -> Mat4 {
        Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y)
    }

    #[test]
    fn test_observer_cannot_nest() {
        let matrices = Matrices::new();
        let result = matrices.with_observer(view(), Projection::default(), |_| {
            matrices.with_observer(view(), Projection::default(), |_| Ok(()))
        });
        assert_eq!(result, Err(RenderError::ObserverAlreadyActive));
        assert!(!matrices.is_observer_active());
    }

    #[test]
    fn test_flags_reset_after_failure() {
        let matrices = Matrices::new();
        let result: RenderResult<()> =
            matrices.with_observer(view(), Projection::default(), |observer| {
                observer.with_transform(
                    &TransformOrthogonal::default(),
                    Mat3::IDENTITY,
                    |_| Err(RenderError::ContextNotActive),
                )
            });
        assert_eq!(result, Err(RenderError::ContextNotActive));

        // Both scopes are usable again
        let ok = matrices.with_observer(view(), Projection::default(), |observer| {
            observer.with_transform(&TransformOrthogonal::default(), Mat3::IDENTITY, |_| {
                Ok(1)
            })
        });
        assert_eq!(ok, Ok(1));
    }

    #[test]
    fn test_inner_scopes_are_exclusive() {
        let matrices = Matrices::new();
        let volume = LightSphericalVolume::new(
            LightId(1),
            ShaderId(1),
            ArrayObjectHandle(1),
            Vec3::ZERO,
            1.0,
        );
        matrices
            .with_observer(view(), Projection::default(), |observer| {
                let nested = observer.with_transform(
                    &TransformOrthogonal::default(),
                    Mat3::IDENTITY,
                    |_| observer.with_volume_light(&volume, |_| Ok(())),
                );
                assert_eq!(nested, Err(RenderError::VolumeLightAlreadyActive));

                let nested = observer.with_transform(
                    &TransformOrthogonal::default(),
                    Mat3::IDENTITY,
                    |_| {
                        observer.with_transform(
                            &TransformOrthogonal::default(),
                            Mat3::IDENTITY,
                            |_| Ok(()),
                        )
                    },
                );
                assert_eq!(nested, Err(RenderError::InstanceAlreadyActive));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_instance_matrices() {
        let matrices = Matrices::new();
        let transform = TransformOrthogonal::from_translation(Vec3::new(1.0, 0.0, 0.0))
            .with_scale(Vec3::new(2.0, 2.0, 2.0));
        matrices
            .with_observer(view(), Projection::default(), |observer| {
                observer.with_transform(&transform, Mat3::IDENTITY, |instance| {
                    let expected = view() * transform.make_matrix(&mut TransformContext::new());
                    assert!(instance.model_view().abs_diff_eq(expected, 1e-5));
                    // Uniform scale of 2 gives a normal matrix of 1/2 times a rotation
                    let n = instance.normal() * Vec3::X;
                    assert!((n.length() - 0.5).abs() < 1e-5);
                    Ok(())
                })
            })
            .unwrap();
    }

    #[test]
    fn test_projective_light_matrices() {
        let matrices = Matrices::new();
        let light = LightProjective::new(
            LightId(2),
            ShaderId(1),
            ArrayObjectHandle(1),
            TransformView::look_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, Vec3::Z),
            Projection::perspective(60.0, 1.0, 0.5, 50.0),
        );
        matrices
            .with_observer(view(), Projection::default(), |observer| {
                observer.with_projective_light(&light, |scope| {
                    let light_view = light.view_matrix(&mut TransformContext::new());
                    let world = Vec3::new(1.0, 2.0, 3.0);
                    let via_eye = scope
                        .eye_to_light_eye()
                        .transform_point3(observer.view().transform_point3(world));
                    assert!(via_eye.abs_diff_eq(light_view.transform_point3(world), 1e-4));
                    Ok(())
                })
            })
            .unwrap();
    }
}
