//! Pool of reusable render targets
//!
//! Targets are keyed by [`RenderTargetKind`]; the area of a pooled target is
//! reallocated when a request asks for a different one. Usage is measured in
//! pixels: returned targets beyond the soft limit are evicted, and a request
//! that cannot fit under the hard limit fails.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::GraphicsBackend;
use crate::error::{RenderError, RenderResult};
use crate::resources::render_target::{RenderTarget, RenderTargetDescription};
use crate::resources::texture_unit::TextureUnitContext;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Pixel limits of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Pixels the pool keeps around for reuse
    pub soft: u64,
    /// Pixels the pool may allocate in total
    pub hard: u64,
}

impl Default for PoolLimits {
    fn default() -> Self {
        // Roughly eight and thirty-two 1920x1080 targets
        Self {
            soft: 1920 * 1080 * 8,
            hard: 1920 * 1080 * 32,
        }
    }
}

/// Render target pool
#[derive(Debug)]
pub struct RenderTargetPool {
    label: String,
    id: u64,
    limits: PoolLimits,
    next_target: u64,
    free: Vec<RenderTarget>,
    evicted: Vec<RenderTarget>,
    outstanding: BTreeSet<u64>,
    outstanding_pixels: u64,
    deleted: bool,
}

impl RenderTargetPool {
    pub fn new(label: impl Into<String>, limits: PoolLimits) -> Self {
        Self {
            label: label.into(),
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            limits,
            next_target: 1,
            free: Vec::new(),
            evicted: Vec::new(),
            outstanding: BTreeSet::new(),
            outstanding_pixels: 0,
            deleted: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Targets waiting for reuse
    pub fn pooled_count(&self) -> usize {
        self.free.len()
    }

    /// Targets handed out and not yet returned
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    fn pooled_pixels(&self) -> u64 {
        self.free.iter().map(|t| t.area().pixels()).sum()
    }

    /// Pixels currently allocated by the pool, pooled and outstanding
    pub fn used_pixels(&self) -> u64 {
        self.outstanding_pixels + self.pooled_pixels()
    }

    fn check_alive(&self) -> RenderResult<()> {
        if self.deleted {
            Err(RenderError::PoolDeleted(self.label.clone()))
        } else {
            Ok(())
        }
    }

    /// Fetch a target for `description`, reusing a pooled one when possible.
    pub fn get(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        tc: &TextureUnitContext,
        description: &RenderTargetDescription,
    ) -> RenderResult<RenderTarget> {
        self.check_alive()?;
        self.trim(backend);

        let exact = self
            .free
            .iter()
            .position(|t| t.description() == description);
        let compatible = exact.or_else(|| {
            self.free
                .iter()
                .position(|t| t.description().is_compatible(description))
        });

        let target = match compatible {
            Some(index) if exact.is_some() => {
                let target = self.free.remove(index);
                log::trace!("Pool `{}`: reusing target {}", self.label, target.id());
                target
            }
            Some(index) => {
                let mut stale = self.free.remove(index);
                log::trace!(
                    "Pool `{}`: resizing target {} to {}x{}",
                    self.label,
                    stale.id(),
                    description.area.width(),
                    description.area.height()
                );
                stale.destroy(backend);
                self.allocate(backend, tc, description)?
            }
            None => self.allocate(backend, tc, description)?,
        };

        self.outstanding.insert(target.id());
        self.outstanding_pixels += target.area().pixels();
        Ok(target)
    }

    fn allocate(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        tc: &TextureUnitContext,
        description: &RenderTargetDescription,
    ) -> RenderResult<RenderTarget> {
        let requested = description.area.pixels();
        while self.used_pixels() + requested > self.limits.hard && !self.free.is_empty() {
            let mut oldest = self.free.remove(0);
            oldest.destroy(backend);
        }
        let used = self.used_pixels();
        if used + requested > self.limits.hard {
            return Err(RenderError::PoolHardLimit {
                pool: self.label.clone(),
                requested,
                used,
                limit: self.limits.hard,
            });
        }

        let id = self.next_target;
        self.next_target += 1;
        RenderTarget::allocate(backend, tc, self.id, id, *description)
    }

    /// Give a target back and destroy it at once if the pool is deleted.
    pub fn release(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        target: RenderTarget,
    ) -> RenderResult<()> {
        self.return_target(target)?;
        if self.deleted {
            self.trim(backend);
        }
        Ok(())
    }

    /// Give a target back for reuse. The target is not destroyed unless it
    /// falls beyond the soft limit, or the pool is deleted, in which case the
    /// next [`RenderTargetPool::trim`] destroys it.
    pub fn return_target(&mut self, target: RenderTarget) -> RenderResult<()> {
        if target.pool != self.id || !self.outstanding.remove(&target.id()) {
            log::error!(
                "Pool `{}`: target {} was not created here, dropping it undestroyed",
                self.label,
                target.id()
            );
            return Err(RenderError::ForeignRenderTarget(target.id()));
        }
        self.outstanding_pixels -= target.area().pixels();

        if self.deleted {
            log::warn!(
                "Pool `{}`: target {} returned after delete",
                self.label,
                target.id()
            );
            self.evicted.push(target);
            return Ok(());
        }

        self.free.push(target);
        while self.pooled_pixels() > self.limits.soft && !self.free.is_empty() {
            let oldest = self.free.remove(0);
            log::warn!(
                "Pool `{}`: evicting target {} (soft limit {} pixels)",
                self.label,
                oldest.id(),
                self.limits.soft
            );
            self.evicted.push(oldest);
        }
        Ok(())
    }

    /// Destroy evicted targets.
    pub fn trim(&mut self, backend: &mut dyn GraphicsBackend) {
        for mut target in self.evicted.drain(..) {
            target.destroy(backend);
        }
    }

    /// Destroy every pooled target. Subsequent `get` calls fail.
    pub fn delete(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        tc: &TextureUnitContext,
    ) -> RenderResult<()> {
        self.check_alive()?;
        let free = &mut self.free;
        let evicted = &mut self.evicted;
        tc.with_child(backend, |backend, _| {
            for mut target in free.drain(..).chain(evicted.drain(..)) {
                target.destroy(backend);
            }
            Ok(())
        })?;
        self.deleted = true;
        log::debug!(
            "Pool `{}` deleted ({} target(s) still outstanding)",
            self.label,
            self.outstanding.len()
        );
        Ok(())
    }
}
