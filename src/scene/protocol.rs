//! Call-order checking for scene consumers
//!
//! Consumers receive a strict bracket of calls: `on_start`, zero or more
//! group sections, `on_finish`. [`ConsumerProtocol`] tracks where in that
//! bracket a consumer is, so implementations can fail fast on calls made out
//! of order.

use crate::error::{RenderError, RenderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    InGroup(u32),
}

/// Tracks the `on_start`/group/`on_finish` bracket of a consumer
#[derive(Debug, Clone)]
pub struct ConsumerProtocol {
    phase: Phase,
}

impl Default for ConsumerProtocol {
    fn default() -> Self {
        Self { phase: Phase::Idle }
    }
}

impl ConsumerProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Group currently open, if any
    pub fn group(&self) -> Option<u32> {
        match self.phase {
            Phase::InGroup(group) => Some(group),
            _ => None,
        }
    }

    pub fn start(&mut self) -> RenderResult<()> {
        if self.phase != Phase::Idle {
            return Err(RenderError::ProtocolViolation("on_start called twice"));
        }
        self.phase = Phase::Started;
        Ok(())
    }

    pub fn start_group(&mut self, group: u32) -> RenderResult<()> {
        match self.phase {
            Phase::Started => {
                self.phase = Phase::InGroup(group);
                Ok(())
            }
            Phase::Idle => Err(RenderError::ProtocolViolation(
                "group started outside on_start/on_finish",
            )),
            Phase::InGroup(_) => Err(RenderError::ProtocolViolation(
                "group started while another group is open",
            )),
        }
    }

    pub fn finish_group(&mut self) -> RenderResult<u32> {
        match self.phase {
            Phase::InGroup(group) => {
                self.phase = Phase::Started;
                Ok(group)
            }
            _ => Err(RenderError::ProtocolViolation("no group is open")),
        }
    }

    /// Fails unless inside `on_start`/`on_finish`.
    pub fn require_started(&self) -> RenderResult<()> {
        if self.is_started() {
            Ok(())
        } else {
            Err(RenderError::ProtocolViolation(
                "called outside on_start/on_finish",
            ))
        }
    }

    /// Fails unless a group is open, returning it otherwise.
    pub fn require_group(&self) -> RenderResult<u32> {
        self.group()
            .ok_or(RenderError::ProtocolViolation("called outside a group"))
    }

    pub fn finish(&mut self) -> RenderResult<()> {
        match self.phase {
            Phase::Started => {
                self.phase = Phase::Idle;
                Ok(())
            }
            Phase::Idle => Err(RenderError::ProtocolViolation(
                "on_finish called without on_start",
            )),
            Phase::InGroup(_) => {
                self.phase = Phase::Idle;
                Err(RenderError::ProtocolViolation(
                    "on_finish called with a group open",
                ))
            }
        }
    }
}
