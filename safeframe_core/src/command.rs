// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Expand and collapse planning.
//!
//! These functions decide *what* an expand or collapse does to a rendered
//! position without touching the host: they validate the request, consult
//! the host's veto through a gate closure, and return a plan the engine then
//! applies to the position and the frame.
//!
//! The gate receives the requested growth and returns
//! `Result<Proceed, Cancelled>`; a cancelled gate aborts with no change.

use core::fmt;

use kurbo::{Size, Vec2};

use crate::geometry::Insets;
use crate::platform::FrameBox;
use crate::position::{Expansion, RenderedPosition};
use crate::wire::Record;

/// Stacking order given to an expanding frame that declares none.
pub const EXPAND_Z_INDEX: i32 = 10_000;

/// Largest growth accepted per side, in pixels.
pub const MAX_GROWTH: f64 = 10_000.0;

/// Gate result allowing the command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Proceed;

/// Gate result vetoing the command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

/// A frame's expansion request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExpandRequest {
    /// Signed growth: positive `dx` grows right, negative grows left;
    /// positive `dy` grows down, negative grows up.
    Delta(Vec2),
    /// Explicit growth per side.
    Insets(Insets),
}

impl ExpandRequest {
    /// Reads a request from command fields.
    ///
    /// Any of `t`, `l`, `r`, `b` selects the inset form (missing sides are
    /// zero, negative values clamp to zero); otherwise `dx`/`dy` select the
    /// delta form. Returns `None` when neither form is present.
    #[must_use]
    pub fn from_record(record: &Record) -> Option<Self> {
        if ["t", "l", "r", "b"].iter().any(|k| record.contains(k)) {
            let side = |key: &str| record.num(key, 0.0, 0.0, MAX_GROWTH);
            return Some(Self::Insets(Insets {
                top: side("t"),
                left: side("l"),
                right: side("r"),
                bottom: side("b"),
            }));
        }
        if record.contains("dx") || record.contains("dy") {
            let axis = |key: &str| record.num(key, 0.0, -MAX_GROWTH, MAX_GROWTH);
            return Some(Self::Delta(Vec2::new(axis("dx"), axis("dy"))));
        }
        None
    }

    /// Growth on each side.
    #[must_use]
    pub fn insets(&self) -> Insets {
        match *self {
            Self::Delta(d) => Insets {
                top: (-d.y).max(0.0),
                left: (-d.x).max(0.0),
                right: d.x.max(0.0),
                bottom: d.y.max(0.0),
            },
            Self::Insets(insets) => insets.clamp_non_negative(),
        }
    }

    /// Requested growth as reported to the veto gate.
    ///
    /// The delta form reports itself; the inset form reports total growth
    /// per axis.
    #[must_use]
    pub fn delta(&self) -> Vec2 {
        match *self {
            Self::Delta(d) => d,
            Self::Insets(_) => {
                let insets = self.insets();
                Vec2::new(insets.horizontal(), insets.vertical())
            }
        }
    }
}

/// Why an expansion was not applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpandError {
    /// The request grows neither dimension.
    NoGrowth,
    /// The gate vetoed it.
    Cancelled,
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoGrowth => f.write_str("expansion does not grow the frame"),
            Self::Cancelled => f.write_str("expansion cancelled by host"),
        }
    }
}

impl core::error::Error for ExpandError {}

/// Why a collapse was not applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollapseError {
    /// The position is not expanded.
    NotExpanded,
    /// The gate vetoed it.
    Cancelled,
}

impl fmt::Display for CollapseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotExpanded => f.write_str("position is not expanded"),
            Self::Cancelled => f.write_str("collapse cancelled by host"),
        }
    }
}

impl core::error::Error for CollapseError {}

/// Changes an expansion makes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExpandPlan {
    /// The expansion to record.
    pub expansion: Expansion,
    /// New frame box inside the wrapper.
    pub frame_box: FrameBox,
    /// New wrapper size: grown in push mode, restored when an overlay
    /// expansion replaces a push expansion.
    pub wrapper: Option<Size>,
}

/// Changes a collapse makes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollapsePlan {
    /// Restored frame box.
    pub frame_box: FrameBox,
    /// Restored wrapper size (only if the expansion pushed).
    pub wrapper: Option<Size>,
}

/// Plans an expansion of `position`.
///
/// The expansion is measured from the declared size, so expanding an
/// already expanded position replaces the previous expansion.
///
/// # Errors
///
/// [`ExpandError::NoGrowth`] if neither width nor height would increase,
/// [`ExpandError::Cancelled`] if the gate vetoes.
pub fn plan_expand<E>(
    position: &RenderedPosition<E>,
    request: &ExpandRequest,
    push: bool,
    gate: impl FnOnce(Vec2) -> Result<Proceed, Cancelled>,
) -> Result<ExpandPlan, ExpandError> {
    let insets = request.insets();
    if insets.horizontal() <= 0.0 && insets.vertical() <= 0.0 {
        return Err(ExpandError::NoGrowth);
    }
    gate(request.delta()).map_err(|Cancelled| ExpandError::Cancelled)?;

    let declared = Size::new(position.config.width(), position.config.height());
    let size = Size::new(
        declared.width + insets.horizontal(),
        declared.height + insets.vertical(),
    );
    Ok(ExpandPlan {
        expansion: Expansion { insets, push },
        frame_box: FrameBox {
            left: -insets.left,
            top: -insets.top,
            width: size.width,
            height: size.height,
            z_index: Some(position.z_index.unwrap_or(EXPAND_Z_INDEX)),
        },
        wrapper: if push {
            Some(size)
        } else {
            position.expansion.filter(|e| e.push).map(|_| declared)
        },
    })
}

/// Plans a collapse of `position` back to its declared box.
///
/// # Errors
///
/// [`CollapseError::NotExpanded`] if there is nothing to undo,
/// [`CollapseError::Cancelled`] if the gate vetoes.
pub fn plan_collapse<E>(
    position: &RenderedPosition<E>,
    gate: impl FnOnce(Vec2) -> Result<Proceed, Cancelled>,
) -> Result<CollapsePlan, CollapseError> {
    let Some(expansion) = position.expansion else {
        return Err(CollapseError::NotExpanded);
    };
    gate(Vec2::ZERO).map_err(|Cancelled| CollapseError::Cancelled)?;

    let declared = Size::new(position.config.width(), position.config.height());
    Ok(CollapsePlan {
        frame_box: FrameBox {
            left: 0.0,
            top: 0.0,
            width: declared.width,
            height: declared.height,
            z_index: position.config.z_index(),
        },
        wrapper: expansion.push.then_some(declared),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PositionConfig;
    use crate::platform::MountedFrame;
    use crate::time::HostTime;

    fn rendered(z_index: Option<i32>) -> RenderedPosition<u32> {
        let mut config = PositionConfig::new("p1", "slot", 300.0, 250.0).unwrap();
        if let Some(z) = z_index {
            config = config.with_z_index(z);
        }
        RenderedPosition::new(
            config,
            MountedFrame {
                wrapper: 0,
                frame: 1,
                shim: None,
            },
            HostTime(0),
        )
    }

    fn allow(_: Vec2) -> Result<Proceed, Cancelled> {
        Ok(Proceed)
    }

    #[test]
    fn request_forms() {
        let delta = ExpandRequest::from_record(&Record::decode("dx=50&dy=0")).unwrap();
        assert_eq!(delta, ExpandRequest::Delta(Vec2::new(50.0, 0.0)));
        assert_eq!(delta.insets().right, 50.0);

        let left_up = ExpandRequest::Delta(Vec2::new(-20.0, -10.0)).insets();
        assert_eq!((left_up.left, left_up.top, left_up.right), (20.0, 10.0, 0.0));

        let boxed = ExpandRequest::from_record(&Record::decode("l=10&r=30&dx=999")).unwrap();
        assert_eq!(boxed.insets().horizontal(), 40.0, "inset form wins");
        assert_eq!(boxed.delta(), Vec2::new(40.0, 0.0));

        assert_eq!(ExpandRequest::from_record(&Record::decode("cmd=exp-ovr")), None);
        let junk = ExpandRequest::from_record(&Record::decode("dx=lots")).unwrap();
        assert_eq!(junk.delta(), Vec2::ZERO);
    }

    #[test]
    fn overlay_expand_grows_frame_only() {
        let position = rendered(None);
        let plan = plan_expand(
            &position,
            &ExpandRequest::Delta(Vec2::new(50.0, 0.0)),
            false,
            allow,
        )
        .unwrap();
        assert_eq!(plan.frame_box.width, 350.0);
        assert_eq!(plan.frame_box.height, 250.0);
        assert_eq!(plan.frame_box.z_index, Some(EXPAND_Z_INDEX));
        assert_eq!(plan.expansion.offset(), Vec2::new(50.0, 0.0));
        assert_eq!(plan.wrapper, None);
    }

    #[test]
    fn push_expand_grows_wrapper_and_keeps_declared_z() {
        let position = rendered(Some(3));
        let plan = plan_expand(
            &position,
            &ExpandRequest::Delta(Vec2::new(0.0, -40.0)),
            true,
            allow,
        )
        .unwrap();
        assert_eq!(plan.frame_box.top, -40.0);
        assert_eq!(plan.wrapper, Some(Size::new(300.0, 290.0)));
        assert_eq!(plan.frame_box.z_index, Some(3));
    }

    #[test]
    fn non_growing_request_is_rejected_before_gate() {
        let position = rendered(None);
        let mut gated = false;
        let result = plan_expand(
            &position,
            &ExpandRequest::Delta(Vec2::ZERO),
            false,
            |_| {
                gated = true;
                Ok(Proceed)
            },
        );
        assert_eq!(result, Err(ExpandError::NoGrowth));
        assert!(!gated);
    }

    #[test]
    fn gate_can_cancel() {
        let position = rendered(None);
        let result = plan_expand(
            &position,
            &ExpandRequest::Delta(Vec2::new(10.0, 0.0)),
            false,
            |_| Err(Cancelled),
        );
        assert_eq!(result, Err(ExpandError::Cancelled));
    }

    #[test]
    fn collapse_restores_declared_box() {
        let mut position = rendered(None);
        assert_eq!(plan_collapse(&position, allow), Err(CollapseError::NotExpanded));

        let plan = plan_expand(
            &position,
            &ExpandRequest::Delta(Vec2::new(50.0, 20.0)),
            true,
            allow,
        )
        .unwrap();
        position.expansion = Some(plan.expansion);
        position.z_index = plan.frame_box.z_index;

        let collapse = plan_collapse(&position, allow).unwrap();
        assert_eq!(
            collapse.frame_box,
            FrameBox {
                left: 0.0,
                top: 0.0,
                width: 300.0,
                height: 250.0,
                z_index: None,
            }
        );
        assert_eq!(collapse.wrapper, Some(Size::new(300.0, 250.0)));
        assert_eq!(
            plan_collapse(&position, |_| Err(Cancelled)),
            Err(CollapseError::Cancelled)
        );
    }
}
