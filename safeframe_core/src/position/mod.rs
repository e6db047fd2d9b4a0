// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Position requests and rendered position state.
//!
//! A [`Position`] is what the caller asks to render: an id, content, and
//! metadata. Once rendered it becomes a [`RenderedPosition`] owned by the
//! engine's [`PositionStore`] and addressed by a generational
//! [`PositionKey`]. Callers outside the engine only ever see a
//! [`RenderedSnapshot`] copy.
//!
//! Lifecycle:
//!
//! ```text
//!   Pending ──load──► Rendered ──expand──► Expanded ⇄ Collapsed
//!      │                                        │
//!      └──timeout──► TimedOut                   │
//!                       │                       │
//!                       └────── nuke ───────────┴──► Disposed (removed)
//! ```

mod id;
mod store;

pub use id::PositionKey;
pub use store::PositionStore;

use kurbo::{Size, Vec2};

use crate::config::{Capabilities, PositionConfig};
use crate::error::ConfigError;
use crate::geometry::{ExpansionEnvelope, Insets};
use crate::metadata::PositionMetadata;
use crate::platform::{FrameBox, MountedFrame};
use crate::time::HostTime;
use crate::wire::Record;

/// What a frame renders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    /// Inline markup, written into the render template.
    Markup(String),
    /// A URL the render template loads.
    Source(String),
}

/// A render request.
#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    id: String,
    content: Content,
    metadata: PositionMetadata,
    config: Option<PositionConfig>,
}

impl Position {
    /// A position rendering inline markup.
    #[must_use]
    pub fn markup(id: impl Into<String>, markup: impl Into<String>) -> Self {
        Self::with_content(id, Content::Markup(markup.into()))
    }

    /// A position rendering a source URL.
    #[must_use]
    pub fn source(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self::with_content(id, Content::Source(source.into()))
    }

    /// A position from optional markup and source; markup wins when both
    /// are present.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingContent`] when both are absent or empty.
    pub fn new(
        id: impl Into<String>,
        markup: Option<&str>,
        source: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        let non_empty = |s: Option<&str>| s.filter(|s| !s.trim().is_empty()).map(str::to_owned);
        let content = match (non_empty(markup), non_empty(source)) {
            (Some(markup), _) => Content::Markup(markup),
            (None, Some(source)) => Content::Source(source),
            (None, None) => return Err(ConfigError::MissingContent { id }),
        };
        Ok(Self::with_content(id, content))
    }

    fn with_content(id: impl Into<String>, content: Content) -> Self {
        Self {
            id: id.into(),
            content,
            metadata: PositionMetadata::default(),
            config: None,
        }
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: PositionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attaches an inline config, used when the engine configuration has
    /// none for this id.
    #[must_use]
    pub fn with_config(mut self, config: PositionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Position id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Content to render.
    #[must_use]
    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Metadata.
    #[must_use]
    pub fn metadata(&self) -> &PositionMetadata {
        &self.metadata
    }

    /// Inline config.
    #[must_use]
    pub fn config(&self) -> Option<&PositionConfig> {
        self.config.as_ref()
    }
}

/// A position found in the page by a discovery collaborator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscoveredPosition {
    /// Position id.
    pub id: String,
    /// Inline markup.
    pub markup: Option<String>,
    /// Source URL.
    pub source: Option<String>,
    /// Metadata.
    pub metadata: PositionMetadata,
    /// Inline config record (see [`PositionConfig::from_record`]).
    pub inline_config: Option<Record>,
}

impl TryFrom<DiscoveredPosition> for Position {
    type Error = ConfigError;

    fn try_from(found: DiscoveredPosition) -> Result<Self, Self::Error> {
        let config = found
            .inline_config
            .as_ref()
            .map(|record| PositionConfig::from_record(found.id.clone(), record))
            .transpose()?;
        let mut position = Self::new(found.id, found.markup.as_deref(), found.source.as_deref())?
            .with_metadata(found.metadata);
        position.config = config;
        Ok(position)
    }
}

/// Lifecycle state of a rendered position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// Frame mounted; waiting for load.
    Pending,
    /// Frame loaded at its declared size.
    Rendered,
    /// Frame grown beyond its declared size.
    Expanded,
    /// Frame back at its declared size after an expansion.
    Collapsed,
    /// The render timed out; the position is being torn down.
    TimedOut,
    /// Torn down.
    Disposed,
}

impl Status {
    /// Stable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rendered => "rendered",
            Self::Expanded => "expanded",
            Self::Collapsed => "collapsed",
            Self::TimedOut => "timed-out",
            Self::Disposed => "disposed",
        }
    }

    /// Whether the frame is loaded and receives geometry pushes.
    #[must_use]
    pub const fn is_loaded(self) -> bool {
        matches!(self, Self::Rendered | Self::Expanded | Self::Collapsed)
    }
}

/// An applied expansion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Expansion {
    /// Growth on each side.
    pub insets: Insets,
    /// Host content is pushed aside (the wrapper grows too).
    pub push: bool,
}

impl Expansion {
    /// Net displacement: `(right - left, bottom - top)`.
    #[must_use]
    pub fn offset(&self) -> Vec2 {
        Vec2::new(
            self.insets.right - self.insets.left,
            self.insets.bottom - self.insets.top,
        )
    }
}

/// Engine-owned state for one rendered position.
#[derive(Clone, Debug)]
pub struct RenderedPosition<E> {
    pub(crate) id: String,
    pub(crate) config: PositionConfig,
    pub(crate) status: Status,
    pub(crate) expansion: Option<Expansion>,
    pub(crate) z_index: Option<i32>,
    pub(crate) mounted: MountedFrame<E>,
    pub(crate) geometry: ExpansionEnvelope,
    pub(crate) scroll_watch: Option<E>,
    pub(crate) rendered_at: HostTime,
}

impl<E> RenderedPosition<E> {
    pub(crate) fn new(config: PositionConfig, mounted: MountedFrame<E>, now: HostTime) -> Self {
        Self {
            id: config.id().to_owned(),
            z_index: config.z_index(),
            config,
            status: Status::Pending,
            expansion: None,
            mounted,
            geometry: ExpansionEnvelope::default(),
            scroll_watch: None,
            rendered_at: now,
        }
    }

    /// Position id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Current frame size: declared size plus any expansion.
    #[must_use]
    pub fn size(&self) -> Size {
        let grow = self.expansion.map_or(Insets::ZERO, |e| e.insets);
        Size::new(
            self.config.width() + grow.horizontal(),
            self.config.height() + grow.vertical(),
        )
    }

    /// The frame's box inside its wrapper.
    #[must_use]
    pub fn frame_box(&self) -> FrameBox {
        let grow = self.expansion.map_or(Insets::ZERO, |e| e.insets);
        let size = self.size();
        FrameBox {
            left: -grow.left,
            top: -grow.top,
            width: size.width,
            height: size.height,
            z_index: self.z_index,
        }
    }

    /// An owned view for callers outside the engine.
    #[must_use]
    pub fn snapshot(&self) -> RenderedSnapshot {
        RenderedSnapshot {
            id: self.id.clone(),
            destination_id: self.config.destination_id().to_owned(),
            status: self.status,
            size: self.size(),
            declared_size: Size::new(self.config.width(), self.config.height()),
            expanded: self.expansion.is_some(),
            offset: self.expansion.map_or(Vec2::ZERO, |e| e.offset()),
            z_index: self.z_index,
            capabilities: self.config.capabilities(),
            geometry: self.geometry,
            rendered_at: self.rendered_at,
        }
    }
}

/// A copy of a rendered position's public state.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedSnapshot {
    /// Position id.
    pub id: String,
    /// Host element the frame replaced.
    pub destination_id: String,
    /// Lifecycle state.
    pub status: Status,
    /// Current frame size.
    pub size: Size,
    /// Declared frame size.
    pub declared_size: Size,
    /// Whether an expansion is applied.
    pub expanded: bool,
    /// Expansion offset, zero when not expanded.
    pub offset: Vec2,
    /// Current stacking order.
    pub z_index: Option<i32>,
    /// Granted capabilities.
    pub capabilities: Capabilities,
    /// Last computed geometry.
    pub geometry: ExpansionEnvelope,
    /// When the render started.
    pub rendered_at: HostTime,
}
