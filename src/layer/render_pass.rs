//! Render-pass derivation
//!
//! A mesh's flags collapse into four pass codes (color, silhouette, edges,
//! pick). The draw binning reads nothing else per frame.

/// Per-mesh state bits, one bit per boolean attribute
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshFlags(pub u32);

impl MeshFlags {
    pub const NONE: Self = Self(0);
    pub const VISIBLE: Self = Self(1 << 1);
    pub const CULLED: Self = Self(1 << 2);
    pub const PICKABLE: Self = Self(1 << 3);
    pub const CLIPPABLE: Self = Self(1 << 4);
    pub const COLLIDABLE: Self = Self(1 << 5);
    pub const CAST_SHADOW: Self = Self(1 << 6);
    pub const RECEIVE_SHADOW: Self = Self(1 << 7);
    pub const XRAYED: Self = Self(1 << 8);
    pub const HIGHLIGHTED: Self = Self(1 << 9);
    pub const SELECTED: Self = Self(1 << 10);
    pub const EDGES: Self = Self(1 << 11);
    pub const BACKFACES: Self = Self(1 << 12);

    /// Visible, pickable, clippable, collidable, shadowed
    pub const DEFAULT: Self = Self(
        Self::VISIBLE.0
            | Self::PICKABLE.0
            | Self::CLIPPABLE.0
            | Self::COLLIDABLE.0
            | Self::CAST_SHADOW.0
            | Self::RECEIVE_SHADOW.0,
    );

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[inline]
    pub fn set(self, other: Self, on: bool) -> Self {
        if on {
            self.with(other)
        } else {
            self.without(other)
        }
    }
}

impl std::ops::BitOr for MeshFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

/// Draw pass a mesh-part takes part in
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RenderPass {
    NotRendered = 0,
    ColorOpaque = 1,
    ColorTransparent = 2,
    SilhouetteHighlighted = 3,
    SilhouetteSelected = 4,
    SilhouetteXrayed = 5,
    EdgesColorOpaque = 6,
    EdgesColorTransparent = 7,
    EdgesHighlighted = 8,
    EdgesSelected = 9,
    EdgesXrayed = 10,
    Pick = 11,
}

/// The four pass codes of one mesh-part
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PassCodes {
    pub color: RenderPass,
    pub silhouette: RenderPass,
    pub edges: RenderPass,
    pub pick: RenderPass,
}

impl PassCodes {
    pub const NOT_RENDERED: Self = Self {
        color: RenderPass::NotRendered,
        silhouette: RenderPass::NotRendered,
        edges: RenderPass::NotRendered,
        pick: RenderPass::NotRendered,
    };

    /// Packed attribute-row representation
    #[inline]
    pub fn packed(self) -> [u8; 4] {
        [
            self.color as u8,
            self.silhouette as u8,
            self.edges as u8,
            self.pick as u8,
        ]
    }
}

/// Derive pass codes from flags and transparency
pub fn derive_pass_codes(flags: MeshFlags, transparent: bool) -> PassCodes {
    let visible = flags.contains(MeshFlags::VISIBLE);
    let culled = flags.contains(MeshFlags::CULLED);
    if !visible || culled {
        return PassCodes::NOT_RENDERED;
    }

    let xrayed = flags.contains(MeshFlags::XRAYED);
    let highlighted = flags.contains(MeshFlags::HIGHLIGHTED);
    let selected = flags.contains(MeshFlags::SELECTED);

    let color = if xrayed {
        RenderPass::NotRendered
    } else if transparent {
        RenderPass::ColorTransparent
    } else {
        RenderPass::ColorOpaque
    };

    let silhouette = if selected {
        RenderPass::SilhouetteSelected
    } else if highlighted {
        RenderPass::SilhouetteHighlighted
    } else if xrayed {
        RenderPass::SilhouetteXrayed
    } else {
        RenderPass::NotRendered
    };

    let edges = if selected {
        RenderPass::EdgesSelected
    } else if highlighted {
        RenderPass::EdgesHighlighted
    } else if xrayed {
        RenderPass::EdgesXrayed
    } else if flags.contains(MeshFlags::EDGES) {
        if transparent {
            RenderPass::EdgesColorTransparent
        } else {
            RenderPass::EdgesColorOpaque
        }
    } else {
        RenderPass::NotRendered
    };

    let pick = if flags.contains(MeshFlags::PICKABLE) {
        RenderPass::Pick
    } else {
        RenderPass::NotRendered
    };

    PassCodes {
        color,
        silhouette,
        edges,
        pick,
    }
}
