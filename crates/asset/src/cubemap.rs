//! Cubemap atlas slicing: one image in, six square faces out.
//!
//! Faces are always ordered +X, -X, +Y, -Y, +Z, -Z (the GL cube-face order).

use std::fmt;

use corelib::{EngineError, EngineResult};

use crate::texture::PixelBuffer;

pub const FACE_COUNT: usize = 6;

/// How the six faces are arranged inside the atlas image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AtlasLayout {
    /// Try the concrete layouts in declaration order and use the first that fits.
    #[default]
    Auto,
    /// 6x1 strip: +X -X +Y -Y +Z -Z.
    HorizontalStrip,
    /// 1x6 strip, same order top to bottom.
    VerticalStrip,
    /// 3x2 grid: +X -X +Y on the top row, -Y +Z -Z below.
    Grid3x2,
    /// 4x3 cross: +Y above, -X +Z +X -Z across the middle, -Y below.
    HorizontalCross,
    /// 3x4 cross: +Y, -X +Z +X, -Y, then -Z stored upside down at the bottom.
    VerticalCross,
}

const DETECTION_ORDER: [AtlasLayout; 5] = [
    AtlasLayout::HorizontalStrip,
    AtlasLayout::VerticalStrip,
    AtlasLayout::Grid3x2,
    AtlasLayout::HorizontalCross,
    AtlasLayout::VerticalCross,
];

impl AtlasLayout {
    /// Grid size in faces as (columns, rows). `Auto` has no grid.
    pub fn grid(self) -> Option<(u32, u32)> {
        match self {
            Self::Auto => None,
            Self::HorizontalStrip => Some((6, 1)),
            Self::VerticalStrip => Some((1, 6)),
            Self::Grid3x2 => Some((3, 2)),
            Self::HorizontalCross => Some((4, 3)),
            Self::VerticalCross => Some((3, 4)),
        }
    }

    /// Grid cell (column, row) of each face in +X, -X, +Y, -Y, +Z, -Z order.
    fn cells(self) -> [(u32, u32); FACE_COUNT] {
        match self {
            Self::Auto | Self::HorizontalStrip => [(0, 0), (1, 0), (2, 0), (3, 0), (4, 0), (5, 0)],
            Self::VerticalStrip => [(0, 0), (0, 1), (0, 2), (0, 3), (0, 4), (0, 5)],
            Self::Grid3x2 => [(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)],
            Self::HorizontalCross => [(2, 1), (0, 1), (1, 0), (1, 2), (1, 1), (3, 1)],
            Self::VerticalCross => [(2, 1), (0, 1), (1, 0), (1, 2), (1, 1), (1, 3)],
        }
    }

    /// Face edge length if a `width`x`height` atlas fits this layout with square faces.
    pub fn face_size(self, width: u32, height: u32) -> Option<u32> {
        let (cols, rows) = self.grid()?;
        if width == 0 || height == 0 || width % cols != 0 || height % rows != 0 {
            return None;
        }
        let (face_w, face_h) = (width / cols, height / rows);
        (face_w == face_h).then_some(face_w)
    }

    /// Resolve `Auto` to the first concrete layout that fits the atlas.
    pub fn resolve(self, width: u32, height: u32) -> EngineResult<(AtlasLayout, u32)> {
        let candidates: &[AtlasLayout] = match self {
            Self::Auto => &DETECTION_ORDER,
            _ => std::slice::from_ref(&self),
        };
        candidates
            .iter()
            .find_map(|layout| layout.face_size(width, height).map(|size| (*layout, size)))
            .ok_or_else(|| EngineError::InvalidAtlasLayout {
                width,
                height,
                layout: self.to_string(),
            })
    }
}

impl fmt::Display for AtlasLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::HorizontalStrip => "horizontal-strip",
            Self::VerticalStrip => "vertical-strip",
            Self::Grid3x2 => "grid-3x2",
            Self::HorizontalCross => "horizontal-cross",
            Self::VerticalCross => "vertical-cross",
        };
        f.write_str(name)
    }
}

/// Face swaps applied after slicing, for atlases authored with a different convention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CubemapOrientation {
    #[default]
    Default,
    Top,
    Bottom,
    FlipX,
    FlipY,
}

impl CubemapOrientation {
    fn apply<T>(self, faces: &mut [T; FACE_COUNT]) {
        match self {
            Self::Default => {}
            Self::Top | Self::Bottom => faces.swap(2, 3),
            Self::FlipX => {
                faces.swap(0, 1);
                faces.swap(4, 5);
            }
            Self::FlipY => {
                faces.swap(2, 3);
                faces.swap(4, 5);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; FACE_COUNT] = [
        Self::PositiveX,
        Self::NegativeX,
        Self::PositiveY,
        Self::NegativeY,
        Self::PositiveZ,
        Self::NegativeZ,
    ];

    #[inline]
    pub fn layer(self) -> u32 {
        self as u32
    }
}

/// Six faces of identical size and format, in [`CubeFace::ALL`] order.
#[derive(Clone, Debug, PartialEq)]
pub struct CubemapFaceSet {
    faces: [PixelBuffer; FACE_COUNT],
    layout: AtlasLayout,
}

impl CubemapFaceSet {
    #[inline]
    pub fn face(&self, face: CubeFace) -> &PixelBuffer {
        &self.faces[face.layer() as usize]
    }

    #[inline]
    pub fn faces(&self) -> &[PixelBuffer; FACE_COUNT] {
        &self.faces
    }

    #[inline]
    pub fn face_size(&self) -> u32 {
        self.faces[0].width()
    }

    /// Concrete layout the faces were sliced with (never `Auto`).
    #[inline]
    pub fn layout(&self) -> AtlasLayout {
        self.layout
    }
}

/// Slice `atlas` into six faces per `layout`, then apply `orientation` swaps.
pub fn slice_atlas(
    atlas: &PixelBuffer,
    layout: AtlasLayout,
    orientation: CubemapOrientation,
) -> EngineResult<CubemapFaceSet> {
    let (layout, size) = layout.resolve(atlas.width(), atlas.height())?;
    log::debug!(
        "Atlas {}x{} sliced as {} with {}x{} faces",
        atlas.width(),
        atlas.height(),
        layout,
        size,
        size
    );

    let cells = layout.cells();
    let mut faces: [PixelBuffer; FACE_COUNT] =
        std::array::from_fn(|i| atlas.crop(cells[i].0 * size, cells[i].1 * size, size, size));
    if layout == AtlasLayout::VerticalCross {
        faces[CubeFace::NegativeZ.layer() as usize].rotate_180();
    }
    orientation.apply(&mut faces);

    Ok(CubemapFaceSet { faces, layout })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::PixelFormat;
    use rstest::rstest;

    /// Atlas where each grid cell is filled with `cell_index + 1` (0 where no face lives).
    fn tagged_atlas(layout: AtlasLayout, face: u32) -> PixelBuffer {
        let (cols, rows) = layout.grid().unwrap();
        let (w, h) = (cols * face, rows * face);
        let cells = layout.cells();
        let mut data = vec![0u8; (w * h) as usize];
        for y in 0..h {
            for x in 0..w {
                let cell = (x / face, y / face);
                if let Some(i) = cells.iter().position(|c| *c == cell) {
                    data[(y * w + x) as usize] = i as u8 + 1;
                }
            }
        }
        PixelBuffer::from_raw(w, h, PixelFormat::R8, data, "atlas").unwrap()
    }

    #[rstest]
    #[case::horizontal_strip(AtlasLayout::HorizontalStrip)]
    #[case::vertical_strip(AtlasLayout::VerticalStrip)]
    #[case::grid(AtlasLayout::Grid3x2)]
    #[case::horizontal_cross(AtlasLayout::HorizontalCross)]
    #[case::vertical_cross(AtlasLayout::VerticalCross)]
    fn slices_six_square_faces_in_gl_order(#[case] layout: AtlasLayout) {
        let atlas = tagged_atlas(layout, 4);
        let set = slice_atlas(&atlas, layout, CubemapOrientation::Default).unwrap();
        assert_eq!(set.layout(), layout);
        for (i, face) in set.faces().iter().enumerate() {
            assert_eq!((face.width(), face.height()), (4, 4));
            assert!(face.data().iter().all(|&v| v == i as u8 + 1), "face {i}");
        }
    }

    #[rstest]
    #[case::horizontal_strip(AtlasLayout::HorizontalStrip)]
    #[case::vertical_strip(AtlasLayout::VerticalStrip)]
    #[case::grid(AtlasLayout::Grid3x2)]
    #[case::horizontal_cross(AtlasLayout::HorizontalCross)]
    #[case::vertical_cross(AtlasLayout::VerticalCross)]
    fn auto_detects_each_layout(#[case] layout: AtlasLayout) {
        let atlas = tagged_atlas(layout, 8);
        let set = slice_atlas(&atlas, AtlasLayout::Auto, CubemapOrientation::Default).unwrap();
        assert_eq!(set.layout(), layout);
        assert_eq!(set.face_size(), 8);
    }

    #[rstest]
    #[case(AtlasLayout::HorizontalStrip, 61, 10)]
    #[case(AtlasLayout::HorizontalCross, 40, 40)]
    #[case(AtlasLayout::Grid3x2, 30, 21)]
    #[case(AtlasLayout::Auto, 50, 30)]
    fn rejects_atlas_that_does_not_fit(
        #[case] layout: AtlasLayout,
        #[case] width: u32,
        #[case] height: u32,
    ) {
        let atlas = PixelBuffer::from_raw(
            width,
            height,
            PixelFormat::R8,
            vec![0; (width * height) as usize],
            "bad",
        )
        .unwrap();
        let err = slice_atlas(&atlas, layout, CubemapOrientation::Default).unwrap_err();
        assert!(
            matches!(err, EngineError::InvalidAtlasLayout { width: w, height: h, .. } if w == width && h == height)
        );
    }

    #[test]
    fn vertical_cross_negative_z_is_rotated_upright() {
        let layout = AtlasLayout::VerticalCross;
        let face = 2;
        let mut atlas = tagged_atlas(layout, face);
        // Mark the first stored pixel of the -Z cell; after the 180 degree turn it is the last.
        let (w, _) = (atlas.width(), atlas.height());
        let mut data = atlas.data().to_vec();
        data[(3 * face * w + face) as usize] = 99;
        atlas = PixelBuffer::from_raw(atlas.width(), atlas.height(), PixelFormat::R8, data, "x")
            .unwrap();

        let set = slice_atlas(&atlas, layout, CubemapOrientation::Default).unwrap();
        let neg_z = set.face(CubeFace::NegativeZ).data();
        assert_eq!(neg_z[neg_z.len() - 1], 99);
        assert_eq!(neg_z[0], 6);
    }

    #[test]
    fn flip_x_swaps_x_and_z_pairs() {
        let atlas = tagged_atlas(AtlasLayout::HorizontalStrip, 1);
        let set = slice_atlas(&atlas, AtlasLayout::HorizontalStrip, CubemapOrientation::FlipX)
            .unwrap();
        let tags: Vec<u8> = set.faces().iter().map(|f| f.data()[0]).collect();
        assert_eq!(tags, vec![2, 1, 3, 4, 6, 5]);
    }

    #[test]
    fn top_swaps_y_pair() {
        let atlas = tagged_atlas(AtlasLayout::Grid3x2, 1);
        let set = slice_atlas(&atlas, AtlasLayout::Auto, CubemapOrientation::Top).unwrap();
        let tags: Vec<u8> = set.faces().iter().map(|f| f.data()[0]).collect();
        assert_eq!(tags, vec![1, 2, 4, 3, 5, 6]);
    }
}
