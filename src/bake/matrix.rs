//! Matrix texture packing: sampled clips into one flat matrix stream plus a
//! clip index table, then onto the GPU as a square texture.
//!
//! Matrices are laid out clip by clip, each clip bone-major (all frames of
//! bone 0, then bone 1, ...). One matrix is one texel across four array
//! layers, one column per layer; texels raster-scan the square.

use glam::Mat4;

use crate::anim::SampledClip;
use crate::gpu::BakeKernels;

/// Where one clip lives in the packed matrix stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClipRange {
    pub index_start: u32,
    pub len: u32,
}

impl ClipRange {
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// CPU-side result of packing: the matrix stream and its clip table.
#[derive(Clone, Debug, Default)]
pub struct MatrixAtlas {
    pub matrices: Vec<Mat4>,
    pub clips: Vec<ClipRange>,
    pub any_scaled: bool,
}

impl MatrixAtlas {
    /// Edge length of the square texture holding `matrices`.
    pub fn dimension(&self) -> u32 {
        texture_dim(self.matrices.len())
    }
}

/// The GPU half of a baked model's animation data: the matrix texture and
/// the table that locates each clip inside it.
pub struct AnimationTextureData {
    pub texture: Option<wgpu::Texture>,
    pub clips: Vec<ClipRange>,
    /// Whether any baked frame carried a non-unit scale. Consumers use this
    /// to pick a skinning path that renormalizes normals.
    pub any_scaled: bool,
}

impl AnimationTextureData {
    /// Clip table lookup. An in-range index always answers, even when the
    /// clip failed to sample; its range is just empty.
    pub fn clip(&self, index: usize) -> Option<ClipRange> {
        self.clips.get(index).copied()
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }
}

/// Smallest square edge that fits `count` texels.
pub fn texture_dim(count: usize) -> u32 {
    (count as f64).sqrt().ceil() as u32
}

/// Concatenate sampled clips into one matrix stream. Ranges are gapless and
/// in submission order; failed (empty) clips occupy a zero-length range so
/// later clips keep their table positions.
pub fn pack_clips(clips: &[SampledClip]) -> MatrixAtlas {
    let mut atlas = MatrixAtlas::default();
    for (ci, clip) in clips.iter().enumerate() {
        let start = atlas.matrices.len() as u32;
        for track in &clip.tracks {
            for key in &track.keys {
                atlas.matrices.push(key.matrix);
                atlas.any_scaled |= key.scaled;
            }
        }
        let range = ClipRange {
            index_start: start,
            len: atlas.matrices.len() as u32 - start,
        };
        log::debug!(
            "clip {ci} '{}': start={} len={}",
            clip.name,
            range.index_start,
            range.len
        );
        atlas.clips.push(range);
    }
    atlas
}

/// Upload a packed atlas: dispatch the matrix kernel into a fresh
/// `Rgba32Float` texture sized `dim` x `dim` with four layers.
pub fn upload_matrix_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    kernels: &BakeKernels,
    atlas: &MatrixAtlas,
) -> AnimationTextureData {
    if atlas.matrices.is_empty() {
        log::warn!("matrix atlas is empty; skipping texture creation");
        return AnimationTextureData {
            texture: None,
            clips: atlas.clips.clone(),
            any_scaled: atlas.any_scaled,
        };
    }
    let dim = atlas.dimension();
    let flat: Vec<[f32; 16]> = atlas.matrices.iter().map(|m| m.to_cols_array()).collect();
    let texture = kernels.bake_matrices(device, queue, &flat, dim);
    log::info!(
        "{} clip(s), {} matrices, texture {dim}x{dim}x4, scaled: {}",
        atlas.clips.len(),
        atlas.matrices.len(),
        atlas.any_scaled
    );
    AnimationTextureData {
        texture: Some(texture),
        clips: atlas.clips.clone(),
        any_scaled: atlas.any_scaled,
    }
}
