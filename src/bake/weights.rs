//! Bone-weight packing: per-vertex influences into a flat entry stream,
//! then onto the GPU as a square two-channel texture.
//!
//! Every vertex contributes exactly four entries in slot order, weighted or
//! not, so a vertex's influences live at entries `4v .. 4v+4`. Weights are
//! taken as authored; nothing is renormalized here.

use std::sync::{Arc, Weak};

use crate::bake::matrix::texture_dim;
use crate::gpu::BakeKernels;

/// One bone/weight pair as the kernel consumes it: 8 bytes, tightly packed.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BoneWeight {
    pub index: i32,
    pub weight: f32,
}

/// Four influences for one vertex, in authored slot order.
#[derive(Clone, Copy, Debug, Default)]
pub struct VertexWeights {
    pub bones: [i32; 4],
    pub weights: [f32; 4],
}

/// Per-vertex skinning weights for one sub-mesh.
#[derive(Clone, Debug)]
pub struct MeshWeights {
    pub name: String,
    pub verts: Vec<VertexWeights>,
}

impl MeshWeights {
    pub fn vertex_count(&self) -> usize {
        self.verts.len()
    }
}

/// CPU-side result of flattening one mesh's weights.
#[derive(Clone, Debug, Default)]
pub struct WeightAtlas {
    pub entries: Vec<BoneWeight>,
}

impl WeightAtlas {
    /// Edge length of the square texture holding `entries`.
    pub fn dimension(&self) -> u32 {
        texture_dim(self.entries.len())
    }
}

/// The GPU half of a baked model's skinning data. `mesh` stays a weak
/// reference: when the source mesh goes away the baked model turns invalid
/// instead of keeping it alive.
pub struct MeshSkinningData {
    pub mesh: Weak<MeshWeights>,
    pub texture: Option<wgpu::Texture>,
}

impl MeshSkinningData {
    pub fn mesh(&self) -> Option<Arc<MeshWeights>> {
        self.mesh.upgrade()
    }
}

/// Flatten a mesh's weights into the kernel's entry stream: four entries per
/// vertex, slot order preserved.
pub fn flatten_weights(mesh: &MeshWeights) -> WeightAtlas {
    let mut entries = Vec::with_capacity(mesh.verts.len() * 4);
    for v in &mesh.verts {
        for slot in 0..4 {
            entries.push(BoneWeight {
                index: v.bones[slot],
                weight: v.weights[slot],
            });
        }
    }
    WeightAtlas { entries }
}

/// Bake one mesh's weights: flatten, dispatch the weight kernel into a fresh
/// `Rg32Float` texture, and hand back the skinning data tied to the mesh by
/// a weak reference.
pub fn bake_skinning(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    kernels: &BakeKernels,
    mesh: &Arc<MeshWeights>,
) -> MeshSkinningData {
    let atlas = flatten_weights(mesh);
    if atlas.entries.is_empty() {
        log::warn!("mesh '{}' has no vertices; skipping weight texture", mesh.name);
        return MeshSkinningData {
            mesh: Arc::downgrade(mesh),
            texture: None,
        };
    }
    let dim = atlas.dimension();
    let texture = kernels.bake_weights(device, queue, &atlas.entries, dim);
    log::debug!(
        "mesh '{}': {} vertices, {} weight entries, texture {dim}x{dim}",
        mesh.name,
        mesh.vertex_count(),
        atlas.entries.len()
    );
    MeshSkinningData {
        mesh: Arc::downgrade(mesh),
        texture: Some(texture),
    }
}
