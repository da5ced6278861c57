//! CPU-side types produced by the glTF loader.
//!
//! Everything here is plain host data, independent of any renderer. The
//! bakery turns these into GPU textures; this crate never touches a device.

use glam::{Mat4, Quat, Vec3};
use std::collections::HashMap;

/// Skinning attributes for one vertex, in mesh order.
#[derive(Clone, Copy, Debug)]
pub struct VertexSkinCPU {
    pub pos: [f32; 3],
    /// Bone indices into the skin's joint table.
    pub joints: [u16; 4],
    /// Influence weights matching `joints`. Stored as authored; the loader
    /// does not renormalize.
    pub weights: [f32; 4],
}

/// One skinned primitive: a contiguous range of `SkinnedMeshCPU::vertices`.
#[derive(Clone, Debug)]
pub struct SubMeshCPU {
    pub name: String,
    pub start: usize,
    pub len: usize,
}

/// Keyframed Vec3 channel (translation or scale).
#[derive(Clone, Debug, Default)]
pub struct TrackVec3 {
    pub times: Vec<f32>,
    pub values: Vec<Vec3>,
}

/// Keyframed rotation channel.
#[derive(Clone, Debug, Default)]
pub struct TrackQuat {
    pub times: Vec<f32>,
    pub values: Vec<Quat>,
}

/// One animation clip; tracks are keyed by node index into the source file.
#[derive(Clone, Debug, Default)]
pub struct AnimClip {
    pub name: String,
    pub duration: f32,
    pub t_tracks: HashMap<usize, TrackVec3>,
    pub r_tracks: HashMap<usize, TrackQuat>,
    pub s_tracks: HashMap<usize, TrackVec3>,
}

/// A skinned mesh plus the node hierarchy and clips it animates with.
///
/// Node-indexed vectors (`parent`, `base_*`, `node_names`) cover every node
/// in the source document so clip tracks can address non-joint nodes too.
pub struct SkinnedMeshCPU {
    pub vertices: Vec<VertexSkinCPU>,
    /// One entry per skinned primitive, ranging into `vertices`.
    pub submeshes: Vec<SubMeshCPU>,
    /// Bone index -> node index, in skin order.
    pub joints_nodes: Vec<usize>,
    /// Inverse bind matrix per bone, same order as `joints_nodes`.
    pub inverse_bind: Vec<Mat4>,
    pub parent: Vec<Option<usize>>, // node parent map
    pub base_t: Vec<Vec3>,
    pub base_r: Vec<Quat>,
    pub base_s: Vec<Vec3>,
    pub node_names: Vec<String>,
    pub animations: HashMap<String, AnimClip>,
}

impl SkinnedMeshCPU {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn bone_count(&self) -> usize {
        self.joints_nodes.len()
    }

    /// Clip names in deterministic (sorted) order.
    pub fn clip_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.animations.keys().cloned().collect();
        names.sort();
        names
    }
}
