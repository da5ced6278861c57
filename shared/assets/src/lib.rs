//! ab-assets: CPU-side asset loading for the anim bakery.
//!
//! Owns the glTF ingest path: skinned vertices, the node hierarchy with bind
//! data, and animation clips, all as plain host types the bakery can consume
//! without linking a renderer.

pub mod skinning;
pub mod types;
pub mod util;

pub use skinning::{load_gltf_skinned, merge_gltf_animations};
pub use types::{
    AnimClip, SkinnedMeshCPU, SubMeshCPU, TrackQuat, TrackVec3, VertexSkinCPU,
};
