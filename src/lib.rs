//! anim-bakery: offline skeletal-animation baking for GPU skinning.
//!
//! Clips are sampled on the CPU against a mutable rig, packed into flat
//! matrix and bone-weight streams, and written by compute kernels into
//! square lookup textures a renderer can fetch per vertex per frame. The
//! `BakedModelSet` aggregator owns the inputs and the baked outputs and
//! re-bakes when they go stale; `RebakeScheduler` debounces edit-driven
//! re-bake requests.

pub mod anim;
pub mod bake;
pub mod error;
pub mod gpu;
pub mod ingest;
pub mod rig;
pub mod scheduler;

pub use anim::{
    AnimClip, BoneKey, BoneTrack, PoseLock, SampleOptions, SampledClip, evaluate_pose,
    sample_clip,
};
pub use bake::matrix::{
    AnimationTextureData, ClipRange, MatrixAtlas, pack_clips, texture_dim, upload_matrix_texture,
};
pub use bake::model::{BakeReport, BakedModel, BakedModelSet};
pub use bake::weights::{
    BoneWeight, MeshSkinningData, MeshWeights, VertexWeights, bake_skinning, flatten_weights,
};
pub use error::{BakeError, SampleError};
pub use gpu::BakeKernels;
pub use rig::{PoseSnapshot, RigNode, Skeleton};
pub use scheduler::RebakeScheduler;
