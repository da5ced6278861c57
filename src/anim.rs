//! CPU-side clip sampling.
//!
//! A clip is stepped frame by frame against a mutable `Skeleton`; each kept
//! frame records one mesh-space skinning matrix per bone. The rig's authored
//! pose is snapshotted first and restored bit-for-bit afterwards, and the
//! whole pass runs under a `PoseLock` so only one evaluation can touch rigs
//! at a time.

use ab_assets::types::{TrackQuat, TrackVec3};
use glam::{Mat4, Quat, Vec3};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, TryLockError};

use crate::error::SampleError;
use crate::rig::{PoseSnapshot, Skeleton};

/// A clip ready to bake: asset tracks plus its authored capture rate.
/// Tracks are keyed by node index into the owning skeleton.
#[derive(Clone, Debug, Default)]
pub struct AnimClip {
    pub name: String,
    pub duration: f32,
    /// Authored capture rate in frames per second.
    pub frame_rate: f32,
    pub t_tracks: HashMap<usize, TrackVec3>,
    pub r_tracks: HashMap<usize, TrackQuat>,
    pub s_tracks: HashMap<usize, TrackVec3>,
}

/// Knobs for one sampling pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct SampleOptions {
    /// Frames dropped between kept frames; 0 keeps every frame.
    pub skip: u32,
    /// Overrides the clip's authored frame rate when `Some` and positive.
    pub frame_rate: Option<f32>,
}

/// One recorded frame for one bone: the mesh-space skinning matrix
/// (world pose times inverse bind) at `time` seconds into the clip.
#[derive(Clone, Copy, Debug)]
pub struct BoneKey {
    pub time: f32,
    pub matrix: Mat4,
    pub scaled: bool,
}

/// All recorded frames for one bone, in clip order.
#[derive(Clone, Debug)]
pub struct BoneTrack {
    pub bone: usize,
    pub keys: Vec<BoneKey>,
}

/// Output of sampling one clip across all bones. Tracks are in bone-index
/// order.
#[derive(Clone, Debug)]
pub struct SampledClip {
    pub name: String,
    /// Effective playback rate after frame skipping.
    pub sampled_fps: u32,
    pub tracks: Vec<BoneTrack>,
}

impl SampledClip {
    /// Placeholder for a clip that failed to sample; packs to a zero-length
    /// range so later clips keep their positions.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sampled_fps: 0,
            tracks: Vec::new(),
        }
    }

    pub fn matrix_count(&self) -> usize {
        self.tracks.iter().map(|t| t.keys.len()).sum()
    }
}

/// Serializes pose evaluation. Hosts create one lock and hand it to every
/// sampling call; a second concurrent pass gets `PoseBusy` instead of
/// racing the first on shared rig state. Not reentrant.
#[derive(Default)]
pub struct PoseLock {
    inner: Mutex<()>,
}

impl PoseLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking acquire.
    pub fn try_enter(&self) -> Result<PoseGuard<'_>, SampleError> {
        match self.inner.try_lock() {
            Ok(g) => Ok(PoseGuard { _inner: g }),
            // A panicked pass leaves no state behind worth protecting.
            Err(TryLockError::Poisoned(p)) => Ok(PoseGuard {
                _inner: p.into_inner(),
            }),
            Err(TryLockError::WouldBlock) => Err(SampleError::PoseBusy),
        }
    }
}

/// Held for the duration of one sampling pass.
pub struct PoseGuard<'a> {
    _inner: MutexGuard<'a, ()>,
}

/// Apply a clip's tracks to the skeleton's local pose at `time` seconds.
/// Nodes without a track keep their current locals.
pub fn evaluate_pose(skeleton: &mut Skeleton, clip: &AnimClip, time: f32) {
    for (node, tr) in &clip.t_tracks {
        if let Some(n) = skeleton.nodes.get_mut(*node) {
            n.translation = sample_vec3(tr, time, n.translation);
        }
    }
    for (node, rr) in &clip.r_tracks {
        if let Some(n) = skeleton.nodes.get_mut(*node) {
            n.rotation = sample_quat(rr, time, n.rotation);
        }
    }
    for (node, sr) in &clip.s_tracks {
        if let Some(n) = skeleton.nodes.get_mut(*node) {
            n.scale = sample_vec3(sr, time, n.scale);
        }
    }
}

/// Decomposing a rotated pose yields scale components within a few ulps of
/// one, never exactly one; only differences beyond this count as scaling.
const SCALE_EPSILON: f32 = 1e-4;

/// Step one clip through the skeleton and record per-bone skinning matrices.
///
/// The frame walk runs at the clip's authored rate (or the override), with
/// `skip` frames dropped between kept ones; dropped frames still advance the
/// clock, so total duration is preserved. Each kept frame stores
/// `world * inverse_bind` per bone, with the world matrix rebuilt from the
/// decomposed position/rotation/scale of the posed node.
pub fn sample_clip(
    skeleton: &mut Skeleton,
    clip: &AnimClip,
    opts: &SampleOptions,
    lock: &PoseLock,
) -> Result<SampledClip, SampleError> {
    let rate = opts
        .frame_rate
        .filter(|r| *r > 0.0)
        .unwrap_or(clip.frame_rate);
    if !clip.duration.is_finite() || clip.duration <= 0.0 {
        return Err(SampleError::unresolved(&clip.name, "no resolvable duration"));
    }
    if !rate.is_finite() || rate <= 0.0 {
        return Err(SampleError::unresolved(
            &clip.name,
            "no resolvable frame rate",
        ));
    }
    let stride = u64::from(opts.skip) + 1;
    let sampled_fps = (rate / stride as f32).floor() as u32;
    // Frame count stays a float so kept-frame times divide the true span.
    let frames = clip.duration * rate;
    let total = frames.ceil() as u64;

    let snapshot = PoseSnapshot::capture(skeleton);
    let guard = lock.try_enter()?;

    let mut tracks: Vec<BoneTrack> = (0..skeleton.bone_count())
        .map(|bone| BoneTrack {
            bone,
            keys: Vec::new(),
        })
        .collect();
    for i in 0..total {
        if i % stride != 0 {
            continue;
        }
        let t = (i as f32 / frames) * clip.duration;
        evaluate_pose(skeleton, clip, t);
        let worlds = skeleton.world_transforms();
        for track in &mut tracks {
            let node = skeleton.bones[track.bone];
            let world = worlds.get(node).copied().unwrap_or(Mat4::IDENTITY);
            let (s, r, pos) = world.to_scale_rotation_translation();
            let composed = Mat4::from_scale_rotation_translation(s, r, pos);
            let ibm = skeleton
                .inverse_bind
                .get(track.bone)
                .copied()
                .unwrap_or(Mat4::IDENTITY);
            track.keys.push(BoneKey {
                time: t,
                matrix: composed * ibm,
                scaled: !s.abs_diff_eq(Vec3::ONE, SCALE_EPSILON),
            });
        }
    }

    drop(guard);
    snapshot.restore(skeleton);

    log::debug!(
        "sampled clip '{}': {} frame(s) per bone at {} fps",
        clip.name,
        tracks.first().map(|t| t.keys.len()).unwrap_or(0),
        sampled_fps
    );
    Ok(SampledClip {
        name: clip.name.clone(),
        sampled_fps,
        tracks,
    })
}

fn sample_vec3(tr: &TrackVec3, t: f32, default: Vec3) -> Vec3 {
    if tr.times.is_empty() {
        return default;
    }
    if t <= tr.times[0] {
        return tr.values[0];
    }
    if t >= *tr.times.last().unwrap() {
        return *tr.values.last().unwrap();
    }
    let mut i = 0;
    while i + 1 < tr.times.len() && !(t >= tr.times[i] && t <= tr.times[i + 1]) {
        i += 1;
    }
    let t0 = tr.times[i];
    let t1 = tr.times[i + 1];
    let f = (t - t0) / (t1 - t0);
    tr.values[i].lerp(tr.values[i + 1], f)
}

fn sample_quat(tr: &TrackQuat, t: f32, default: Quat) -> Quat {
    if tr.times.is_empty() {
        return default;
    }
    if t <= tr.times[0] {
        return tr.values[0];
    }
    if t >= *tr.times.last().unwrap() {
        return *tr.values.last().unwrap();
    }
    let mut i = 0;
    while i + 1 < tr.times.len() && !(t >= tr.times[i] && t <= tr.times[i + 1]) {
        i += 1;
    }
    let t0 = tr.times[i];
    let t1 = tr.times[i + 1];
    let f = (t - t0) / (t1 - t0);
    tr.values[i].slerp(tr.values[i + 1], f)
}
