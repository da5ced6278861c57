//! Baked model aggregation: drive sampling and both packers for a skeleton
//! and its sub-meshes, own the results, and re-bake when they go stale.

use std::sync::Arc;

use crate::anim::{AnimClip, PoseLock, SampleOptions, SampledClip, sample_clip};
use crate::bake::matrix::{AnimationTextureData, pack_clips, upload_matrix_texture};
use crate::bake::weights::{MeshSkinningData, MeshWeights, bake_skinning};
use crate::error::{BakeError, SampleError};
use crate::gpu::BakeKernels;
use crate::rig::Skeleton;

/// One sub-mesh's baked output: its weight texture plus the shared-shape
/// animation texture.
pub struct BakedModel {
    pub skinning: MeshSkinningData,
    pub animations: AnimationTextureData,
}

impl BakedModel {
    /// A model is usable only while its source mesh is alive, it has at
    /// least one clip, and both textures exist.
    pub fn is_valid(&self) -> bool {
        self.skinning.mesh().is_some()
            && !self.animations.clips.is_empty()
            && self.skinning.texture.is_some()
            && self.animations.texture.is_some()
    }

    /// Both GPU textures, for hosts that hand them to a renderer.
    pub fn textures(&self) -> impl Iterator<Item = &wgpu::Texture> {
        self.skinning
            .texture
            .iter()
            .chain(self.animations.texture.iter())
    }

    /// Release GPU memory eagerly. The model reads as invalid afterwards.
    pub fn dispose(&mut self) {
        if let Some(t) = self.skinning.texture.take() {
            t.destroy();
        }
        if let Some(t) = self.animations.texture.take() {
            t.destroy();
        }
    }
}

impl Drop for BakedModel {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// What a bake pass produced, for callers that want more than Ok.
#[derive(Debug, Default)]
pub struct BakeReport {
    pub models: usize,
    /// Clips that could not be sampled this pass; their table slots are
    /// present but empty.
    pub skipped: Vec<SampleError>,
}

/// Owns everything needed to (re)bake one skeleton: the rig, its clips, the
/// sub-mesh weights, and the current baked models.
///
/// Baking is transactional: a failed pass leaves the previous models
/// untouched, and a successful pass destroys their textures before the new
/// ones take the slots.
pub struct BakedModelSet {
    skeleton: Skeleton,
    clips: Vec<AnimClip>,
    meshes: Vec<Arc<MeshWeights>>,
    options: SampleOptions,
    models: Vec<BakedModel>,
}

impl BakedModelSet {
    pub fn new(
        skeleton: Skeleton,
        clips: Vec<AnimClip>,
        meshes: Vec<Arc<MeshWeights>>,
        options: SampleOptions,
    ) -> Self {
        Self {
            skeleton,
            clips,
            meshes,
            options,
            models: Vec::new(),
        }
    }

    pub fn has_baked(&self) -> bool {
        !self.models.is_empty()
    }

    /// Total clip table entries across all baked models.
    pub fn clip_count(&self) -> usize {
        self.models.iter().map(|m| m.animations.clip_count()).sum()
    }

    pub fn baked_models(&self) -> &[BakedModel] {
        &self.models
    }

    fn check_inputs(&self) -> Result<(), BakeError> {
        if self.skeleton.nodes.is_empty() || self.skeleton.bone_count() == 0 {
            return Err(BakeError::NoSkeleton);
        }
        if self.clips.is_empty() {
            return Err(BakeError::NoClips);
        }
        if self.meshes.is_empty() {
            return Err(BakeError::NoMesh);
        }
        Ok(())
    }

    /// Sample every clip once under the lock. Lock contention aborts the
    /// pass; any other failure costs only its clip, whose slot stays in
    /// the output as an empty placeholder.
    fn sample_all(
        &mut self,
        lock: &PoseLock,
    ) -> Result<(Vec<SampledClip>, Vec<SampleError>), BakeError> {
        let mut sampled: Vec<SampledClip> = Vec::with_capacity(self.clips.len());
        let mut skipped: Vec<SampleError> = Vec::new();
        for clip in &self.clips {
            match sample_clip(&mut self.skeleton, clip, &self.options, lock) {
                Ok(s) => sampled.push(s),
                Err(SampleError::PoseBusy) => return Err(BakeError::PoseLockHeld),
                Err(err) => {
                    log::warn!("skipping {err}");
                    sampled.push(SampledClip::empty(clip.name.clone()));
                    skipped.push(err);
                }
            }
        }
        Ok((sampled, skipped))
    }

    /// Install a fresh bake: every prior model's GPU data is destroyed
    /// before the new list takes the slots.
    fn commit(&mut self, fresh: Vec<BakedModel>) {
        for old in &mut self.models {
            old.dispose();
        }
        self.models = fresh;
    }

    /// Run a full bake pass: sample every clip once, then bake weights and
    /// the animation texture per sub-mesh. Commits only on success.
    pub fn bake(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        kernels: &BakeKernels,
        lock: &PoseLock,
    ) -> Result<BakeReport, BakeError> {
        self.check_inputs()?;

        // One sampling pass feeds every sub-mesh.
        let (sampled, skipped) = self.sample_all(lock)?;

        let mut fresh: Vec<BakedModel> = Vec::with_capacity(self.meshes.len());
        for mesh in &self.meshes {
            let skinning = bake_skinning(device, queue, kernels, mesh);
            let atlas = pack_clips(&sampled);
            let animations = upload_matrix_texture(device, queue, kernels, &atlas);
            fresh.push(BakedModel {
                skinning,
                animations,
            });
        }
        self.commit(fresh);

        let report = BakeReport {
            models: self.models.len(),
            skipped,
        };
        log::info!(
            "baked {} model(s), {} clip slot(s), {} skipped",
            report.models,
            self.clips.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// The baked models, re-baking first if anything went stale (a disposed
    /// model, a dropped source mesh, or no bake yet).
    pub fn models(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        kernels: &BakeKernels,
        lock: &PoseLock,
    ) -> Result<&[BakedModel], BakeError> {
        let stale = self.models.is_empty() || self.models.iter().any(|m| !m.is_valid());
        if stale {
            log::debug!("baked models missing or stale, re-baking");
            self.bake(device, queue, kernels, lock)?;
        }
        Ok(&self.models)
    }

    /// Release all baked GPU data. The next `models` call re-bakes.
    pub fn dispose(&mut self) {
        for model in &mut self.models {
            model.dispose();
        }
        self.models.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::weights::VertexWeights;
    use crate::rig::RigNode;
    use glam::{Mat4, Quat, Vec3};

    fn one_bone_skeleton() -> Skeleton {
        Skeleton {
            nodes: vec![RigNode {
                name: "root".into(),
                parent: None,
                translation: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
            }],
            bones: vec![0],
            inverse_bind: vec![Mat4::IDENTITY],
        }
    }

    fn one_mesh() -> Arc<MeshWeights> {
        Arc::new(MeshWeights {
            name: "m".into(),
            verts: vec![VertexWeights {
                bones: [0, 0, 0, 0],
                weights: [1.0, 0.0, 0.0, 0.0],
            }],
        })
    }

    fn one_clip() -> AnimClip {
        AnimClip {
            name: "idle".into(),
            duration: 1.0,
            frame_rate: 30.0,
            ..Default::default()
        }
    }

    fn texture_less_model(mesh: &Arc<MeshWeights>, clips: u32) -> BakedModel {
        BakedModel {
            skinning: MeshSkinningData {
                mesh: Arc::downgrade(mesh),
                texture: None,
            },
            animations: AnimationTextureData {
                texture: None,
                clips: (0..clips)
                    .map(|i| crate::bake::matrix::ClipRange {
                        index_start: i,
                        len: 1,
                    })
                    .collect(),
                any_scaled: false,
            },
        }
    }

    #[test]
    fn refuses_without_a_skeleton() {
        let set = BakedModelSet::new(
            Skeleton {
                nodes: Vec::new(),
                bones: Vec::new(),
                inverse_bind: Vec::new(),
            },
            vec![one_clip()],
            vec![one_mesh()],
            SampleOptions::default(),
        );
        assert!(matches!(set.check_inputs(), Err(BakeError::NoSkeleton)));
    }

    #[test]
    fn refuses_without_clips() {
        let set = BakedModelSet::new(
            one_bone_skeleton(),
            Vec::new(),
            vec![one_mesh()],
            SampleOptions::default(),
        );
        assert!(matches!(set.check_inputs(), Err(BakeError::NoClips)));
    }

    #[test]
    fn refuses_without_meshes() {
        let set = BakedModelSet::new(
            one_bone_skeleton(),
            vec![one_clip()],
            Vec::new(),
            SampleOptions::default(),
        );
        assert!(matches!(set.check_inputs(), Err(BakeError::NoMesh)));
    }

    #[test]
    fn accepts_complete_inputs() {
        let set = BakedModelSet::new(
            one_bone_skeleton(),
            vec![one_clip()],
            vec![one_mesh()],
            SampleOptions::default(),
        );
        assert!(set.check_inputs().is_ok());
        assert!(!set.has_baked());
    }

    #[test]
    fn model_without_textures_is_invalid() {
        let mesh = one_mesh();
        let model = texture_less_model(&mesh, 1);
        assert!(!model.is_valid());
        assert_eq!(model.textures().count(), 0);
    }

    #[test]
    fn dispose_resets_the_set() {
        let mut set = BakedModelSet::new(
            one_bone_skeleton(),
            vec![one_clip()],
            vec![one_mesh()],
            SampleOptions::default(),
        );
        set.dispose();
        assert!(!set.has_baked());
        assert_eq!(set.clip_count(), 0);
    }

    #[test]
    fn model_with_dead_mesh_is_invalid() {
        let mesh = one_mesh();
        let model = texture_less_model(&mesh, 1);
        drop(mesh);
        assert!(model.skinning.mesh().is_none());
        assert!(!model.is_valid());
    }

    #[test]
    fn commit_retires_prior_models_for_the_fresh_list() {
        let mesh = one_mesh();
        let mut set = BakedModelSet::new(
            one_bone_skeleton(),
            vec![one_clip()],
            vec![mesh.clone()],
            SampleOptions::default(),
        );
        set.models.push(texture_less_model(&mesh, 2));
        assert_eq!(set.clip_count(), 2);

        let fresh = vec![texture_less_model(&mesh, 5)];
        assert_eq!(Arc::weak_count(&mesh), 2);
        set.commit(fresh);
        // The prior model is gone, weak handle and all; only the fresh
        // clip table remains.
        assert_eq!(Arc::weak_count(&mesh), 1);
        assert_eq!(set.clip_count(), 5);
        assert!(set.has_baked());
    }

    #[test]
    fn unresolved_clip_is_skipped_with_its_slot_kept() {
        let mut broken = one_clip();
        broken.name = "broken".into();
        broken.duration = 0.0;
        let mut set = BakedModelSet::new(
            one_bone_skeleton(),
            vec![one_clip(), broken, one_clip()],
            vec![one_mesh()],
            SampleOptions::default(),
        );
        let lock = PoseLock::new();
        let (sampled, skipped) = set.sample_all(&lock).expect("pass survives");
        assert_eq!(sampled.len(), 3);
        assert_eq!(sampled[1].name, "broken");
        assert_eq!(sampled[1].matrix_count(), 0);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].clip_name(), Some("broken"));
    }

    #[test]
    fn held_lock_fails_the_pass_not_the_clip() {
        let mut set = BakedModelSet::new(
            one_bone_skeleton(),
            vec![one_clip()],
            vec![one_mesh()],
            SampleOptions::default(),
        );
        let lock = PoseLock::new();
        let _guard = lock.try_enter().expect("hold the lock");
        let err = set.sample_all(&lock).expect_err("pass must abort");
        assert_eq!(err, BakeError::PoseLockHeld);
    }
}
