//! Adapters from loaded assets to bake inputs.
//!
//! `ab-assets` hands over renderer-agnostic CPU data; this module reshapes
//! it into the skeleton, clips, and per-sub-mesh weights the bakery runs on.

use std::sync::Arc;

use ab_assets::types as cpu;

use crate::anim::AnimClip;
use crate::bake::weights::{MeshWeights, VertexWeights};
use crate::rig::{RigNode, Skeleton};

/// Capture rate assumed when a clip's tracks are too sparse to tell.
pub const FALLBACK_FPS: f32 = 30.0;

/// Build a runtime skeleton mirroring the asset's node hierarchy. Node
/// indices carry over unchanged, so clip tracks keyed by asset node index
/// address the same nodes here.
pub fn skeleton_from_cpu(asset: &cpu::SkinnedMeshCPU) -> Skeleton {
    let nodes = (0..asset.parent.len())
        .map(|i| RigNode {
            name: asset.node_names.get(i).cloned().unwrap_or_default(),
            parent: asset.parent[i],
            translation: asset.base_t[i],
            rotation: asset.base_r[i],
            scale: asset.base_s[i],
        })
        .collect();
    Skeleton {
        nodes,
        bones: asset.joints_nodes.clone(),
        inverse_bind: asset.inverse_bind.clone(),
    }
}

/// glTF stores no authored capture rate, so derive one: keys-minus-one of
/// the densest track over the clip span, rounded. Sparse or degenerate
/// clips fall back to 30 fps.
pub fn derive_frame_rate(clip: &cpu::AnimClip) -> f32 {
    if !(clip.duration > 0.0) {
        return FALLBACK_FPS;
    }
    let densest = clip
        .t_tracks
        .values()
        .map(|t| t.times.len())
        .chain(clip.r_tracks.values().map(|t| t.times.len()))
        .chain(clip.s_tracks.values().map(|t| t.times.len()))
        .max()
        .unwrap_or(0);
    if densest < 2 {
        return FALLBACK_FPS;
    }
    let rate = ((densest - 1) as f32 / clip.duration).round();
    if rate >= 1.0 { rate } else { FALLBACK_FPS }
}

pub fn clip_from_cpu(clip: &cpu::AnimClip) -> AnimClip {
    AnimClip {
        name: clip.name.clone(),
        duration: clip.duration,
        frame_rate: derive_frame_rate(clip),
        t_tracks: clip.t_tracks.clone(),
        r_tracks: clip.r_tracks.clone(),
        s_tracks: clip.s_tracks.clone(),
    }
}

/// Clips in the given order, which fixes their clip-table indices. `None`
/// takes every clip in the asset, sorted by name for determinism. Names
/// missing from the asset are dropped with a warning.
pub fn clips_from_cpu(asset: &cpu::SkinnedMeshCPU, order: Option<&[String]>) -> Vec<AnimClip> {
    let names: Vec<String> = match order {
        Some(names) => names.to_vec(),
        None => asset.clip_names(),
    };
    let mut out = Vec::with_capacity(names.len());
    for name in &names {
        match asset.animations.get(name) {
            Some(clip) => out.push(clip_from_cpu(clip)),
            None => log::warn!("clip '{name}' not found in asset, dropped"),
        }
    }
    out
}

/// One `MeshWeights` per sub-mesh, behind `Arc` so baked models can watch
/// the source with weak references.
pub fn mesh_weights_from_cpu(asset: &cpu::SkinnedMeshCPU) -> Vec<Arc<MeshWeights>> {
    let mut out = Vec::with_capacity(asset.submeshes.len());
    for sm in &asset.submeshes {
        let Some(range) = asset.vertices.get(sm.start..sm.start + sm.len) else {
            log::warn!("sub-mesh '{}' range is out of bounds, dropped", sm.name);
            continue;
        };
        let verts = range
            .iter()
            .map(|v| VertexWeights {
                bones: [
                    i32::from(v.joints[0]),
                    i32::from(v.joints[1]),
                    i32::from(v.joints[2]),
                    i32::from(v.joints[3]),
                ],
                weights: v.weights,
            })
            .collect();
        out.push(Arc::new(MeshWeights {
            name: sm.name.clone(),
            verts,
        }));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ab_assets::types::{SubMeshCPU, TrackVec3, VertexSkinCPU};
    use glam::{Mat4, Quat, Vec3};
    use std::collections::HashMap;

    fn tiny_asset() -> cpu::SkinnedMeshCPU {
        let mut animations = HashMap::new();
        let mut walk = cpu::AnimClip {
            name: "walk".into(),
            duration: 1.0,
            ..Default::default()
        };
        walk.t_tracks.insert(
            1,
            TrackVec3 {
                times: (0..=30).map(|i| i as f32 / 30.0).collect(),
                values: vec![Vec3::ZERO; 31],
            },
        );
        animations.insert("walk".to_string(), walk);
        animations.insert(
            "idle".to_string(),
            cpu::AnimClip {
                name: "idle".into(),
                duration: 2.0,
                ..Default::default()
            },
        );
        cpu::SkinnedMeshCPU {
            vertices: vec![
                VertexSkinCPU {
                    pos: [0.0; 3],
                    joints: [0, 1, 0, 0],
                    weights: [0.75, 0.25, 0.0, 0.0],
                },
                VertexSkinCPU {
                    pos: [0.0; 3],
                    joints: [1, 0, 0, 0],
                    weights: [1.0, 0.0, 0.0, 0.0],
                },
            ],
            submeshes: vec![
                SubMeshCPU {
                    name: "body.0".into(),
                    start: 0,
                    len: 1,
                },
                SubMeshCPU {
                    name: "body.1".into(),
                    start: 1,
                    len: 1,
                },
            ],
            joints_nodes: vec![0, 1],
            inverse_bind: vec![Mat4::IDENTITY, Mat4::from_translation(Vec3::X)],
            parent: vec![None, Some(0)],
            base_t: vec![Vec3::ZERO, Vec3::Y],
            base_r: vec![Quat::IDENTITY, Quat::IDENTITY],
            base_s: vec![Vec3::ONE, Vec3::ONE],
            node_names: vec!["root".into(), "arm".into()],
            animations,
        }
    }

    #[test]
    fn skeleton_mirrors_node_indices() {
        let asset = tiny_asset();
        let skel = skeleton_from_cpu(&asset);
        assert_eq!(skel.nodes.len(), 2);
        assert_eq!(skel.nodes[1].parent, Some(0));
        assert_eq!(skel.nodes[1].name, "arm");
        assert_eq!(skel.nodes[1].translation, Vec3::Y);
        assert_eq!(skel.bones, vec![0, 1]);
        assert_eq!(skel.inverse_bind[1], Mat4::from_translation(Vec3::X));
    }

    #[test]
    fn frame_rate_follows_the_densest_track() {
        let asset = tiny_asset();
        let walk = &asset.animations["walk"];
        assert_eq!(derive_frame_rate(walk), 30.0);

        let mut half = cpu::AnimClip {
            name: "half".into(),
            duration: 0.5,
            ..Default::default()
        };
        half.r_tracks.insert(
            0,
            ab_assets::types::TrackQuat {
                times: (0..=10).map(|i| i as f32 / 20.0).collect(),
                values: vec![Quat::IDENTITY; 11],
            },
        );
        assert_eq!(derive_frame_rate(&half), 20.0);
    }

    #[test]
    fn sparse_clips_fall_back_to_30() {
        let idle = cpu::AnimClip {
            name: "idle".into(),
            duration: 2.0,
            ..Default::default()
        };
        assert_eq!(derive_frame_rate(&idle), FALLBACK_FPS);

        let broken = cpu::AnimClip {
            name: "broken".into(),
            duration: 0.0,
            ..Default::default()
        };
        assert_eq!(derive_frame_rate(&broken), FALLBACK_FPS);
    }

    #[test]
    fn explicit_order_fixes_clip_indices() {
        let asset = tiny_asset();
        let order = vec!["walk".to_string(), "idle".to_string()];
        let clips = clips_from_cpu(&asset, Some(&order));
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].name, "walk");
        assert_eq!(clips[1].name, "idle");
    }

    #[test]
    fn default_order_is_sorted_by_name() {
        let asset = tiny_asset();
        let clips = clips_from_cpu(&asset, None);
        assert_eq!(clips[0].name, "idle");
        assert_eq!(clips[1].name, "walk");
    }

    #[test]
    fn unknown_clip_names_are_dropped() {
        let asset = tiny_asset();
        let order = vec!["walk".to_string(), "sprint".to_string()];
        let clips = clips_from_cpu(&asset, Some(&order));
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].name, "walk");
    }

    #[test]
    fn sub_meshes_become_separate_weight_sets() {
        let asset = tiny_asset();
        let meshes = mesh_weights_from_cpu(&asset);
        assert_eq!(meshes.len(), 2);
        assert_eq!(meshes[0].name, "body.0");
        assert_eq!(meshes[0].verts.len(), 1);
        assert_eq!(meshes[0].verts[0].bones, [0, 1, 0, 0]);
        assert_eq!(meshes[0].verts[0].weights, [0.75, 0.25, 0.0, 0.0]);
        assert_eq!(meshes[1].verts[0].bones, [1, 0, 0, 0]);
    }
}
