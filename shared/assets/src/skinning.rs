//! Skinned mesh and clip loading from glTF/GLB files.

use anyhow::{Context, Result, bail};
use glam::{Mat4, Quat, Vec3};
use gltf::mesh::util::{ReadJoints, ReadWeights};
use std::collections::HashMap;
use std::path::Path;

use crate::types::{AnimClip, SkinnedMeshCPU, SubMeshCPU, TrackQuat, TrackVec3, VertexSkinCPU};
use crate::util::prepare_gltf_path;

/// Load the first skin in a glTF/GLB plus every primitive bound to it.
///
/// Each skinned primitive becomes one `SubMeshCPU`; their vertices land in a
/// single shared vertex table. Files without any skinned primitive are an
/// error, the bakery has no use for rigid geometry.
pub fn load_gltf_skinned(path: &Path) -> Result<SkinnedMeshCPU> {
    let prepared = prepare_gltf_path(path);
    let (doc, buffers, _images) = gltf::import(&prepared)
        .with_context(|| format!("import skinned glTF: {}", prepared.display()))?;

    if doc
        .extensions_required()
        .any(|e| e == "KHR_draco_mesh_compression")
    {
        bail!(
            "{} requires KHR_draco_mesh_compression; provide a pre-decompressed copy (<name>.decompressed.gltf) next to it",
            prepared.display()
        );
    }

    // Parent map and base TRS over the whole node hierarchy.
    let node_count = doc.nodes().len();
    let mut parent = vec![None; node_count];
    for n in doc.nodes() {
        for c in n.children() {
            parent[c.index()] = Some(n.index());
        }
    }
    let mut base_t = vec![Vec3::ZERO; node_count];
    let mut base_r = vec![Quat::IDENTITY; node_count];
    let mut base_s = vec![Vec3::ONE; node_count];
    for n in doc.nodes() {
        let (t, r, s) = decompose_node(&n);
        base_t[n.index()] = t;
        base_r[n.index()] = r;
        base_s[n.index()] = s;
    }
    let node_names: Vec<String> = doc
        .nodes()
        .map(|n| n.name().unwrap_or("").to_string())
        .collect();

    // The first node with a skin decides which skin we bake; every node bound
    // to that same skin contributes its primitives as sub-meshes.
    let Some(skin) = doc.nodes().find_map(|n| n.skin()) else {
        bail!("no skin in {}", prepared.display());
    };
    let mut verts: Vec<VertexSkinCPU> = Vec::new();
    let mut submeshes: Vec<SubMeshCPU> = Vec::new();
    for node in doc.nodes() {
        let Some(node_skin) = node.skin() else {
            continue;
        };
        if node_skin.index() != skin.index() {
            continue;
        }
        let Some(mesh) = node.mesh() else {
            continue;
        };
        let label = node.name().or(mesh.name()).unwrap_or("submesh");
        for (pi, prim) in mesh.primitives().enumerate() {
            let reader = prim.reader(|b| buffers.get(b.index()).map(|bb| bb.0.as_slice()));
            let (Some(pos_it), Some(joints_it), Some(weights_it)) = (
                reader.read_positions(),
                reader.read_joints(0),
                reader.read_weights(0),
            ) else {
                log::warn!("{label}: primitive {pi} has no skinning attributes, skipped");
                continue;
            };
            let pos: Vec<[f32; 3]> = pos_it.collect();
            let joints: Vec<[u16; 4]> = match joints_it {
                ReadJoints::U16(it) => it.collect(),
                ReadJoints::U8(it) => it.map(|j| j.map(u16::from)).collect(),
            };
            let weights: Vec<[f32; 4]> = match weights_it {
                ReadWeights::F32(it) => it.collect(),
                ReadWeights::U16(it) => {
                    it.map(|w| w.map(|v| f32::from(v) / 65535.0)).collect()
                }
                ReadWeights::U8(it) => {
                    it.map(|w| w.map(|v| f32::from(v) / 255.0)).collect()
                }
            };
            if joints.len() != pos.len() || weights.len() != pos.len() {
                bail!("{label}: primitive {pi} skinning attribute counts disagree");
            }
            let start = verts.len();
            for i in 0..pos.len() {
                verts.push(VertexSkinCPU {
                    pos: pos[i],
                    joints: joints[i],
                    weights: weights[i],
                });
            }
            submeshes.push(SubMeshCPU {
                name: format!("{label}.{pi}"),
                start,
                len: pos.len(),
            });
        }
    }
    if submeshes.is_empty() {
        bail!("no skinned primitives in {}", prepared.display());
    }

    // Joint table and inverse bind matrices.
    let joints_nodes: Vec<usize> = skin.joints().map(|j| j.index()).collect();
    let rdr = skin.reader(|b| buffers.get(b.index()).map(|bb| bb.0.as_slice()));
    let inverse_bind: Vec<Mat4> = match rdr.read_inverse_bind_matrices() {
        Some(iter) => iter.map(|m| Mat4::from_cols_array_2d(&m)).collect(),
        None => vec![Mat4::IDENTITY; joints_nodes.len()],
    };

    let animations = read_animations(&doc, &buffers);

    Ok(SkinnedMeshCPU {
        vertices: verts,
        submeshes,
        joints_nodes,
        inverse_bind,
        parent,
        base_t,
        base_r,
        base_s,
        node_names,
        animations,
    })
}

/// Merge animation clips from another glTF/GLB into an existing skinned mesh
/// by node-name mapping. The source only needs nodes and animations, so pure
/// clip libraries without a skin work too. Returns the number of clips
/// merged; clips with the same name replace earlier ones.
pub fn merge_gltf_animations(base: &mut SkinnedMeshCPU, anim_path: &Path) -> Result<usize> {
    let prepared = prepare_gltf_path(anim_path);
    let (doc, buffers, _images) = gltf::import(&prepared)
        .with_context(|| format!("import animation glTF: {}", prepared.display()))?;
    let other_names: Vec<String> = doc
        .nodes()
        .map(|n| n.name().unwrap_or("").to_string())
        .collect();
    let mut merged = 0usize;
    for (name, clip) in read_animations(&doc, &buffers) {
        let remapped = remap_clip(&clip, &other_names, &base.node_names);
        if remapped.t_tracks.is_empty()
            && remapped.r_tracks.is_empty()
            && remapped.s_tracks.is_empty()
        {
            log::warn!("clip '{name}' shares no bones with the target rig, skipped");
            continue;
        }
        base.animations.insert(name, remapped);
        merged += 1;
    }
    Ok(merged)
}

/// Collect every animation clip in a document. Unnamed clips get a stable
/// `clip{index}` name.
fn read_animations(
    doc: &gltf::Document,
    buffers: &[gltf::buffer::Data],
) -> HashMap<String, AnimClip> {
    let mut animations: HashMap<String, AnimClip> = HashMap::new();
    for anim in doc.animations() {
        let name = anim
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("clip{}", anim.index()));
        let mut clip = AnimClip {
            name: name.clone(),
            ..Default::default()
        };
        for ch in anim.channels() {
            read_channel(&ch, buffers, &mut clip);
        }
        animations.insert(name, clip);
    }
    animations
}

/// Fold one channel into the clip: its keyframe times stretch the clip's
/// duration, and its outputs land in the track map for the targeted node.
fn read_channel(
    ch: &gltf::animation::Channel,
    buffers: &[gltf::buffer::Data],
    clip: &mut AnimClip,
) {
    use gltf::animation::util::ReadOutputs;

    let node = ch.target().node().index();
    let rdr = ch.reader(|b| buffers.get(b.index()).map(|bb| bb.0.as_slice()));
    let Some(inputs) = rdr.read_inputs() else {
        return;
    };
    let times: Vec<f32> = inputs.collect();
    if let Some(&last) = times.last()
        && last > clip.duration
    {
        clip.duration = last;
    }
    match rdr.read_outputs() {
        Some(ReadOutputs::Translations(it)) => {
            let values = it.map(Vec3::from).collect();
            clip.t_tracks.insert(node, TrackVec3 { times, values });
        }
        Some(ReadOutputs::Rotations(it)) => {
            let values = it
                .into_f32()
                .map(|q| Quat::from_array(q).normalize())
                .collect();
            clip.r_tracks.insert(node, TrackQuat { times, values });
        }
        Some(ReadOutputs::Scales(it)) => {
            let values = it.map(Vec3::from).collect();
            clip.s_tracks.insert(node, TrackVec3 { times, values });
        }
        Some(ReadOutputs::MorphTargetWeights(_)) | None => {}
    }
}

/// Re-key a clip's tracks from one node table to another by normalized bone
/// name. Tracks whose bone has no counterpart in the target rig are dropped.
fn remap_clip(clip: &AnimClip, from_names: &[String], to_names: &[String]) -> AnimClip {
    let map_idx = |idx: &usize| -> Option<usize> {
        from_names.get(*idx).and_then(|n| {
            let nn = normalize_bone_name(n);
            to_names.iter().position(|m| normalize_bone_name(m) == nn)
        })
    };
    let mut out = AnimClip {
        name: clip.name.clone(),
        duration: clip.duration,
        ..Default::default()
    };
    for (i, tr) in &clip.t_tracks {
        if let Some(di) = map_idx(i) {
            out.t_tracks.insert(di, tr.clone());
        }
    }
    for (i, rr) in &clip.r_tracks {
        if let Some(di) = map_idx(i) {
            out.r_tracks.insert(di, rr.clone());
        }
    }
    for (i, sr) in &clip.s_tracks {
        if let Some(di) = map_idx(i) {
            out.s_tracks.insert(di, sr.clone());
        }
    }
    out
}

fn normalize_bone_name(s: &str) -> String {
    let mut out = s.to_lowercase();
    for pref in [
        "mixamorig:",
        "armature|",
        "armature/",
        "armature:",
        "skeleton|",
        "skeleton/",
    ] {
        if out.starts_with(pref) {
            out = out.trim_start_matches(pref).to_string();
        }
        out = out.replace(pref, "");
    }
    out = out.replace([' ', '_', '-'], "");
    out
}

fn decompose_node(n: &gltf::Node) -> (Vec3, Quat, Vec3) {
    use gltf::scene::Transform;
    match n.transform() {
        Transform::Matrix { matrix } => {
            let m = Mat4::from_cols_array_2d(&matrix);
            let (s, r, t) = m.to_scale_rotation_translation();
            (t, r, s)
        }
        Transform::Decomposed {
            translation,
            rotation,
            scale,
        } => (
            Vec3::from(translation),
            Quat::from_array(rotation).normalize(),
            Vec3::from(scale),
        ),
    }
}
