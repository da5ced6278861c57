//! Runtime skeleton model: a mutable node hierarchy plus the bone table
//! that maps skin slots onto it.
//!
//! Pose state lives in the node locals. Sampling a clip writes locals,
//! world transforms are derived on demand, and `PoseSnapshot` restores the
//! authored pose afterwards.

use glam::{Mat4, Quat, Vec3};

/// One node in the hierarchy. Local TRS is the mutable pose state.
#[derive(Clone, Debug)]
pub struct RigNode {
    pub name: String,
    pub parent: Option<usize>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl RigNode {
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// A skeleton: every node of the source hierarchy plus the skin's bone order.
///
/// `bones[i]` is the node index for bone `i`; `inverse_bind[i]` is that
/// bone's inverse bind-pose matrix. Clip tracks may target any node, not
/// just bones, so the full hierarchy is kept.
#[derive(Clone, Debug)]
pub struct Skeleton {
    pub nodes: Vec<RigNode>,
    pub bones: Vec<usize>,
    pub inverse_bind: Vec<Mat4>,
}

impl Skeleton {
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// World transform of a single node (parent chain up to the root).
    pub fn world_transform(&self, node: usize) -> Mat4 {
        let mut cache = vec![None; self.nodes.len()];
        self.resolve_world(node, &mut cache)
    }

    /// World transforms for every node, parents resolved once.
    pub fn world_transforms(&self) -> Vec<Mat4> {
        let mut cache = vec![None; self.nodes.len()];
        for i in 0..self.nodes.len() {
            self.resolve_world(i, &mut cache);
        }
        cache.into_iter().map(|m| m.unwrap_or(Mat4::IDENTITY)).collect()
    }

    fn resolve_world(&self, node: usize, cache: &mut [Option<Mat4>]) -> Mat4 {
        if let Some(m) = cache[node] {
            return m;
        }
        let local = self.nodes[node].local_matrix();
        let m = match self.nodes[node].parent {
            Some(p) => self.resolve_world(p, cache) * local,
            None => local,
        };
        cache[node] = Some(m);
        m
    }
}

/// Captured local TRS of every node, restored bit-for-bit after sampling.
pub struct PoseSnapshot {
    state: Vec<(Vec3, Quat, Vec3)>,
}

impl PoseSnapshot {
    pub fn capture(skeleton: &Skeleton) -> Self {
        Self {
            state: skeleton
                .nodes
                .iter()
                .map(|n| (n.translation, n.rotation, n.scale))
                .collect(),
        }
    }

    /// Write the captured locals back. Must be applied to the skeleton the
    /// snapshot was captured from.
    pub fn restore(&self, skeleton: &mut Skeleton) {
        debug_assert_eq!(self.state.len(), skeleton.nodes.len());
        for (node, &(t, r, s)) in skeleton.nodes.iter_mut().zip(self.state.iter()) {
            node.translation = t;
            node.rotation = r;
            node.scale = s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bone_chain() -> Skeleton {
        let nodes = vec![
            RigNode {
                name: "root".into(),
                parent: None,
                translation: Vec3::new(1.0, 0.0, 0.0),
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
            },
            RigNode {
                name: "child".into(),
                parent: Some(0),
                translation: Vec3::new(0.0, 2.0, 0.0),
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
            },
        ];
        Skeleton {
            nodes,
            bones: vec![0, 1],
            inverse_bind: vec![Mat4::IDENTITY, Mat4::IDENTITY],
        }
    }

    #[test]
    fn world_transform_composes_parent_chain() {
        let skel = two_bone_chain();
        let worlds = skel.world_transforms();
        let (_, _, t) = worlds[1].to_scale_rotation_translation();
        assert_eq!(t, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn single_node_query_matches_the_full_pass() {
        let mut skel = two_bone_chain();
        skel.nodes[0].rotation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let worlds = skel.world_transforms();
        for node in 0..skel.nodes.len() {
            assert_eq!(
                skel.world_transform(node).to_cols_array(),
                worlds[node].to_cols_array()
            );
        }
    }

    #[test]
    fn parent_scale_moves_child() {
        let mut skel = two_bone_chain();
        skel.nodes[0].scale = Vec3::splat(2.0);
        let worlds = skel.world_transforms();
        let (s, _, t) = worlds[1].to_scale_rotation_translation();
        assert_eq!(t, Vec3::new(1.0, 4.0, 0.0));
        assert_eq!(s, Vec3::splat(2.0));
    }

    #[test]
    fn snapshot_restores_exact_locals() {
        let mut skel = two_bone_chain();
        let snap = PoseSnapshot::capture(&skel);
        for node in &mut skel.nodes {
            node.translation = Vec3::splat(9.5);
            node.rotation = Quat::from_xyzw(0.1, 0.2, 0.3, 0.4).normalize();
            node.scale = Vec3::splat(0.25);
        }
        snap.restore(&mut skel);
        assert_eq!(skel.nodes[0].translation, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(skel.nodes[0].rotation, Quat::IDENTITY);
        assert_eq!(skel.nodes[1].translation, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(skel.nodes[1].scale, Vec3::ONE);
    }
}
