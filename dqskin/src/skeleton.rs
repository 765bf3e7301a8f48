use crate::{BonePose, BoneRest, DualQuat, Error};
use glam::{Quat, Vec3};
use std::sync::Arc;

/// Bind-time description of one bone. `rotation`/`translation` are relative to the parent.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct BoneData {
    pub name: String,
    pub parent: Option<usize>,
    pub rotation: Quat,
    pub translation: Vec3,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct SkeletonData {
    pub bones: Vec<BoneData>,
}

impl SkeletonData {
    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct Bone {
    parent: Option<usize>,
    pub rotation: Quat,
    pub translation: Vec3,
    world: DualQuat,
}

impl Bone {
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn world(&self) -> DualQuat {
        self.world
    }
}

/// Rigid bone hierarchy producing the world poses fed to a skinned instance.
///
/// Parents always precede their children, so one forward sweep resolves every world
/// transform.
#[derive(Clone, Debug)]
pub struct Skeleton {
    data: Arc<SkeletonData>,
    bones: Vec<Bone>,
}

impl Skeleton {
    pub fn new(data: Arc<SkeletonData>) -> Result<Self, Error> {
        for (index, bone) in data.bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= index {
                    return Err(Error::InvalidValue {
                        message: format!(
                            "bone '{}' ({index}) must come after its parent ({parent})",
                            bone.name
                        ),
                    });
                }
            }
        }

        let bones = data
            .bones
            .iter()
            .map(|bone| Bone {
                parent: bone.parent,
                rotation: bone.rotation.normalize(),
                translation: bone.translation,
                world: DualQuat::IDENTITY,
            })
            .collect();

        let mut skeleton = Self { data, bones };
        skeleton.update_world_transform();
        Ok(skeleton)
    }

    pub fn data(&self) -> &Arc<SkeletonData> {
        &self.data
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.data.find_bone(name)
    }

    /// Sets a bone's parent-relative transform. Takes effect on the next
    /// [`Skeleton::update_world_transform`].
    pub fn set_local(&mut self, bone: usize, rotation: Quat, translation: Vec3) -> bool {
        let Some(bone) = self.bones.get_mut(bone) else {
            return false;
        };
        bone.rotation = rotation.normalize();
        bone.translation = translation;
        true
    }

    pub fn set_to_setup_pose(&mut self) {
        for (bone, data) in self.bones.iter_mut().zip(&self.data.bones) {
            bone.rotation = data.rotation.normalize();
            bone.translation = data.translation;
        }
        self.update_world_transform();
    }

    pub fn update_world_transform(&mut self) {
        for index in 0..self.bones.len() {
            let local = DualQuat::from_rigid(self.bones[index].rotation, self.bones[index].translation);
            let world = match self.bones[index].parent {
                Some(parent) => self.bones[parent].world * local,
                None => local,
            };
            self.bones[index].world = world;
        }
    }

    pub fn poses(&self) -> Vec<BonePose> {
        let mut out = Vec::with_capacity(self.bones.len());
        self.write_poses(&mut out);
        out
    }

    /// Fills `out` with the current world poses, reusing its allocation.
    pub fn write_poses(&self, out: &mut Vec<BonePose>) {
        out.clear();
        out.extend(
            self.bones
                .iter()
                .map(|bone| BonePose::from_rigid(bone.world.rotation(), bone.world.translation())),
        );
    }

    /// Rest inverses of the setup pose, independent of the bones' current locals.
    pub fn bind_rest(&self) -> Vec<BoneRest> {
        let mut world: Vec<DualQuat> = Vec::with_capacity(self.data.bones.len());
        for bone in &self.data.bones {
            let local = DualQuat::from_rigid(bone.rotation.normalize(), bone.translation);
            let resolved = match bone.parent.and_then(|p| world.get(p)) {
                Some(parent) => *parent * local,
                None => local,
            };
            world.push(resolved);
        }
        world
            .iter()
            .map(|dq| BoneRest::from_bind(dq.rotation(), dq.translation()))
            .collect()
    }

    /// World poses of the setup pose, as handed to [`crate::SkinData::from_mesh`].
    pub fn bind_poses(&self) -> Vec<BonePose> {
        let mut copy = self.clone();
        copy.set_to_setup_pose();
        copy.poses()
    }
}
