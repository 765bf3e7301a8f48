//! Unit dual quaternions for rigid transforms.
//!
//! A `DualQuat` stores a rotation in `real` and half the translation, pre-multiplied by the
//! rotation, in `dual`. `(real, dual)` and `(-real, -dual)` encode the same rigid
//! transform; blending code has to pick a consistent cover before summing.

use glam::{Mat4, Quat, Vec3, Vec4};
use std::ops::{Mul, Neg};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DualQuat {
    pub real: Quat,
    pub dual: Quat,
}

impl Default for DualQuat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

const ZERO_QUAT: Quat = Quat::from_xyzw(0.0, 0.0, 0.0, 0.0);

fn pure(v: Vec3) -> Quat {
    Quat::from_xyzw(v.x, v.y, v.z, 0.0)
}

fn scale(q: Quat, s: f32) -> Quat {
    Quat::from_vec4(Vec4::from(q) * s)
}

fn add(a: Quat, b: Quat) -> Quat {
    Quat::from_vec4(Vec4::from(a) + Vec4::from(b))
}

impl DualQuat {
    pub const IDENTITY: Self = Self {
        real: Quat::IDENTITY,
        dual: ZERO_QUAT,
    };

    pub const fn from_parts(real: Quat, dual: Quat) -> Self {
        Self { real, dual }
    }

    pub fn from_rigid(rotation: Quat, translation: Vec3) -> Self {
        Self {
            real: rotation,
            dual: scale(pure(translation) * rotation, 0.5),
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            real: rotation,
            dual: ZERO_QUAT,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::from_rigid(Quat::IDENTITY, translation)
    }

    /// Decomposes a rigid matrix. Scale, if any, is discarded.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (_, rotation, translation) = matrix.to_scale_rotation_translation();
        Self::from_rigid(rotation.normalize(), translation)
    }

    /// `a ∘ b`: applies `b` first, then `a`. The result is re-normalized.
    pub fn compose(a: &Self, b: &Self) -> Self {
        Self {
            real: a.real * b.real,
            dual: add(a.real * b.dual, a.dual * b.real),
        }
        .normalize()
    }

    pub fn length(&self) -> f32 {
        Vec4::from(self.real).length()
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        let inv = 1.0 / len;
        Self {
            real: scale(self.real, inv),
            dual: scale(self.dual, inv),
        }
    }

    /// `(r + εd)⁻¹ = r⁻¹ − ε r⁻¹ d r⁻¹`, with `r⁻¹ = conj(r) / |r|²`.
    pub fn inverse(&self) -> Self {
        let len_sq = Vec4::from(self.real).length_squared();
        if len_sq <= f32::EPSILON {
            return Self::IDENTITY;
        }
        let real_inv = scale(self.real.conjugate(), 1.0 / len_sq);
        Self {
            real: real_inv,
            dual: scale(real_inv * self.dual * real_inv, -1.0),
        }
    }

    pub fn conjugate(&self) -> Self {
        Self {
            real: self.real.conjugate(),
            dual: self.dual.conjugate(),
        }
    }

    /// Assumes a normalized dual quaternion.
    pub fn translation(&self) -> Vec3 {
        let t = scale(self.dual, 2.0) * self.real.conjugate();
        Vec3::new(t.x, t.y, t.z)
    }

    pub fn rotation(&self) -> Quat {
        self.real
    }

    pub fn apply(&self, point: Vec3) -> Vec3 {
        self.real * point + self.translation()
    }

    /// The same rigid transform on the other sheet of the double cover.
    pub fn negate(&self) -> Self {
        Self {
            real: scale(self.real, -1.0),
            dual: scale(self.dual, -1.0),
        }
    }

    pub fn dot_real(&self, other: &Self) -> f32 {
        self.real.dot(other.real)
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.real, self.translation())
    }

    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        Vec4::from(self.real).abs_diff_eq(Vec4::from(other.real), tolerance)
            && Vec4::from(self.dual).abs_diff_eq(Vec4::from(other.dual), tolerance)
    }

    /// Weighted accumulation without normalization; the blend step normalizes once at the end.
    pub(crate) fn add_scaled(&mut self, other: &Self, weight: f32) {
        self.real = add(self.real, scale(other.real, weight));
        self.dual = add(self.dual, scale(other.dual, weight));
    }

    pub(crate) const ZERO: Self = Self {
        real: ZERO_QUAT,
        dual: ZERO_QUAT,
    };
}

impl Mul for DualQuat {
    type Output = DualQuat;

    fn mul(self, rhs: DualQuat) -> DualQuat {
        DualQuat::compose(&self, &rhs)
    }
}

impl Mul<Vec3> for DualQuat {
    type Output = Vec3;

    fn mul(self, rhs: Vec3) -> Vec3 {
        self.apply(rhs)
    }
}

impl Neg for DualQuat {
    type Output = DualQuat;

    fn neg(self) -> DualQuat {
        self.negate()
    }
}
