//! Local and world transforms.
//!
//! A [`Transform`] holds translation, rotation, and scale plus the matrix
//! composed from them. Mutating any of the three parts only marks the
//! transform dirty; the matrix is rebuilt by [`Transform::update`].

use glam::{Mat4, Quat, Vec3};

/// Translation, rotation, and scale with a cached composed matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
    matrix: Mat4,
    dirty: bool,
}

impl Transform {
    /// No translation, no rotation, unit scale.
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
        matrix: Mat4::IDENTITY,
        dirty: false,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        let mut t = Self::IDENTITY;
        t.set_translation(translation);
        t.update();
        t
    }

    pub fn from_xyz(x: f32, y: f32, z: f32) -> Self {
        Self::from_translation(Vec3::new(x, y, z))
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.set_rotation(rotation);
        self.update();
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.set_scale(scale);
        self.update();
        self
    }

    // -- accessors --------------------------------------------------------

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// The composed matrix as of the last [`update`](Self::update).
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// True when the parts changed since the matrix was last composed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // -- mutation ---------------------------------------------------------

    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
        self.dirty = true;
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.dirty = true;
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.dirty = true;
    }

    /// Offset the translation by `delta`.
    pub fn translate(&mut self, delta: Vec3) {
        self.translation += delta;
        self.dirty = true;
    }

    /// Rebuild the matrix from translation, rotation, and scale.
    pub fn update(&mut self) {
        self.matrix =
            Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation);
        self.dirty = false;
    }

    /// Flag the transform as changed without touching its parts.
    pub fn set_updated(&mut self) {
        self.dirty = true;
    }

    /// Overwrite this transform with `other`, matrix included.
    pub fn copy_from(&mut self, other: &Transform) {
        *self = *other;
    }

    /// Set `self` to `parent * child`.
    ///
    /// The parts are decomposed back out of the product, so a non-uniform
    /// parent scale combined with a rotated child loses the shear.
    pub fn multiply(&mut self, parent: &Transform, child: &Transform) {
        self.matrix = parent.matrix * child.matrix;
        let (scale, rotation, translation) = self.matrix.to_scale_rotation_translation();
        self.translation = translation;
        self.rotation = rotation;
        self.scale = scale;
        self.dirty = false;
    }

    /// Map a point through the composed matrix.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.matrix.transform_point3(point)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    #[test]
    fn setters_mark_dirty_until_update() {
        let mut t = Transform::IDENTITY;
        assert!(!t.is_dirty());

        t.set_translation(Vec3::new(1.0, 2.0, 3.0));
        assert!(t.is_dirty());
        assert_eq!(t.matrix(), Mat4::IDENTITY);

        t.update();
        assert!(!t.is_dirty());
        assert_eq!(t.matrix().col(3).truncate(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn multiply_composes_parent_first() {
        let parent = Transform::from_xyz(10.0, 0.0, 0.0).with_scale(Vec3::splat(2.0));
        let child = Transform::from_xyz(1.0, 1.0, 0.0);

        let mut world = Transform::IDENTITY;
        world.multiply(&parent, &child);

        assert!(world.translation().abs_diff_eq(Vec3::new(12.0, 2.0, 0.0), EPS));
        assert!(world.scale().abs_diff_eq(Vec3::splat(2.0), EPS));
    }

    #[test]
    fn multiply_applies_parent_rotation() {
        let parent = Transform::IDENTITY.with_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        let child = Transform::from_xyz(1.0, 0.0, 0.0);

        let mut world = Transform::IDENTITY;
        world.multiply(&parent, &child);

        assert!(world.translation().abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), EPS));
    }

    #[test]
    fn copy_from_takes_matrix_too() {
        let source = Transform::from_xyz(4.0, 5.0, 6.0);
        let mut target = Transform::IDENTITY;
        target.copy_from(&source);
        assert_eq!(target.matrix(), source.matrix());
        assert_eq!(target.transform_point(Vec3::ZERO), Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn translate_accumulates() {
        let mut t = Transform::IDENTITY;
        t.translate(Vec3::X);
        t.translate(Vec3::X);
        t.update();
        assert_eq!(t.translation(), Vec3::new(2.0, 0.0, 0.0));
    }
}
