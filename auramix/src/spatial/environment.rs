use crate::error::{AuramixError, Result};
use crate::math::{Mat3, Vec3, try_normalize};

/// Number of nominal speakers the environment models.
pub const SPEAKER_COUNT: usize = 4;

/// Index of each nominal speaker in [`Environment::speaker_location`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    FrontLeft = 0,
    FrontRight = 1,
    BackLeft = 2,
    BackRight = 3,
}

impl Speaker {
    pub const ALL: [Speaker; SPEAKER_COUNT] = [
        Speaker::FrontLeft,
        Speaker::FrontRight,
        Speaker::BackLeft,
        Speaker::BackRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// The listener ("the ears") of an [`Environment`].
///
/// Listener-local space has X pointing right, Y pointing forward (the facing
/// direction) and Z pointing up. In the default orientation local and world
/// space coincide.
#[derive(Debug, Clone, Copy)]
pub struct Listener {
    location: Vec3,
    facing: Vec3,
    up: Vec3,
    // local -> world rotation, columns are right / facing / up
    transform: Mat3,
    inverse: Mat3,
    left_ear: Vec3,
    right_ear: Vec3,
}

impl Listener {
    fn new(head_radius: f32) -> Self {
        let mut listener = Self {
            location: Vec3::ZERO,
            facing: Vec3::Y,
            up: Vec3::Z,
            transform: Mat3::IDENTITY,
            inverse: Mat3::IDENTITY,
            left_ear: Vec3::ZERO,
            right_ear: Vec3::ZERO,
        };
        listener.update_ears(head_radius);
        listener
    }

    pub fn location(&self) -> Vec3 {
        self.location
    }

    pub fn facing(&self) -> Vec3 {
        self.facing
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// World-space direction of the listener's right hand side.
    pub fn right(&self) -> Vec3 {
        self.transform.x_axis
    }

    pub fn transform(&self) -> Mat3 {
        self.transform
    }

    pub fn inverse_transform(&self) -> Mat3 {
        self.inverse
    }

    pub fn left_ear(&self) -> Vec3 {
        self.left_ear
    }

    pub fn right_ear(&self) -> Vec3 {
        self.right_ear
    }

    /// Converts a world-space point into listener-local space.
    pub fn to_local(&self, point: Vec3) -> Vec3 {
        self.inverse * (point - self.location)
    }

    /// Converts a listener-local point into world space.
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.location + self.transform * local
    }

    fn update_ears(&mut self, head_radius: f32) {
        let offset = self.right() * head_radius;
        self.left_ear = self.location - offset;
        self.right_ear = self.location + offset;
    }
}

/// Listener and speaker model used to spatialize positional voices.
///
/// Raw settings are only changed through setters, and every setter recomputes
/// the derived vectors (listener transform, ear positions, hearing vectors,
/// speaker directions and boosts) before returning. The mixer takes a copy at
/// the top of every period.
#[derive(Debug, Clone, Copy)]
pub struct Environment {
    listener: Listener,
    attenuation_factor: f32,
    head_radius: f32,
    non_blocked: f32,
    auricle_angle: f32,
    speaker_locations: [Vec3; SPEAKER_COUNT],

    left_hearing: Vec3,
    right_hearing: Vec3,
    speaker_vectors: [Vec3; SPEAKER_COUNT],
    speaker_boost: [f32; SPEAKER_COUNT],
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub const DEFAULT_ATTENUATION_FACTOR: f32 = 0.1;
    pub const DEFAULT_HEAD_RADIUS: f32 = 0.15;
    pub const DEFAULT_NON_BLOCKED: f32 = 0.2;
    pub const DEFAULT_AURICLE_ANGLE: f32 = std::f32::consts::PI / 12.0;

    /// Nominal speaker placement in listener-local space: front pair ahead
    /// and further away, back pair close behind.
    pub const DEFAULT_SPEAKER_LOCATIONS: [Vec3; SPEAKER_COUNT] = [
        Vec3::new(-0.1, 0.3, 0.0),
        Vec3::new(0.1, 0.3, 0.0),
        Vec3::new(-0.1, -0.1, 0.0),
        Vec3::new(0.1, -0.1, 0.0),
    ];

    pub fn new() -> Self {
        let mut env = Self {
            listener: Listener::new(Self::DEFAULT_HEAD_RADIUS),
            attenuation_factor: Self::DEFAULT_ATTENUATION_FACTOR,
            head_radius: Self::DEFAULT_HEAD_RADIUS,
            non_blocked: Self::DEFAULT_NON_BLOCKED,
            auricle_angle: Self::DEFAULT_AURICLE_ANGLE,
            speaker_locations: Self::DEFAULT_SPEAKER_LOCATIONS,
            left_hearing: Vec3::ZERO,
            right_hearing: Vec3::ZERO,
            speaker_vectors: [Vec3::ZERO; SPEAKER_COUNT],
            speaker_boost: [0.0; SPEAKER_COUNT],
        };
        env.update_hearing();
        env.update_speakers();
        env
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn set_location(&mut self, location: Vec3) -> Result<()> {
        if !location.is_finite() {
            return Err(AuramixError::Configuration(format!(
                "Listener location {:?} is not finite",
                location
            )));
        }
        self.listener.location = location;
        self.listener.update_ears(self.head_radius);
        Ok(())
    }

    /// Sets the up and facing vectors. They must be non-zero and not parallel.
    pub fn set_orientation(&mut self, up: Vec3, facing: Vec3) -> Result<()> {
        let degenerate = || {
            AuramixError::Configuration(format!(
                "Degenerate listener orientation: up {:?}, facing {:?}",
                up, facing
            ))
        };

        let facing_n = try_normalize(facing).ok_or_else(degenerate)?;
        let up_n = try_normalize(up).ok_or_else(degenerate)?;
        let right = try_normalize(facing_n.cross(up_n)).ok_or_else(degenerate)?;
        let true_up = right.cross(facing_n);

        self.listener.facing = facing_n;
        self.listener.up = true_up;
        self.listener.transform = Mat3::from_cols(right, facing_n, true_up);
        self.listener.inverse = self.listener.transform.inverse();
        self.listener.update_ears(self.head_radius);
        Ok(())
    }

    pub fn attenuation_factor(&self) -> f32 {
        self.attenuation_factor
    }

    /// Exponential distance attenuation coefficient; higher attenuates more.
    pub fn set_attenuation_factor(&mut self, factor: f32) -> Result<()> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(AuramixError::Configuration(format!(
                "Attenuation factor must be finite and non-negative, got {}",
                factor
            )));
        }
        self.attenuation_factor = factor;
        Ok(())
    }

    pub fn head_radius(&self) -> f32 {
        self.head_radius
    }

    pub fn set_head_radius(&mut self, radius: f32) -> Result<()> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(AuramixError::Configuration(format!(
                "Head radius must be finite and non-negative, got {}",
                radius
            )));
        }
        self.head_radius = radius;
        self.listener.update_ears(radius);
        Ok(())
    }

    pub fn non_blocked(&self) -> f32 {
        self.non_blocked
    }

    /// Fraction of a sound that reaches the far ear regardless of the head.
    pub fn set_non_blocked(&mut self, fraction: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(AuramixError::Configuration(format!(
                "Non-blocked fraction must be within [0, 1], got {}",
                fraction
            )));
        }
        self.non_blocked = fraction;
        Ok(())
    }

    pub fn auricle_angle(&self) -> f32 {
        self.auricle_angle
    }

    /// Forward tilt of the ears' hearing direction, in radians.
    pub fn set_auricle_angle(&mut self, angle: f32) -> Result<()> {
        if !angle.is_finite() {
            return Err(AuramixError::Configuration(format!(
                "Auricle angle must be finite, got {}",
                angle
            )));
        }
        self.auricle_angle = angle;
        self.update_hearing();
        Ok(())
    }

    pub fn speaker_location(&self, speaker: Speaker) -> Vec3 {
        self.speaker_locations[speaker.index()]
    }

    /// Moves speaker `index` (0..4, see [`Speaker`]) to a listener-local position.
    pub fn set_speaker_location(&mut self, index: usize, location: Vec3) -> Result<()> {
        if index >= SPEAKER_COUNT {
            return Err(AuramixError::Configuration(format!(
                "Speaker index {} out of range (0..{})",
                index, SPEAKER_COUNT
            )));
        }
        if try_normalize(location).is_none() {
            return Err(AuramixError::Configuration(format!(
                "Speaker location {:?} must be finite and away from the listener",
                location
            )));
        }
        self.speaker_locations[index] = location;
        self.update_speakers();
        Ok(())
    }

    /// Listener-local hearing direction of the left ear.
    pub fn left_hearing(&self) -> Vec3 {
        self.left_hearing
    }

    pub fn right_hearing(&self) -> Vec3 {
        self.right_hearing
    }

    /// Listener-local unit direction of a speaker.
    pub fn speaker_vector(&self, speaker: Speaker) -> Vec3 {
        self.speaker_vectors[speaker.index()]
    }

    /// Distance boost of every speaker: its distance minus the largest
    /// speaker distance. Always `<= 0`, exactly `0` for the farthest one.
    pub fn speaker_boosts(&self) -> [f32; SPEAKER_COUNT] {
        self.speaker_boost
    }

    pub fn speaker_boost(&self, speaker: Speaker) -> f32 {
        self.speaker_boost[speaker.index()]
    }

    fn update_hearing(&mut self) {
        let (sin, cos) = self.auricle_angle.sin_cos();
        self.right_hearing = Vec3::new(cos, sin, 0.0);
        self.left_hearing = Vec3::new(-cos, sin, 0.0);
    }

    fn update_speakers(&mut self) {
        let distances = self.speaker_locations.map(|l| l.length());
        let farthest = distances.iter().copied().fold(0.0f32, f32::max);

        for i in 0..SPEAKER_COUNT {
            self.speaker_vectors[i] = try_normalize(self.speaker_locations[i]).unwrap_or(Vec3::Y);
            self.speaker_boost[i] = distances[i] - farthest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_orientation_is_identity() {
        let env = Environment::new();
        let listener = env.listener();
        assert_eq!(listener.right(), Vec3::X);
        assert_eq!(listener.to_local(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(listener.right_ear(), Vec3::new(0.15, 0.0, 0.0));
    }

    #[test]
    fn test_orientation_updates_transform_and_ears() {
        let mut env = Environment::new();
        env.set_location(Vec3::new(10.0, 0.0, 0.0)).unwrap();
        // facing -X with Z up puts the right hand at +Y
        env.set_orientation(Vec3::Z, Vec3::NEG_X).unwrap();
        let listener = env.listener();
        assert!((listener.right() - Vec3::Y).length() < 1e-6);
        assert!((listener.right_ear() - Vec3::new(10.0, 0.15, 0.0)).length() < 1e-6);

        // a point ahead of the listener is on local +Y
        let local = listener.to_local(Vec3::new(8.0, 0.0, 0.0));
        assert!((local - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-5);
        assert!((listener.to_world(local) - Vec3::new(8.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_degenerate_orientation_rejected() {
        let mut env = Environment::new();
        assert!(env.set_orientation(Vec3::Z, Vec3::Z).is_err());
        assert!(env.set_orientation(Vec3::ZERO, Vec3::Y).is_err());
        assert_eq!(env.listener().facing(), Vec3::Y);
    }

    #[test]
    fn test_head_radius_moves_ears() {
        let mut env = Environment::new();
        env.set_head_radius(0.5).unwrap();
        assert_eq!(env.listener().left_ear(), Vec3::new(-0.5, 0.0, 0.0));
        assert!(env.set_head_radius(-1.0).is_err());
    }

    #[test]
    fn test_parameter_validation() {
        let mut env = Environment::new();
        assert!(env.set_non_blocked(1.5).is_err());
        assert!(env.set_attenuation_factor(f32::NAN).is_err());
        assert!(env.set_auricle_angle(f32::INFINITY).is_err());
        env.set_non_blocked(0.5).unwrap();
        assert_eq!(env.non_blocked(), 0.5);
    }

    #[test]
    fn test_auricle_angle_tilts_hearing() {
        let mut env = Environment::new();
        env.set_auricle_angle(0.0).unwrap();
        assert!((env.right_hearing() - Vec3::X).length() < 1e-6);
        assert!((env.left_hearing() - Vec3::NEG_X).length() < 1e-6);
    }

    #[test]
    fn test_default_boosts() {
        let env = Environment::new();
        let boosts = env.speaker_boosts();
        assert_eq!(boosts[Speaker::FrontLeft.index()], 0.0);
        assert_eq!(boosts[Speaker::FrontRight.index()], 0.0);
        assert!(boosts[Speaker::BackLeft.index()] < 0.0);
    }

    #[test]
    fn test_speaker_index_out_of_range() {
        let mut env = Environment::new();
        assert!(env.set_speaker_location(4, Vec3::ONE).is_err());
        assert!(env.set_speaker_location(0, Vec3::ZERO).is_err());
    }

    #[test]
    fn test_speaker_move_renormalizes_boosts() {
        let mut env = Environment::new();
        env.set_speaker_location(2, Vec3::new(0.0, -2.0, 0.0)).unwrap();
        assert_eq!(env.speaker_boost(Speaker::BackLeft), 0.0);
        assert!(env.speaker_boost(Speaker::FrontLeft) < 0.0);
        assert!((env.speaker_vector(Speaker::BackLeft) - Vec3::NEG_Y).length() < 1e-6);
    }

    fn speaker_position() -> impl Strategy<Value = Vec3> {
        (-5.0f32..5.0, -5.0f32..5.0, -5.0f32..5.0)
            .prop_filter("away from the listener", |(x, y, z)| {
                Vec3::new(*x, *y, *z).length() > 1e-3
            })
            .prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    proptest! {
        #[test]
        fn prop_boosts_are_normalized(
            updates in prop::collection::vec((0usize..SPEAKER_COUNT, speaker_position()), 1..16)
        ) {
            let mut env = Environment::new();
            for (index, location) in updates {
                env.set_speaker_location(index, location).unwrap();
            }
            let boosts = env.speaker_boosts();
            let max = boosts.iter().copied().fold(f32::MIN, f32::max);
            prop_assert_eq!(max, 0.0);
            prop_assert!(boosts.iter().all(|b| *b <= 0.0));
        }
    }
}
