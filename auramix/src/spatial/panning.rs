//! Per-topology gain computation for positional voices.
//!
//! All functions are pure and allocation free; the mixer calls them once per
//! voice per period.

use super::environment::{Environment, SPEAKER_COUNT, Speaker};
use crate::math::{Vec3, try_normalize};

const EPSILON: f32 = 1e-6;

/// `exp(-k * d)`: 1 at the listener, decaying with distance.
pub fn distance_gain(attenuation_factor: f32, distance: f32) -> f32 {
    (-attenuation_factor * distance).exp()
}

/// Gain applied to a speaker so that closer speakers are not louder than the
/// farthest one. Never above 1 since boosts are never positive.
pub fn boost_compensation(env: &Environment, speaker: Speaker) -> f32 {
    (env.attenuation_factor() * env.speaker_boost(speaker)).exp()
}

/// Listener-local unit direction towards `location`, `None` when the source
/// sits on the listener.
fn local_direction(env: &Environment, location: Vec3) -> Option<Vec3> {
    try_normalize(env.listener().to_local(location))
}

/// Splits `a` and `b` so that they sum to 1, or evenly when both are zero.
fn normalize_pair(a: f32, b: f32) -> [f32; 2] {
    let sum = a + b;
    if sum > EPSILON {
        [a / sum, b / sum]
    } else {
        [0.5, 0.5]
    }
}

/// `[left, right]` gains for headphone output.
///
/// Each ear receives the non-blocked fraction unconditionally, plus the rest
/// scaled by how much the source lines up with that ear's hearing direction.
/// Distance is measured from each ear separately.
pub fn headphone_gains(env: &Environment, location: Vec3) -> [f32; 2] {
    let [left, right] = match local_direction(env, location) {
        Some(dir) => normalize_pair(
            (dir.dot(env.left_hearing()) + 1.0) / 2.0,
            (dir.dot(env.right_hearing()) + 1.0) / 2.0,
        ),
        None => [0.5, 0.5],
    };

    let nb = env.non_blocked();
    let k = env.attenuation_factor();
    let listener = env.listener();
    [
        (nb + (1.0 - nb) * left) * distance_gain(k, location.distance(listener.left_ear())),
        (nb + (1.0 - nb) * right) * distance_gain(k, location.distance(listener.right_ear())),
    ]
}

/// `[front_left, front_right]` gains for stereo speakers.
pub fn stereo_gains(env: &Environment, location: Vec3) -> [f32; 2] {
    let [left, right] = match local_direction(env, location) {
        Some(dir) => normalize_pair(
            (dir.dot(env.speaker_vector(Speaker::FrontLeft)) + 1.0) / 2.0,
            (dir.dot(env.speaker_vector(Speaker::FrontRight)) + 1.0) / 2.0,
        ),
        None => [0.5, 0.5],
    };

    let attenuation = distance_gain(
        env.attenuation_factor(),
        location.distance(env.listener().location()),
    );
    [
        left * boost_compensation(env, Speaker::FrontLeft) * attenuation,
        right * boost_compensation(env, Speaker::FrontRight) * attenuation,
    ]
}

/// Gains for the four surround speakers, indexed by [`Speaker`].
///
/// Speakers facing away from the source get nothing; the remaining shares sum
/// to 1 before each is attenuated by the distance from the source to that
/// speaker's world position.
pub fn surround_gains(env: &Environment, location: Vec3) -> [f32; SPEAKER_COUNT] {
    let mut shares = [0.0f32; SPEAKER_COUNT];
    if let Some(dir) = local_direction(env, location) {
        for speaker in Speaker::ALL {
            shares[speaker.index()] = dir.dot(env.speaker_vector(speaker)).max(0.0);
        }
    }

    let sum: f32 = shares.iter().sum();
    if sum > EPSILON {
        shares.iter_mut().for_each(|s| *s /= sum);
    } else {
        shares = [1.0 / SPEAKER_COUNT as f32; SPEAKER_COUNT];
    }

    let k = env.attenuation_factor();
    let listener = env.listener();
    for speaker in Speaker::ALL {
        let world = listener.to_world(env.speaker_location(speaker));
        shares[speaker.index()] *= distance_gain(k, location.distance(world));
    }
    shares
}

/// Plain distance attenuation from the listener, used for mono devices and
/// for the low-frequency channel.
pub fn listener_attenuation(env: &Environment, location: Vec3) -> f32 {
    distance_gain(
        env.attenuation_factor(),
        location.distance(env.listener().location()),
    )
}
