//! Source-channel to device-channel routing for non-positional voices.

use crate::audio_data::{Channel, find_channel};

/// Upper bound on source and device channel counts handled by the mixer.
pub const MAX_CHANNELS: usize = 16;

/// Gain of each paired channel when folded into a single Mono device channel.
const PAIR_FOLD_GAIN: f32 = 0.5;

/// Gain matrix from source channels to device channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingMatrix {
    gains: [[f32; MAX_CHANNELS]; MAX_CHANNELS],
    sources: usize,
    devices: usize,
    unrouted: [bool; MAX_CHANNELS],
}

impl RoutingMatrix {
    fn empty(sources: usize, devices: usize) -> Self {
        Self {
            gains: [[0.0; MAX_CHANNELS]; MAX_CHANNELS],
            sources: sources.min(MAX_CHANNELS),
            devices: devices.min(MAX_CHANNELS),
            unrouted: [false; MAX_CHANNELS],
        }
    }

    /// Gain from source channel `source` to device channel `device`.
    pub fn gain(&self, source: usize, device: usize) -> f32 {
        self.gains[source][device]
    }

    /// Gains of one source channel towards every device channel.
    pub fn row(&self, source: usize) -> &[f32] {
        &self.gains[source][..self.devices]
    }

    pub fn source_count(&self) -> usize {
        self.sources
    }

    pub fn device_count(&self) -> usize {
        self.devices
    }

    /// Whether source channel `source` reaches no device channel at all.
    pub fn is_unrouted(&self, source: usize) -> bool {
        self.unrouted[source]
    }

    pub fn has_unrouted(&self) -> bool {
        self.unrouted[..self.sources].iter().any(|u| *u)
    }

    fn add(&mut self, source: usize, device: usize, gain: f32) {
        self.gains[source][device] += gain;
    }
}

/// Builds the routing matrix for `source` roles played on `device` roles.
///
/// - identical roles route directly
/// - Mono is broadcast to every device channel
/// - front channels are also copied to the device's back pair when the source
///   has no back channel of its own
/// - back channels without a device counterpart fall back to the front pair
/// - Center without a device Center is split over the front pair
/// - LowFreq without a device LowFreq is broadcast
/// - anything left over goes to a device Mono channel if there is one
///
/// Channels beyond [`MAX_CHANNELS`] are ignored.
pub fn route(source: &[Channel], device: &[Channel]) -> RoutingMatrix {
    let mut matrix = RoutingMatrix::empty(source.len(), device.len());
    let device = &device[..matrix.devices];
    let dev = |c: Channel| find_channel(device, c);
    let src_has = |c: Channel| find_channel(source, c).is_some();

    for (s, role) in source.iter().copied().enumerate().take(matrix.sources) {
        let routed = match role {
            Channel::Mono => {
                for d in 0..device.len() {
                    matrix.add(s, d, 1.0);
                }
                !device.is_empty()
            }
            Channel::FrontLeft | Channel::FrontRight => match dev(role) {
                Some(d) => {
                    matrix.add(s, d, 1.0);
                    if let Some(back) = role.back_equivalent() {
                        if let (Some(b), false) = (dev(back), src_has(back)) {
                            matrix.add(s, b, 1.0);
                        }
                    }
                    true
                }
                None => fold_to_mono(&mut matrix, s, device, PAIR_FOLD_GAIN),
            },
            Channel::BackLeft | Channel::BackRight => {
                let target = dev(role).or_else(|| role.front_equivalent().and_then(dev));
                match target {
                    Some(d) => {
                        matrix.add(s, d, 1.0);
                        true
                    }
                    None => fold_to_mono(&mut matrix, s, device, PAIR_FOLD_GAIN),
                }
            }
            Channel::Center => match dev(Channel::Center) {
                Some(d) => {
                    matrix.add(s, d, 1.0);
                    true
                }
                None => {
                    let fronts = [dev(Channel::FrontLeft), dev(Channel::FrontRight)];
                    let count = fronts.iter().flatten().count();
                    if count > 0 {
                        for d in fronts.into_iter().flatten() {
                            matrix.add(s, d, 1.0 / count as f32);
                        }
                        true
                    } else {
                        fold_to_mono(&mut matrix, s, device, 1.0)
                    }
                }
            },
            Channel::LowFreq => match dev(Channel::LowFreq) {
                Some(d) => {
                    matrix.add(s, d, 1.0);
                    true
                }
                None => {
                    for d in 0..device.len() {
                        matrix.add(s, d, 1.0);
                    }
                    !device.is_empty()
                }
            },
            Channel::Unknown => {
                if s < device.len() {
                    matrix.add(s, s, 1.0);
                    true
                } else {
                    fold_to_mono(&mut matrix, s, device, 1.0)
                }
            }
        };
        matrix.unrouted[s] = !routed;
    }

    matrix
}

fn fold_to_mono(matrix: &mut RoutingMatrix, source: usize, device: &[Channel], gain: f32) -> bool {
    match find_channel(device, Channel::Mono) {
        Some(d) => {
            matrix.add(source, d, gain);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::Channel::*;
    use proptest::prelude::*;

    #[test]
    fn test_identical_layouts_route_directly() {
        let layout = Channel::layout_for_count(6);
        let matrix = route(&layout, &layout);
        for s in 0..6 {
            for d in 0..6 {
                let expected = if s == d { 1.0 } else { 0.0 };
                assert_eq!(matrix.gain(s, d), expected, "{} -> {}", s, d);
            }
        }
    }

    #[test]
    fn test_mono_broadcast() {
        let matrix = route(&[Mono], &Channel::layout_for_count(4));
        assert_eq!(matrix.row(0), &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_stereo_on_quad_duplicates_to_back() {
        let matrix = route(&[FrontLeft, FrontRight], &Channel::layout_for_count(4));
        assert_eq!(matrix.row(0), &[1.0, 0.0, 1.0, 0.0]);
        assert_eq!(matrix.row(1), &[0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_quad_on_quad_does_not_duplicate() {
        let quad = Channel::layout_for_count(4);
        let matrix = route(&quad, &quad);
        assert_eq!(matrix.row(0), &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_surround_on_stereo() {
        let matrix = route(&Channel::layout_for_count(6), &[FrontLeft, FrontRight]);
        assert_eq!((matrix.source_count(), matrix.device_count()), (6, 2));
        // center split, lfe broadcast, backs fold to fronts
        assert_eq!(matrix.row(2), &[0.5, 0.5]);
        assert_eq!(matrix.row(3), &[1.0, 1.0]);
        assert_eq!(matrix.row(4), &[1.0, 0.0]);
        assert_eq!(matrix.row(5), &[0.0, 1.0]);
        assert!(!matrix.has_unrouted());
    }

    #[test]
    fn test_stereo_on_mono_device() {
        let matrix = route(&[FrontLeft, FrontRight], &[Mono]);
        assert_eq!(matrix.row(0), &[0.5]);
        assert_eq!(matrix.row(1), &[0.5]);
    }

    #[test]
    fn test_center_with_nowhere_to_go() {
        let matrix = route(&[Center], &[BackLeft, BackRight]);
        assert!(matrix.is_unrouted(0));
        assert_eq!(matrix.row(0), &[0.0, 0.0]);
    }

    #[test]
    fn test_unknown_by_index() {
        let matrix = route(&[Unknown, Unknown, Unknown], &[FrontLeft, FrontRight]);
        assert_eq!(matrix.row(1), &[0.0, 1.0]);
        assert!(matrix.is_unrouted(2));
    }

    fn known_role() -> impl Strategy<Value = Channel> {
        prop_oneof![
            Just(Mono),
            Just(FrontLeft),
            Just(FrontRight),
            Just(BackLeft),
            Just(BackRight),
            Just(Center),
            Just(LowFreq),
        ]
    }

    proptest! {
        #[test]
        fn prop_standard_devices_route_every_known_role(
            source in prop::collection::vec(known_role(), 1..MAX_CHANNELS),
            device_count in prop::sample::select(vec![1usize, 2, 4, 6, 8]),
        ) {
            let device = Channel::layout_for_count(device_count);
            let matrix = route(&source, &device);
            for s in 0..source.len() {
                prop_assert!(!matrix.is_unrouted(s));
                prop_assert!(matrix.row(s).iter().any(|g| *g > 0.0));
            }
        }
    }
}
