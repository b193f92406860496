/// Semantic speaker position of one interleaved channel, independent of its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    Mono,
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
    Center,
    LowFreq,
    #[default]
    Unknown,
}

impl Channel {
    /// Standard channel layout for a plain channel count, in WAVE order.
    ///
    /// Counts without a conventional layout yield `Unknown` roles.
    pub fn layout_for_count(count: usize) -> Vec<Channel> {
        use Channel::*;
        match count {
            1 => vec![Mono],
            2 => vec![FrontLeft, FrontRight],
            4 => vec![FrontLeft, FrontRight, BackLeft, BackRight],
            6 => vec![FrontLeft, FrontRight, Center, LowFreq, BackLeft, BackRight],
            // 7.1: side channels have no role of their own
            8 => vec![
                FrontLeft, FrontRight, Center, LowFreq, BackLeft, BackRight, Unknown, Unknown,
            ],
            n => vec![Unknown; n],
        }
    }

    /// The front channel a back channel falls back to.
    pub fn front_equivalent(self) -> Option<Channel> {
        match self {
            Channel::BackLeft => Some(Channel::FrontLeft),
            Channel::BackRight => Some(Channel::FrontRight),
            _ => None,
        }
    }

    /// The back channel a front channel is duplicated to.
    pub fn back_equivalent(self) -> Option<Channel> {
        match self {
            Channel::FrontLeft => Some(Channel::BackLeft),
            Channel::FrontRight => Some(Channel::BackRight),
            _ => None,
        }
    }
}

/// Index of `channel` within `layout`.
pub fn find_channel(layout: &[Channel], channel: Channel) -> Option<usize> {
    layout.iter().position(|c| *c == channel)
}
