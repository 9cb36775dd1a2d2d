//! Channel layouts and the two IAMF layout tables.

use serde::{Deserialize, Serialize};

/// Channel bits of a native (mask ordered) layout.
#[allow(missing_docs)]
pub mod channel {
    pub const FRONT_LEFT: u64 = 1 << 0;
    pub const FRONT_RIGHT: u64 = 1 << 1;
    pub const FRONT_CENTER: u64 = 1 << 2;
    pub const LOW_FREQUENCY: u64 = 1 << 3;
    pub const BACK_LEFT: u64 = 1 << 4;
    pub const BACK_RIGHT: u64 = 1 << 5;
    pub const FRONT_LEFT_OF_CENTER: u64 = 1 << 6;
    pub const FRONT_RIGHT_OF_CENTER: u64 = 1 << 7;
    pub const BACK_CENTER: u64 = 1 << 8;
    pub const SIDE_LEFT: u64 = 1 << 9;
    pub const SIDE_RIGHT: u64 = 1 << 10;
    pub const TOP_CENTER: u64 = 1 << 11;
    pub const TOP_FRONT_LEFT: u64 = 1 << 12;
    pub const TOP_FRONT_CENTER: u64 = 1 << 13;
    pub const TOP_FRONT_RIGHT: u64 = 1 << 14;
    pub const TOP_BACK_LEFT: u64 = 1 << 15;
    pub const TOP_BACK_CENTER: u64 = 1 << 16;
    pub const TOP_BACK_RIGHT: u64 = 1 << 17;
    pub const LOW_FREQUENCY_2: u64 = 1 << 35;
    pub const TOP_SIDE_LEFT: u64 = 1 << 36;
    pub const TOP_SIDE_RIGHT: u64 = 1 << 37;
    pub const BOTTOM_FRONT_CENTER: u64 = 1 << 38;
    pub const BOTTOM_FRONT_LEFT: u64 = 1 << 39;
    pub const BOTTOM_FRONT_RIGHT: u64 = 1 << 40;
}

/// Channel id of ambisonic channel number 0 in a custom layout.
pub const AMBISONIC_BASE: u16 = 0x400;

/// Masks of the layouts used by IAMF.
#[allow(missing_docs)]
pub mod mask {
    use super::channel::*;

    pub const MONO: u64 = FRONT_CENTER;
    pub const STEREO: u64 = FRONT_LEFT | FRONT_RIGHT;
    pub const SURROUND_5_1_BACK: u64 =
        STEREO | FRONT_CENTER | LOW_FREQUENCY | BACK_LEFT | BACK_RIGHT;
    pub const SURROUND_5_1_2_BACK: u64 = SURROUND_5_1_BACK | TOP_FRONT_LEFT | TOP_FRONT_RIGHT;
    pub const SURROUND_5_1_4_BACK: u64 = SURROUND_5_1_2_BACK | TOP_BACK_LEFT | TOP_BACK_RIGHT;
    pub const SURROUND_7_1: u64 = SURROUND_5_1_BACK | SIDE_LEFT | SIDE_RIGHT;
    pub const SURROUND_7_1_2: u64 = SURROUND_7_1 | TOP_FRONT_LEFT | TOP_FRONT_RIGHT;
    pub const SURROUND_7_1_4_BACK: u64 = SURROUND_7_1_2 | TOP_BACK_LEFT | TOP_BACK_RIGHT;
    pub const SURROUND_7_2_3: u64 = SURROUND_7_1_2 | TOP_BACK_CENTER | LOW_FREQUENCY_2;
    pub const SURROUND_9_1_4_BACK: u64 =
        SURROUND_7_1_4_BACK | FRONT_LEFT_OF_CENTER | FRONT_RIGHT_OF_CENTER;
    pub const SURROUND_3_1_2: u64 =
        STEREO | FRONT_CENTER | LOW_FREQUENCY | TOP_FRONT_LEFT | TOP_FRONT_RIGHT;
    pub const SURROUND_22_2: u64 = SURROUND_7_1_4_BACK
        | FRONT_LEFT_OF_CENTER
        | FRONT_RIGHT_OF_CENTER
        | BACK_CENTER
        | LOW_FREQUENCY_2
        | TOP_CENTER
        | TOP_FRONT_CENTER
        | TOP_BACK_CENTER
        | TOP_SIDE_LEFT
        | TOP_SIDE_RIGHT
        | BOTTOM_FRONT_CENTER
        | BOTTOM_FRONT_LEFT
        | BOTTOM_FRONT_RIGHT;
}

/// Order and count of the channels in some audio.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelLayout {
    /// Channels in mask bit order.
    Native(u64),
    /// Explicit ordered channel ids.
    Custom(Vec<u16>),
    /// Ambisonic channels in ACN order.
    Ambisonic(u16),
    /// Known count, unknown order.
    Unspecified(u16),
}

impl ChannelLayout {
    /// Single front center channel.
    pub const MONO: ChannelLayout = ChannelLayout::Native(mask::MONO);
    /// Front left and right.
    pub const STEREO: ChannelLayout = ChannelLayout::Native(mask::STEREO);

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        match self {
            ChannelLayout::Native(m) => m.count_ones() as usize,
            ChannelLayout::Custom(ids) => ids.len(),
            ChannelLayout::Ambisonic(n) | ChannelLayout::Unspecified(n) => *n as usize,
        }
    }

    /// Custom layout of ambisonic channels given by their ACN numbers.
    pub fn ambisonic_map(acn: &[u8]) -> ChannelLayout {
        ChannelLayout::Custom(acn.iter().map(|c| AMBISONIC_BASE + *c as u16).collect())
    }

    /// For a custom ambisonic map, the ACN numbers.
    pub fn ambisonic_channels(&self) -> Option<Vec<u8>> {
        let ChannelLayout::Custom(ids) = self else {
            return None;
        };
        ids.iter()
            .map(|id| id.checked_sub(AMBISONIC_BASE).and_then(|v| u8::try_from(v).ok()))
            .collect()
    }
}

/// Loudspeaker layouts of scalable channel audio elements, by their 4 bit code.
///
/// Codes 10 and up have no table entry.
pub const SCALABLE_LAYOUTS: [ChannelLayout; 10] = [
    ChannelLayout::Native(mask::MONO),
    ChannelLayout::Native(mask::STEREO),
    ChannelLayout::Native(mask::SURROUND_5_1_BACK),
    ChannelLayout::Native(mask::SURROUND_5_1_2_BACK),
    ChannelLayout::Native(mask::SURROUND_5_1_4_BACK),
    ChannelLayout::Native(mask::SURROUND_7_1),
    ChannelLayout::Native(mask::SURROUND_7_1_2),
    ChannelLayout::Native(mask::SURROUND_7_1_4_BACK),
    ChannelLayout::Native(mask::SURROUND_3_1_2),
    // Binaural
    ChannelLayout::Native(mask::STEREO),
];

/// Loudspeaker layout code for binaural rendering.
pub const LOUDSPEAKER_LAYOUT_BINAURAL: u8 = 9;

/// Sound systems a mix presentation layout can target.
///
/// Named after ITU-R BS.2051 where applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum SoundSystem {
    A0_2_0,
    B0_5_0,
    C2_5_0,
    D4_5_0,
    E4_5_1,
    F3_7_0,
    G4_9_0,
    H9_10_3,
    I0_7_0,
    J4_7_0,
    S10_2_7_0,
    S11_2_3_0,
    S12_0_1_0,
}

impl SoundSystem {
    const ALL: [SoundSystem; 13] = [
        SoundSystem::A0_2_0,
        SoundSystem::B0_5_0,
        SoundSystem::C2_5_0,
        SoundSystem::D4_5_0,
        SoundSystem::E4_5_1,
        SoundSystem::F3_7_0,
        SoundSystem::G4_9_0,
        SoundSystem::H9_10_3,
        SoundSystem::I0_7_0,
        SoundSystem::J4_7_0,
        SoundSystem::S10_2_7_0,
        SoundSystem::S11_2_3_0,
        SoundSystem::S12_0_1_0,
    ];

    /// From the 4 bit wire code. Codes 13..=15 are reserved.
    pub fn from_code(code: u8) -> Option<SoundSystem> {
        Self::ALL.get(code as usize).copied()
    }

    /// The 4 bit wire code.
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// The loudspeaker layout.
    pub fn channel_layout(&self) -> ChannelLayout {
        use SoundSystem::*;
        let m = match self {
            A0_2_0 => mask::STEREO,
            B0_5_0 => mask::SURROUND_5_1_BACK,
            C2_5_0 => mask::SURROUND_5_1_2_BACK,
            D4_5_0 => mask::SURROUND_5_1_4_BACK,
            E4_5_1 => mask::SURROUND_5_1_4_BACK | channel::BOTTOM_FRONT_CENTER,
            F3_7_0 => mask::SURROUND_7_2_3,
            G4_9_0 => mask::SURROUND_9_1_4_BACK,
            H9_10_3 => mask::SURROUND_22_2,
            I0_7_0 => mask::SURROUND_7_1,
            J4_7_0 => mask::SURROUND_7_1_4_BACK,
            S10_2_7_0 => mask::SURROUND_7_1_2,
            S11_2_3_0 => mask::SURROUND_3_1_2,
            S12_0_1_0 => mask::MONO,
        };
        ChannelLayout::Native(m)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scalable_channel_counts() {
        let counts: Vec<_> = SCALABLE_LAYOUTS.iter().map(|l| l.channel_count()).collect();
        assert_eq!(counts, vec![1, 2, 6, 8, 10, 8, 10, 12, 6, 2]);
    }

    #[test]
    fn sound_system_channel_counts() {
        let counts: Vec<_> = (0..13)
            .map(|c| SoundSystem::from_code(c).unwrap().channel_layout().channel_count())
            .collect();
        assert_eq!(counts, vec![2, 6, 8, 10, 11, 12, 14, 24, 8, 12, 10, 6, 1]);
        assert_eq!(SoundSystem::from_code(13), None);
        assert_eq!(SoundSystem::H9_10_3.code(), 7);
    }

    #[test]
    fn ambisonic_map() {
        let l = ChannelLayout::ambisonic_map(&[0, 2, 1, 3]);
        assert_eq!(l.channel_count(), 4);
        assert_eq!(l.ambisonic_channels(), Some(vec![0, 2, 1, 3]));
        assert_eq!(ChannelLayout::STEREO.ambisonic_channels(), None);
    }
}
