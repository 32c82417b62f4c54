//! 2019 SVT layout: half-module names, hardware tags and global channel IDs.
//!
//! Global SVT IDs are assigned sequentially over FEB 0..9, hybrid 0..3, channel
//! 0..n, where hybrids on FEB 0 and 1 read out 512 channels and all others 640.

use bl_core::HybridId;
use bl_fit::ChannelMapping;
use serde::Serialize;

/// Number of front-end boards.
pub const N_FEBS: u8 = 10;
/// Hybrids per front-end board.
pub const HYBRIDS_PER_FEB: u8 = 4;

/// (half-module, FEB, hybrid, software name)
const LAYOUT_2019: [(&str, u8, u8, &str); 40] = [
    ("L0T_axial", 0, 0, "ly1_m0"),
    ("L0T_stereo", 0, 1, "ly2_m0"),
    ("L1T_axial", 0, 2, "ly3_m0"),
    ("L1T_stereo", 0, 3, "ly4_m0"),
    ("L1B_axial", 1, 0, "ly4_m1"),
    ("L1B_stereo", 1, 1, "ly3_m1"),
    ("L0B_axial", 1, 2, "ly2_m1"),
    ("L0B_stereo", 1, 3, "ly1_m1"),
    ("L2T_axial", 2, 0, "ly5_m0"),
    ("L2T_stereo", 2, 1, "ly6_m0"),
    ("L3T_stereo", 2, 2, "ly8_m0"),
    ("L3T_axial", 2, 3, "ly7_m0"),
    ("L2B_stereo", 3, 0, "ly5_m1"),
    ("L2B_axial", 3, 1, "ly6_m1"),
    ("L3B_stereo", 3, 2, "ly7_m1"),
    ("L3B_axial", 3, 3, "ly8_m1"),
    ("L4T_axial_ele", 4, 0, "ly9_m0"),
    ("L4T_axial_pos", 4, 1, "ly9_m2"),
    ("L4T_stereo_ele", 4, 2, "ly10_m0"),
    ("L4T_stereo_pos", 4, 3, "ly10_m2"),
    ("L4B_stereo_ele", 5, 0, "ly9_m1"),
    ("L4B_stereo_pos", 5, 1, "ly9_m3"),
    ("L4B_axial_ele", 5, 2, "ly10_m1"),
    ("L4B_axial_pos", 5, 3, "ly10_m3"),
    ("L5T_axial_ele", 6, 0, "ly11_m0"),
    ("L5T_axial_pos", 6, 1, "ly11_m2"),
    ("L5T_stereo_ele", 6, 2, "ly12_m0"),
    ("L5T_stereo_pos", 6, 3, "ly12_m2"),
    ("L5B_stereo_ele", 7, 0, "ly11_m1"),
    ("L5B_stereo_pos", 7, 1, "ly11_m3"),
    ("L5B_axial_ele", 7, 2, "ly12_m1"),
    ("L5B_axial_pos", 7, 3, "ly12_m3"),
    ("L6T_axial_ele", 8, 0, "ly13_m0"),
    ("L6T_axial_pos", 8, 1, "ly13_m2"),
    ("L6T_stereo_ele", 8, 2, "ly14_m0"),
    ("L6T_stereo_pos", 8, 3, "ly14_m2"),
    ("L6B_stereo_ele", 9, 0, "ly13_m1"),
    ("L6B_stereo_pos", 9, 1, "ly13_m3"),
    ("L6B_axial_ele", 9, 2, "ly14_m1"),
    ("L6B_axial_pos", 9, 3, "ly14_m3"),
];

/// One half-module of the layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleEntry {
    /// Half-module name, e.g. `L1T_axial`.
    pub halfmodule: &'static str,
    /// Hardware address.
    pub hardware: HybridId,
    /// Software (tracking) name, e.g. `ly3_m0`.
    pub software: &'static str,
    /// Readout channels on the hybrid.
    pub channels: u32,
}

/// Readout channels of every hybrid on `feb`.
pub fn channels_on_feb(feb: u8) -> u32 {
    if feb < 2 { 512 } else { 640 }
}

/// Layout lookups and the global channel numbering.
#[derive(Debug, Clone)]
pub struct ModuleMapper {
    entries: Vec<ModuleEntry>,
    /// First global ID per hybrid, indexed `feb * HYBRIDS_PER_FEB + hybrid`.
    offsets: Vec<u32>,
}

impl Default for ModuleMapper {
    fn default() -> Self {
        Self::layout_2019()
    }
}

impl ModuleMapper {
    /// The 2019 detector layout.
    pub fn layout_2019() -> Self {
        let entries = LAYOUT_2019
            .iter()
            .map(|&(halfmodule, feb, hybrid, software)| ModuleEntry {
                halfmodule,
                hardware: HybridId::new(feb, hybrid),
                software,
                channels: channels_on_feb(feb),
            })
            .collect();

        let mut offsets = Vec::with_capacity(usize::from(N_FEBS * HYBRIDS_PER_FEB));
        let mut next = 0;
        for feb in 0..N_FEBS {
            for _ in 0..HYBRIDS_PER_FEB {
                offsets.push(next);
                next += channels_on_feb(feb);
            }
        }
        Self { entries, offsets }
    }

    /// All half-modules, in hardware order.
    pub fn entries(&self) -> &[ModuleEntry] {
        &self.entries
    }

    /// Entry for an exact half-module name.
    pub fn by_halfmodule(&self, name: &str) -> Option<&ModuleEntry> {
        self.entries.iter().find(|e| e.halfmodule == name)
    }

    /// Entry for a hardware address.
    pub fn by_hardware(&self, hw: HybridId) -> Option<&ModuleEntry> {
        self.entries.iter().find(|e| e.hardware == hw)
    }

    /// Entry whose half-module name occurs in `histogram_name`. The longest match wins.
    pub fn find_in_name(&self, histogram_name: &str) -> Option<&ModuleEntry> {
        self.entries
            .iter()
            .filter(|e| histogram_name.contains(e.halfmodule))
            .max_by_key(|e| e.halfmodule.len())
    }

    /// Global SVT ID of `channel` on `hw`.
    pub fn global_id(&self, hw: HybridId, channel: u32) -> Option<u32> {
        if hw.feb >= N_FEBS || hw.hybrid >= HYBRIDS_PER_FEB || channel >= channels_on_feb(hw.feb) {
            return None;
        }
        let idx = usize::from(hw.feb) * usize::from(HYBRIDS_PER_FEB) + usize::from(hw.hybrid);
        Some(self.offsets[idx] + channel)
    }

    /// Total number of readout channels.
    pub fn total_channels(&self) -> u32 {
        (0..N_FEBS).map(|feb| channels_on_feb(feb) * u32::from(HYBRIDS_PER_FEB)).sum()
    }
}

impl ChannelMapping for ModuleMapper {
    fn hybrid_for(&self, histogram_name: &str) -> Option<HybridId> {
        let entry = self.find_in_name(histogram_name)?;
        log::debug!("hardware tag for {histogram_name} is {}", entry.hardware);
        Some(entry.hardware)
    }

    fn svt_id(&self, hybrid: HybridId, channel: u32) -> Option<u32> {
        self.global_id(hybrid, channel)
    }
}
