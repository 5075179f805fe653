use serde::{Deserialize, Serialize};

/// Interaction channel assigned to every event.
///
/// The discriminants are the integer codes stored in the
/// `analysis_channels` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Channel {
    DataInclusive = 0,
    External = 1,
    OutOfVolume = 2,
    NeutralCurrent = 10,
    SingleStrange = 11,
    MultiStrange = 12,
    ElectronCc = 20,
    MuonCc0PiNp = 30,
    MuonCc1Pi = 31,
    MuonCcPi0OrGamma = 32,
    MuonCcNPi = 33,
    MuonCcOther = 34,
    Unknown = 99,
}

impl Channel {
    pub const ALL: [Channel; 13] = [
        Channel::DataInclusive,
        Channel::External,
        Channel::OutOfVolume,
        Channel::NeutralCurrent,
        Channel::SingleStrange,
        Channel::MultiStrange,
        Channel::ElectronCc,
        Channel::MuonCc0PiNp,
        Channel::MuonCc1Pi,
        Channel::MuonCcPi0OrGamma,
        Channel::MuonCcNPi,
        Channel::MuonCcOther,
        Channel::Unknown,
    ];

    /// Channels that make up the signal class of the training partition.
    pub const SIGNAL: [Channel; 2] = [Channel::SingleStrange, Channel::MultiStrange];

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Unrecognised codes map to `Unknown`.
    pub fn from_code(code: i64) -> Channel {
        Channel::ALL
            .iter()
            .copied()
            .find(|c| i64::from(c.code()) == code)
            .unwrap_or(Channel::Unknown)
    }

    pub fn is_signal(self) -> bool {
        Channel::SIGNAL.contains(&self)
    }

    /// Any of the muon-neutrino charged-current sub-channels.
    pub fn is_muon_cc(self) -> bool {
        matches!(
            self,
            Channel::MuonCc0PiNp
                | Channel::MuonCc1Pi
                | Channel::MuonCcPi0OrGamma
                | Channel::MuonCcNPi
                | Channel::MuonCcOther
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Channel::DataInclusive => "data",
            Channel::External => "external",
            Channel::OutOfVolume => "out_fv",
            Channel::NeutralCurrent => "nc",
            Channel::SingleStrange => "cc_s1",
            Channel::MultiStrange => "cc_sgt1",
            Channel::ElectronCc => "nue_cc",
            Channel::MuonCc0PiNp => "numu_cc_0pi_ge1p",
            Channel::MuonCc1Pi => "numu_cc_1pi",
            Channel::MuonCcPi0OrGamma => "numu_cc_pi0_or_gamma",
            Channel::MuonCcNPi => "numu_cc_npi",
            Channel::MuonCcOther => "numu_cc_other",
            Channel::Unknown => "unknown",
        }
    }
}

/// Truth-level quantities the channel decision reads.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TruthSummary {
    pub in_fiducial: bool,
    /// Neutrino PDG code, 0 when no neutrino interacted in the cryostat.
    pub nu_pdg: i64,
    /// 0 = charged current, 1 = neutral current.
    pub ccnc: i64,
    pub count_strange: i64,
    pub n_proton: i64,
    pub n_pi_minus: i64,
    pub n_pi_plus: i64,
    pub n_pi_zero: i64,
    pub n_gamma: i64,
}

impl TruthSummary {
    fn n_charged_pi(&self) -> i64 {
        self.n_pi_minus + self.n_pi_plus
    }

    fn is_cc(&self) -> bool {
        self.ccnc == 0
    }

    fn is_numu_cc(&self) -> bool {
        self.nu_pdg.abs() == 14 && self.is_cc()
    }
}

/// One step of the channel decision: the first rule whose predicate holds
/// assigns its label.
pub struct ChannelRule {
    pub name: &'static str,
    pub label: Channel,
    pub matches: fn(&TruthSummary) -> bool,
}

/// Ordered decision list. Later rules assume every earlier rule failed, so
/// reordering changes the classification.
pub const CHANNEL_RULES: [ChannelRule; 11] = [
    ChannelRule { name: "out_fv_no_neutrino", label: Channel::OutOfVolume, matches: |t| !t.in_fiducial && t.nu_pdg == 0 },
    ChannelRule { name: "out_fv", label: Channel::External, matches: |t| !t.in_fiducial },
    ChannelRule { name: "nc", label: Channel::NeutralCurrent, matches: |t| t.ccnc == 1 },
    ChannelRule { name: "cc_single_strange", label: Channel::SingleStrange, matches: |t| t.is_cc() && t.count_strange == 1 },
    ChannelRule { name: "cc_multi_strange", label: Channel::MultiStrange, matches: |t| t.is_cc() && t.count_strange > 1 },
    ChannelRule { name: "nue_cc", label: Channel::ElectronCc, matches: |t| t.nu_pdg.abs() == 12 && t.is_cc() },
    ChannelRule {
        name: "numu_cc_0pi_ge1p",
        label: Channel::MuonCc0PiNp,
        matches: |t| t.is_numu_cc() && t.n_charged_pi() == 0 && t.n_proton > 0,
    },
    ChannelRule {
        name: "numu_cc_1pi",
        label: Channel::MuonCc1Pi,
        matches: |t| t.is_numu_cc() && t.n_charged_pi() == 1 && t.n_pi_zero == 0,
    },
    ChannelRule {
        name: "numu_cc_pi0_or_gamma",
        label: Channel::MuonCcPi0OrGamma,
        matches: |t| t.is_numu_cc() && (t.n_pi_zero > 0 || t.n_gamma >= 2),
    },
    ChannelRule { name: "numu_cc_npi", label: Channel::MuonCcNPi, matches: |t| t.is_numu_cc() && t.n_charged_pi() > 1 },
    ChannelRule { name: "numu_cc_other", label: Channel::MuonCcOther, matches: |t| t.is_numu_cc() },
];

/// Assign exactly one channel; falls through to `Unknown`.
pub fn classify(truth: &TruthSummary) -> Channel {
    CHANNEL_RULES
        .iter()
        .find(|rule| (rule.matches)(truth))
        .map(|rule| rule.label)
        .unwrap_or(Channel::Unknown)
}
