//! the timing parameter catalog

use std::ops::Index;

use eyre::{bail, Result};
use itertools::Itertools;

use super::config::{TimingConfig, TimingOverride};
use super::org::Organization;

/// the number of timing parameters
pub const NUM_TIMINGS: usize = 25;

/// a named timing parameter, the order is the storage order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimingParam {
    Rate = 0,
    NBl32,
    NCl,
    NRcdw,
    NRcdr,
    NRpab,
    NRppb,
    NRas,
    NRc,
    NWr,
    NRtp,
    NCwl,
    NCcd,
    NRrd,
    NWtrs,
    NWtrl,
    NFaw,
    NPpd,
    NRfcab,
    NRfcpb,
    NRefi,
    NPbr2pbr,
    NPbr2act,
    NCs,
    TckPs,
}

impl TimingParam {
    pub const ALL: [TimingParam; NUM_TIMINGS] = [
        TimingParam::Rate,
        TimingParam::NBl32,
        TimingParam::NCl,
        TimingParam::NRcdw,
        TimingParam::NRcdr,
        TimingParam::NRpab,
        TimingParam::NRppb,
        TimingParam::NRas,
        TimingParam::NRc,
        TimingParam::NWr,
        TimingParam::NRtp,
        TimingParam::NCwl,
        TimingParam::NCcd,
        TimingParam::NRrd,
        TimingParam::NWtrs,
        TimingParam::NWtrl,
        TimingParam::NFaw,
        TimingParam::NPpd,
        TimingParam::NRfcab,
        TimingParam::NRfcpb,
        TimingParam::NRefi,
        TimingParam::NPbr2pbr,
        TimingParam::NPbr2act,
        TimingParam::NCs,
        TimingParam::TckPs,
    ];

    pub fn to_usize(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            TimingParam::Rate => "rate",
            TimingParam::NBl32 => "nBL32",
            TimingParam::NCl => "nCL",
            TimingParam::NRcdw => "nRCDW",
            TimingParam::NRcdr => "nRCDR",
            TimingParam::NRpab => "nRPab",
            TimingParam::NRppb => "nRPpb",
            TimingParam::NRas => "nRAS",
            TimingParam::NRc => "nRC",
            TimingParam::NWr => "nWR",
            TimingParam::NRtp => "nRTP",
            TimingParam::NCwl => "nCWL",
            TimingParam::NCcd => "nCCD",
            TimingParam::NRrd => "nRRD",
            TimingParam::NWtrs => "nWTRS",
            TimingParam::NWtrl => "nWTRL",
            TimingParam::NFaw => "nFAW",
            TimingParam::NPpd => "nPPD",
            TimingParam::NRfcab => "nRFCab",
            TimingParam::NRfcpb => "nRFCpb",
            TimingParam::NRefi => "nREFI",
            TimingParam::NPbr2pbr => "nPBR2PBR",
            TimingParam::NPbr2act => "nPBR2ACT",
            TimingParam::NCs => "nCS",
            TimingParam::TckPs => "tCK_ps",
        }
    }

    /// the override name for a nanosecond value, `nRCDR` becomes `tRCDR`
    fn nanos_name(self) -> String {
        let mut name = self.name().to_string();
        name.replace_range(0..1, "t");
        name
    }
}

/// the merged timing vector of a configured device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingVals {
    vals: [i64; NUM_TIMINGS],
}

impl Index<TimingParam> for TimingVals {
    type Output = i64;

    fn index(&self, param: TimingParam) -> &i64 {
        &self.vals[param.to_usize()]
    }
}

impl TimingVals {
    /// read latency of the device, CAS to last data beat
    pub fn read_latency(&self) -> i64 {
        self[TimingParam::NCl] + 3 * self[TimingParam::NBl32]
    }
}

/// convert a nanosecond timing to whole cycles, always rounding up
pub fn jedec_rounding(nanos: f64, tck_ps: i64) -> i64 {
    (nanos * 1000.0 / tck_ps as f64).ceil() as i64
}

/// the named speed bin presets, density dependent entries stay unset
pub fn preset(name: &str) -> Option<[i64; NUM_TIMINGS]> {
    match name {
        "LPDDR5X_8533" => Some([
            8533, 2, 26, 9, 20, 32, 20, 45, 65, 37, 6, 12, 2, 4, 7, 13, 16, 2, -1, -1, -1, -1, -1,
            2, -1,
        ]),
        _ => None,
    }
}

// refresh timing tables in nanoseconds, indexed by density
const DENSITIES_MB: [usize; 4] = [2048, 4096, 8192, 16384];
const T_RFCAB: [f64; 4] = [130.0, 180.0, 210.0, 280.0];
const T_RFCPB: [f64; 4] = [60.0, 90.0, 120.0, 140.0];
const T_PBR2PBR: [f64; 4] = [60.0, 90.0, 90.0, 90.0];
const T_PBR2ACT: [f64; 4] = [8.0, 8.0, 8.0, 8.0];
const T_REFI_BASE: f64 = 3906.0;

/// merge a speed preset with the configured overrides and validate the result
pub fn load_timing(config: &TimingConfig, org: &Organization) -> Result<TimingVals> {
    let mut vals = [-1i64; NUM_TIMINGS];

    let mut preset_provided = false;
    if let Some(name) = &config.preset {
        match preset(name) {
            Some(table) => {
                vals = table;
                preset_provided = true;
            }
            None => bail!("unrecognized timing preset {:?}", name),
        }
    }

    if let Some(rate) = config.rate {
        if preset_provided {
            bail!("cannot change the transfer rate when using a speed preset");
        }
        vals[TimingParam::Rate.to_usize()] = rate;
    }
    let rate = vals[TimingParam::Rate.to_usize()];
    if rate <= 0 {
        bail!("timing rate is not specified");
    }
    let tck_ps = 1_000_000 / (rate / 2);
    vals[TimingParam::TckPs.to_usize()] = tck_ps;

    // density dependent refresh timings
    if let Some(density_id) = DENSITIES_MB.iter().position(|d| *d == org.density_mb) {
        let derived = [
            (TimingParam::NRfcab, T_RFCAB[density_id]),
            (TimingParam::NRfcpb, T_RFCPB[density_id]),
            (TimingParam::NPbr2pbr, T_PBR2PBR[density_id]),
            (TimingParam::NPbr2act, T_PBR2ACT[density_id]),
            (TimingParam::NRefi, T_REFI_BASE),
        ];
        for (param, nanos) in derived {
            vals[param.to_usize()] = jedec_rounding(nanos, tck_ps);
        }
    }

    // user overrides, rate and tCK may not be overwritten
    let mut consumed = Vec::new();
    for param in &TimingParam::ALL[1..NUM_TIMINGS - 1] {
        if let Some(value) = config.overrides.get(param.name()) {
            match value {
                TimingOverride::Cycles(cycles) => vals[param.to_usize()] = *cycles,
                TimingOverride::Nanos(_) => {
                    bail!("timing {} expects a whole cycle count", param.name())
                }
            }
            consumed.push(param.name().to_string());
        } else if let Some(value) = config.overrides.get(&param.nanos_name()) {
            let nanos = match value {
                TimingOverride::Cycles(cycles) => *cycles as f64,
                TimingOverride::Nanos(nanos) => *nanos,
            };
            vals[param.to_usize()] = jedec_rounding(nanos, tck_ps);
            consumed.push(param.nanos_name());
        }
    }
    let unknown = config
        .overrides
        .keys()
        .filter(|key| !consumed.contains(*key))
        .join(", ");
    if !unknown.is_empty() {
        bail!("unrecognized timing parameters: {}", unknown);
    }

    let missing = TimingParam::ALL
        .iter()
        .filter(|param| vals[param.to_usize()] == -1)
        .map(|param| param.name())
        .join(", ");
    if !missing.is_empty() {
        bail!("timing not specified: {}", missing);
    }

    Ok(TimingVals { vals })
}

#[cfg(test)]
mod tests {
    use super::TimingParam::*;
    use super::*;
    use crate::dram::config::OrgConfig;
    use crate::dram::org::load_org;

    fn org_8gb() -> Organization {
        load_org(&OrgConfig {
            preset: Some("LPDDR5X_8Gb_x16".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    fn preset_config() -> TimingConfig {
        TimingConfig {
            preset: Some("LPDDR5X_8533".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn preset_with_8gb_density() {
        let timing = load_timing(&preset_config(), &org_8gb()).unwrap();
        assert_eq!(timing[TckPs], 234);
        assert_eq!(timing[NRfcab], 898);
        assert_eq!(timing[NRfcpb], 513);
        assert_eq!(timing[NPbr2pbr], 385);
        assert_eq!(timing[NPbr2act], 35);
        assert_eq!(timing[NRefi], 16_693);
        assert_eq!(timing.read_latency(), 26 + 3 * 2);
    }

    #[test]
    fn rate_override_under_preset_is_rejected() {
        let mut config = preset_config();
        config.rate = Some(6400);
        let err = load_timing(&config, &org_8gb()).unwrap_err();
        assert!(err.to_string().contains("speed preset"));
    }

    #[test]
    fn cycle_and_nanos_overrides() {
        let mut config = preset_config();
        config
            .overrides
            .insert("nRTP".to_string(), TimingOverride::Cycles(8));
        config
            .overrides
            .insert("tRCDR".to_string(), TimingOverride::Nanos(18.0));
        let timing = load_timing(&config, &org_8gb()).unwrap();
        assert_eq!(timing[NRtp], 8);
        // ceil(18_000 / 234)
        assert_eq!(timing[NRcdr], 77);
    }

    #[test]
    fn unknown_override_is_rejected() {
        let mut config = preset_config();
        config
            .overrides
            .insert("nBogus".to_string(), TimingOverride::Cycles(1));
        let err = load_timing(&config, &org_8gb()).unwrap_err();
        assert!(err.to_string().contains("nBogus"));
    }

    #[test]
    fn missing_timings_are_listed() {
        let config = TimingConfig {
            rate: Some(8533),
            ..Default::default()
        };
        let err = load_timing(&config, &org_8gb()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("nCL"));
        assert!(message.contains("nFAW"));
    }

    #[test]
    fn off_table_density_needs_refresh_overrides() {
        let org = load_org(&OrgConfig {
            preset: Some("LPDDR5X_32Gb_x16".to_string()),
            ..Default::default()
        })
        .unwrap();
        let err = load_timing(&preset_config(), &org).unwrap_err();
        assert!(err.to_string().contains("nRFCab"));

        let mut config = preset_config();
        for (name, cycles) in [
            ("nRFCab", 1600),
            ("nRFCpb", 700),
            ("nPBR2PBR", 385),
            ("nPBR2ACT", 35),
            ("nREFI", 16_693),
        ] {
            config
                .overrides
                .insert(name.to_string(), TimingOverride::Cycles(cycles));
        }
        assert!(load_timing(&config, &org).is_ok());
    }

    #[test]
    fn jedec_rounding_rounds_up() {
        assert_eq!(jedec_rounding(210.0, 234), 898);
        assert_eq!(jedec_rounding(3906.0, 234), 16_693);
        // exact multiples stay exact
        assert_eq!(jedec_rounding(2.34, 234), 10);
    }
}
