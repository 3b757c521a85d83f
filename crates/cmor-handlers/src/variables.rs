//! Static description of every variable the converter can produce.

use mesh_remap::VariableKind;
use serde::Serialize;

use crate::derivation::Derivation;
use crate::derivation::Derivation::{Identity, Linear, Ratio, Scale, Sum, SurfaceLevel};
use MpasComponent::{Ocean, SeaIce};

/// Mean Earth radius used by E3SM, in metres.
pub const EARTH_RADIUS: f64 = 6.37122e6;

/// Standard gravity used by E3SM, in m s-2.
pub const GRAVITY: f64 = 9.80616;

/// Raw-input key of the MPAS mesh (restart) file.
pub const MPAS_MESH: &str = "MPAS_mesh";

/// Raw-input key of the mesh-to-grid mapping file.
pub const MPAS_MAP: &str = "MPAS_map";

/// MPAS model component producing a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MpasComponent {
    Ocean,
    SeaIce,
}

impl MpasComponent {
    /// Raw-input key of the component's monthly statistics files.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Ocean => "MPASO",
            Self::SeaIce => "MPASSI",
        }
    }
}

/// Vertical placement of an MPAS variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Vertical {
    Surface,
    /// Layer centres, written on `depth_coord` with bounds.
    Centered,
    /// Layer interfaces, written on `depth_coord_half`.
    Interface,
}

impl Vertical {
    pub fn kind(&self) -> VariableKind {
        match self {
            Self::Surface => VariableKind::Surface,
            Self::Centered => VariableKind::LevelCentered,
            Self::Interface => VariableKind::LevelInterface,
        }
    }

    /// Coordinate-table entry of the vertical axis.
    pub fn table_entry(&self) -> Option<&'static str> {
        match self {
            Self::Surface => None,
            Self::Centered => Some("depth_coord"),
            Self::Interface => Some("depth_coord_half"),
        }
    }

    /// Level dimension of the raw MPAS field.
    pub fn level_dim(&self) -> Option<&'static str> {
        match self {
            Self::Surface => None,
            Self::Centered => Some("nVertLevels"),
            Self::Interface => Some("nVertLevelsP1"),
        }
    }
}

/// Where the raw fields come from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Source {
    /// Regular-grid time series, one raw-input key per field.
    Gridded {
        fields: &'static [&'static str],
        /// Coordinate-table entry of the level axis for
        /// `(time, lev, lat, lon)` fields.
        level_axis: Option<&'static str>,
    },
    /// Time-invariant regular-grid fields.
    Fixed { fields: &'static [&'static str] },
    /// MPAS monthly statistics on the unstructured mesh.
    Mpas {
        component: MpasComponent,
        fields: &'static [&'static str],
        /// Vertical placement of the raw fields.
        vertical: Vertical,
    },
}

/// One producible output variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VariableSpec {
    pub name: &'static str,
    /// Schema table name, e.g. `Amon`.
    pub table: &'static str,
    pub units: &'static str,
    pub source: Source,
    #[serde(skip)]
    pub derivation: Derivation,
    /// Failures are logged and tolerated by the batch runner.
    pub best_effort: bool,
}

impl VariableSpec {
    pub fn fields(&self) -> &'static [&'static str] {
        match self.source {
            Source::Gridded { fields, .. } | Source::Fixed { fields } | Source::Mpas { fields, .. } => fields,
        }
    }

    /// Raw-input keys that must resolve before the handler runs.
    pub fn raw_inputs(&self) -> Vec<&'static str> {
        match self.source {
            Source::Gridded { fields, .. } | Source::Fixed { fields } => fields.to_vec(),
            Source::Mpas { component, .. } => vec![component.key(), MPAS_MESH, MPAS_MAP],
        }
    }

    pub fn is_mpas(&self) -> bool {
        matches!(self.source, Source::Mpas { .. })
    }
}

const fn gridded(
    name: &'static str,
    table: &'static str,
    units: &'static str,
    fields: &'static [&'static str],
    derivation: Derivation,
) -> VariableSpec {
    VariableSpec {
        name,
        table,
        units,
        source: Source::Gridded {
            fields,
            level_axis: None,
        },
        derivation,
        best_effort: false,
    }
}

const fn fixed(
    name: &'static str,
    units: &'static str,
    fields: &'static [&'static str],
    derivation: Derivation,
) -> VariableSpec {
    VariableSpec {
        name,
        table: "fx",
        units,
        source: Source::Fixed { fields },
        derivation,
        best_effort: false,
    }
}

const fn mpas(
    name: &'static str,
    component: MpasComponent,
    units: &'static str,
    fields: &'static [&'static str],
    vertical: Vertical,
    derivation: Derivation,
) -> VariableSpec {
    VariableSpec {
        name,
        table: match component {
            MpasComponent::Ocean => "Omon",
            MpasComponent::SeaIce => "SImon",
        },
        units,
        source: Source::Mpas {
            component,
            fields,
            vertical,
        },
        derivation,
        best_effort: false,
    }
}

const fn best_effort(spec: VariableSpec) -> VariableSpec {
    VariableSpec {
        best_effort: true,
        ..spec
    }
}

const RSUS_TERMS: &[(&str, f64)] = &[("FSDS", 1.0), ("FSNS", -1.0)];
const RSUT_TERMS: &[(&str, f64)] = &[("SOLIN", 1.0), ("FSNTOA", -1.0)];

/// Every built-in variable.
pub static BUILTIN: &[VariableSpec] = &[
    // Amon
    gridded("tas", "Amon", "K", &["TREFHT"], Identity),
    // Minimum surface temperature over the output period
    gridded("tasmin", "Amon", "K", &["TSMN"], Identity),
    gridded("tasmax", "Amon", "K", &["TREFHTMX"], Identity),
    gridded("ts", "Amon", "K", &["TS"], Identity),
    gridded("psl", "Amon", "Pa", &["PSL"], Identity),
    gridded("ps", "Amon", "Pa", &["PS"], Identity),
    gridded("huss", "Amon", "1", &["QREFHT"], Identity),
    gridded("pr", "Amon", "kg m-2 s-1", &["PRECC", "PRECL"], Sum(1000.0)),
    gridded("prc", "Amon", "kg m-2 s-1", &["PRECC"], Scale(1000.0)),
    gridded("prsn", "Amon", "kg m-2 s-1", &["PRECSC", "PRECSL"], Sum(1000.0)),
    gridded("hfls", "Amon", "W m-2", &["LHFLX"], Identity),
    gridded("hfss", "Amon", "W m-2", &["SHFLX"], Identity),
    gridded("rlds", "Amon", "W m-2", &["FLDS"], Identity),
    gridded("rlus", "Amon", "W m-2", &["FLDS", "FLNS"], Sum(1.0)),
    gridded("rsds", "Amon", "W m-2", &["FSDS"], Identity),
    gridded("rsus", "Amon", "W m-2", &["FSDS", "FSNS"], Linear(RSUS_TERMS)),
    gridded("rlut", "Amon", "W m-2", &["FLUT"], Identity),
    gridded("rsdt", "Amon", "W m-2", &["SOLIN"], Identity),
    gridded("rsut", "Amon", "W m-2", &["SOLIN", "FSNTOA"], Linear(RSUT_TERMS)),
    gridded("clt", "Amon", "%", &["CLDTOT"], Scale(100.0)),
    gridded("prw", "Amon", "kg m-2", &["TMQ"], Identity),
    // Lmon
    best_effort(gridded("mrro", "Lmon", "kg m-2 s-1", &["QRUNOFF"], Identity)),
    best_effort(gridded("mrros", "Lmon", "kg m-2 s-1", &["QOVER"], Identity)),
    VariableSpec {
        source: Source::Gridded {
            fields: &["SOILLIQ", "SOILICE"],
            level_axis: Some("sdepth"),
        },
        ..gridded("mrsol", "Lmon", "kg m-2", &[], Sum(1.0))
    },
    // fx
    fixed("areacella", "m2", &["area"], Scale(EARTH_RADIUS * EARTH_RADIUS)),
    fixed("sftlf", "%", &["LANDFRAC"], Scale(100.0)),
    fixed("orog", "m", &["PHIS"], Scale(1.0 / GRAVITY)),
    // Omon
    mpas("tos", Ocean, "degC", &["timeMonthly_avg_activeTracers_temperature"], Vertical::Centered, SurfaceLevel),
    mpas("sos", Ocean, "0.001", &["timeMonthly_avg_activeTracers_salinity"], Vertical::Centered, SurfaceLevel),
    mpas("thetao", Ocean, "degC", &["timeMonthly_avg_activeTracers_temperature"], Vertical::Centered, Identity),
    mpas("so", Ocean, "0.001", &["timeMonthly_avg_activeTracers_salinity"], Vertical::Centered, Identity),
    mpas("wo", Ocean, "m s-1", &["timeMonthly_avg_vertVelocityTop"], Vertical::Interface, Identity),
    mpas("mlotst", Ocean, "m", &["timeMonthly_avg_dThreshMLD"], Vertical::Surface, Identity),
    // SImon
    mpas("siconc", SeaIce, "%", &["timeMonthly_avg_iceAreaCell"], Vertical::Surface, Scale(100.0)),
    mpas("sivol", SeaIce, "m", &["timeMonthly_avg_iceVolumeCell"], Vertical::Surface, Identity),
    mpas(
        "sithick",
        SeaIce,
        "m",
        &["timeMonthly_avg_iceVolumeCell", "timeMonthly_avg_iceAreaCell"],
        Vertical::Surface,
        Ratio,
    ),
];

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_names_unique() {
        let names: HashSet<_> = BUILTIN.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), BUILTIN.len());
    }

    #[test]
    fn test_raw_inputs() {
        let pr = BUILTIN.iter().find(|s| s.name == "pr").unwrap();
        assert_eq!(pr.raw_inputs(), vec!["PRECC", "PRECL"]);

        let tos = BUILTIN.iter().find(|s| s.name == "tos").unwrap();
        assert_eq!(tos.raw_inputs(), vec!["MPASO", "MPAS_mesh", "MPAS_map"]);
        assert!(tos.is_mpas());

        let tasmin = BUILTIN.iter().find(|s| s.name == "tasmin").unwrap();
        assert_eq!(tasmin.raw_inputs(), vec!["TSMN"]);

        let siconc = BUILTIN.iter().find(|s| s.name == "siconc").unwrap();
        assert_eq!(siconc.raw_inputs()[0], "MPASSI");
        assert_eq!(siconc.table, "SImon");
    }

    #[test]
    fn test_linear_terms_are_declared_fields() {
        for spec in BUILTIN {
            if let Derivation::Linear(terms) = spec.derivation {
                for (key, _) in terms {
                    assert!(spec.fields().contains(key), "{}: {key} not a field", spec.name);
                }
            }
        }
    }

    #[test]
    fn test_best_effort_flags() {
        let tolerated: Vec<_> = BUILTIN.iter().filter(|s| s.best_effort).map(|s| s.name).collect();
        assert_eq!(tolerated, vec!["mrro", "mrros"]);
    }
}
