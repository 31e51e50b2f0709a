//! Hexagon risk field.
//!
//! Each finding becomes one [`AnomalyPoint`] on a square plane. The point's
//! position is a pure function of the finding's function name and affected
//! rows (sha256, first 16 bytes → x/y), so the same findings always land in
//! the same place; `radius` only changes how the plane is binned into
//! pointy-top hexagons. Regions aggregate the points in one cell, weighting
//! each by an exponential decay of its age at `now`.

use ak_common::{Finding, MappingError, Tick};
use ak_config::HexConfig;
use ak_math::half_life_decay;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use crate::logging::{event_names, Stage};

/// Axial hex coordinate (pointy-top).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HexCoord {
    pub q: i64,
    pub r: i64,
}

impl HexCoord {
    /// Cell containing the planar point `(x, y)` for hexagons of `radius`.
    pub fn from_point(x: f64, y: f64, radius: f64) -> Self {
        let q = (3f64.sqrt() / 3.0 * x - y / 3.0) / radius;
        let r = (2.0 / 3.0 * y) / radius;
        cube_round(q, r)
    }

    /// Centre of the cell on the plane.
    pub fn center(&self, radius: f64) -> (f64, f64) {
        let q = self.q as f64;
        let r = self.r as f64;
        (
            radius * 3f64.sqrt() * (q + r / 2.0),
            radius * 1.5 * r,
        )
    }

    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for HexCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hex:{}:{}", self.q, self.r)
    }
}

fn cube_round(q: f64, r: f64) -> HexCoord {
    let s = -q - r;
    let mut rq = q.round();
    let mut rr = r.round();
    let rs = s.round();
    let dq = (rq - q).abs();
    let dr = (rr - r).abs();
    let ds = (rs - s).abs();
    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }
    HexCoord {
        q: rq as i64,
        r: rr as i64,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Green,
    Yellow,
    Red,
}

impl RiskLevel {
    pub fn classify(avg_severity: f64, config: &HexConfig) -> Self {
        if avg_severity >= config.red_threshold {
            RiskLevel::Red
        } else if avg_severity >= config.yellow_threshold {
            RiskLevel::Yellow
        } else {
            RiskLevel::Green
        }
    }
}

/// One finding placed on the plane.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyPoint {
    pub x: f64,
    pub y: f64,
    pub intensity: f64,
    pub source_finding_id: String,
    pub hex_id: String,
    pub created_at: Tick,
    pub severity_weight: f64,
    pub decay: f64,
    #[serde(skip)]
    pub hex: HexCoord,
}

/// Aggregate of the points in one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HexagonRegion {
    pub hex_id: String,
    pub q: i64,
    pub r: i64,
    pub anomaly_count: usize,
    /// Mean of decayed severity weights.
    pub avg_severity: f64,
    pub risk_level: RiskLevel,
    /// Mean decay weight of the cell's points.
    pub decay_factor: f64,
}

/// A finding that could not be placed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFinding {
    pub finding_id: String,
    pub code: u32,
    pub reason: String,
}

/// Output of a mapping pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HexMap {
    pub radius: f64,
    pub now: Tick,
    pub regions: Vec<HexagonRegion>,
    pub points: Vec<AnomalyPoint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedFinding>,
}

impl HexMap {
    fn empty(radius: f64, now: Tick) -> Self {
        HexMap {
            radius,
            now,
            regions: Vec::new(),
            points: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Cells at `level` or above.
    pub fn at_least(&self, level: RiskLevel) -> impl Iterator<Item = &HexagonRegion> {
        self.regions.iter().filter(move |r| r.risk_level >= level)
    }
}

#[derive(Default)]
struct RegionAcc {
    count: usize,
    weighted: f64,
    decay: f64,
}

/// Maps findings onto the hex field with fixed constants.
#[derive(Debug, Clone, PartialEq)]
pub struct HexFieldEngine {
    config: HexConfig,
}

impl HexFieldEngine {
    pub fn new(config: HexConfig) -> Self {
        HexFieldEngine { config }
    }

    pub fn config(&self) -> &HexConfig {
        &self.config
    }

    /// Planar position of a finding in `[0, plane_extent)²`.
    pub fn position(&self, finding: &Finding) -> (f64, f64) {
        let mut hasher = Sha256::new();
        hasher.update(finding.function_name.as_bytes());
        hasher.update([0u8]);
        for row in &finding.affected_row_ids {
            hasher.update((*row as u64).to_le_bytes());
        }
        let digest = hasher.finalize();
        let unit = |bytes: &[u8]| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            // 53 high bits → uniform in [0, 1)
            (u64::from_le_bytes(buf) >> 11) as f64 / (1u64 << 53) as f64
        };
        let extent = self.config.plane_extent;
        (unit(&digest[0..8]) * extent, unit(&digest[8..16]) * extent)
    }

    /// Point intensity in `[0, 1]` from severity and metric magnitude.
    pub fn intensity(finding: &Finding) -> f64 {
        let m = if finding.metric_value.is_finite() {
            finding.metric_value.abs()
        } else {
            0.0
        };
        ((finding.severity.weight() / 3.0 + m / (1.0 + m)) / 2.0).clamp(0.0, 1.0)
    }

    /// Place `findings` on the field at logical time `now`.
    ///
    /// Never fails: findings that cannot be placed are listed in
    /// [`HexMap::skipped`], and an invalid radius or empty input yields an
    /// empty map.
    pub fn map(&self, findings: &[Finding], radius: f64, now: Tick) -> HexMap {
        let mut out = HexMap::empty(radius, now);

        if findings.is_empty() {
            debug!(
                event = event_names::HEXMAP_SKIPPED,
                reason = %MappingError::EmptyInput,
                "nothing to map"
            );
            return out;
        }
        if !radius.is_finite() || radius <= 0.0 {
            let err = MappingError::InvalidRadius { radius };
            debug!(event = event_names::HEXMAP_SKIPPED, reason = %err, "invalid radius");
            out.skipped = findings
                .iter()
                .map(|f| SkippedFinding {
                    finding_id: f.id.to_string(),
                    code: err.code(),
                    reason: err.to_string(),
                })
                .collect();
            return out;
        }

        let mut cells: BTreeMap<HexCoord, RegionAcc> = BTreeMap::new();
        for finding in findings {
            if finding.affected_row_ids.is_empty() {
                let err = MappingError::NoAffectedRows {
                    finding_id: finding.id.to_string(),
                };
                out.skipped.push(SkippedFinding {
                    finding_id: finding.id.to_string(),
                    code: err.code(),
                    reason: err.to_string(),
                });
                continue;
            }

            let (x, y) = self.position(finding);
            let hex = HexCoord::from_point(x, y, radius);
            let age = now.since(finding.detected_at) as f64;
            let decay = half_life_decay(age, self.config.half_life_ticks);
            let weight = finding.severity.weight();

            let acc = cells.entry(hex).or_default();
            acc.count += 1;
            acc.weighted += weight * decay;
            acc.decay += decay;

            out.points.push(AnomalyPoint {
                x,
                y,
                intensity: Self::intensity(finding),
                source_finding_id: finding.id.to_string(),
                hex_id: hex.id(),
                created_at: finding.detected_at,
                severity_weight: weight,
                decay,
                hex,
            });
        }

        out.regions = cells
            .into_iter()
            .map(|(hex, acc)| {
                let n = acc.count as f64;
                let avg_severity = acc.weighted / n;
                HexagonRegion {
                    hex_id: hex.id(),
                    q: hex.q,
                    r: hex.r,
                    anomaly_count: acc.count,
                    avg_severity,
                    risk_level: RiskLevel::classify(avg_severity, &self.config),
                    decay_factor: acc.decay / n,
                }
            })
            .collect();

        info!(
            event = event_names::HEXMAP_FINISHED,
            stage = %Stage::Map,
            findings = findings.len(),
            regions = out.regions.len(),
            skipped = out.skipped.len(),
            radius,
            now = now.0,
            "hex map built"
        );
        out
    }
}
