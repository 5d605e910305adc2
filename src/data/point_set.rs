//! SBI point sets and their PCD persistence.
//!
//! Points live in a frame centred on the slice with y increasing upward; the PCD
//! file always carries `z = 0`.

use crate::{Result, SbiError};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// Planar position of one bright blob.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeaturePoint {
    pub x: f64,
    pub y: f64,
}

impl FeaturePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Unordered set of feature points for one volume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SbiPointSet {
    points: Vec<FeaturePoint>,
}

impl SbiPointSet {
    pub fn new(points: Vec<FeaturePoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[FeaturePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Mean of all points; the origin for an empty set.
    pub fn center(&self) -> FeaturePoint {
        if self.points.is_empty() {
            return FeaturePoint::new(0.0, 0.0);
        }
        let n = self.points.len() as f64;
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        FeaturePoint::new(sx / n, sy / n)
    }

    /// Serialise as an ASCII PCD v0.7 document.
    pub fn to_pcd_string(&self) -> String {
        let n = self.points.len();
        let header = format!(
            "# .PCD v0.7 - Point Cloud Data file format\n\
             VERSION 0.7\n\
             FIELDS x y z\n\
             SIZE 8 8 8\n\
             TYPE F F F\n\
             COUNT 1 1 1\n\
             WIDTH {n}\n\
             HEIGHT 1\n\
             VIEWPOINT 0 0 0 1 0 0 0\n\
             POINTS {n}\n\
             DATA ascii\n"
        );
        let body: String = self.points.iter().map(|p| format!("{} {} 0\n", p.x, p.y)).collect();
        header + &body
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_pcd_string())?;
        info!(path = %path.display(), points = self.len(), "Point cloud data saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let set = Self::read_pcd(BufReader::new(file), path)?;
        info!(path = %path.display(), points = set.len(), "Point cloud data loaded");
        Ok(set)
    }

    fn read_pcd<R: BufRead>(reader: R, path: &Path) -> Result<Self> {
        let malformed = |reason: String| SbiError::Pcd {
            path: path.to_path_buf(),
            reason,
        };

        let mut lines = reader.lines();
        let mut fields: Vec<String> = Vec::new();
        let mut declared: Option<usize> = None;

        loop {
            let line = lines
                .next()
                .ok_or_else(|| malformed("unexpected end of header".to_string()))??;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts[0] {
                "FIELDS" => fields = parts[1..].iter().map(|s| s.to_string()).collect(),
                "POINTS" => {
                    declared = parts.get(1).and_then(|s| s.parse().ok());
                }
                "DATA" => {
                    if parts.get(1) != Some(&"ascii") {
                        return Err(malformed(format!("unsupported DATA section: {line}")));
                    }
                    break;
                }
                _ => {}
            }
        }

        let x_idx = fields
            .iter()
            .position(|f| f == "x")
            .ok_or_else(|| malformed("missing x field".to_string()))?;
        let y_idx = fields
            .iter()
            .position(|f| f == "y")
            .ok_or_else(|| malformed("missing y field".to_string()))?;

        let mut points = Vec::with_capacity(declared.unwrap_or(0));
        for line in lines {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let values = line
                .split_whitespace()
                .map(|s| s.parse::<f64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| malformed(format!("bad value in \"{line}\": {e}")))?;

            match (values.get(x_idx), values.get(y_idx)) {
                (Some(&x), Some(&y)) => points.push(FeaturePoint::new(x, y)),
                _ => return Err(malformed(format!("short point record \"{line}\""))),
            }
        }

        if let Some(n) = declared {
            if n != points.len() {
                return Err(malformed(format!("header declares {n} points, found {}", points.len())));
            }
        }

        Ok(Self { points })
    }
}

impl FromIterator<FeaturePoint> for SbiPointSet {
    fn from_iter<I: IntoIterator<Item = FeaturePoint>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
