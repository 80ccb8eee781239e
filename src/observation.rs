//! Measured landing observations and CSV ingestion.

use std::io::Read;
use std::path::Path;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::constants::SIGHT_HEIGHT;
use crate::error::{CalibrationError, Result};

/// One measured shot
///
/// `target_y` is already shifted by the sight height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    /// Launch angle in radians
    pub launch_angle_rad: f64,
    /// Horizontal position of the landing point (m)
    pub target_x: f64,
    /// Vertical position of the landing point relative to the launch point (m)
    pub target_y: f64,
    /// Muzzle speed (m/s)
    pub muzzle_speed: f64,
}

impl Observation {
    pub fn new(launch_angle_rad: f64, target_x: f64, target_y: f64, muzzle_speed: f64) -> Self {
        Self {
            launch_angle_rad,
            target_x,
            target_y,
            muzzle_speed,
        }
    }

    /// Build from measured units: angle in degrees, height relative to the sight line
    pub fn from_measurement(
        angle_deg: f64,
        target_x: f64,
        measured_y: f64,
        muzzle_speed: f64,
    ) -> Self {
        Self::new(
            angle_deg.to_radians(),
            target_x,
            measured_y - SIGHT_HEIGHT,
            muzzle_speed,
        )
    }

    pub fn launch_angle_deg(&self) -> f64 {
        self.launch_angle_rad.to_degrees()
    }
}

/// Raw CSV row
#[derive(Debug, Clone, Deserialize)]
struct ObservationRecord {
    angle: f64,
    target_x: f64,
    target_y: f64,
    bullet_speed: f64,
}

impl ObservationRecord {
    fn into_observation(self, row: usize) -> Result<Observation> {
        let values = [
            ("angle", self.angle),
            ("target_x", self.target_x),
            ("target_y", self.target_y),
            ("bullet_speed", self.bullet_speed),
        ];
        if let Some((name, value)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(CalibrationError::InvalidObservation {
                row,
                reason: format!("{} is not finite ({})", name, value),
            });
        }
        if self.bullet_speed <= 0.0 {
            return Err(CalibrationError::InvalidObservation {
                row,
                reason: format!("bullet_speed must be positive, got {}", self.bullet_speed),
            });
        }
        Ok(Observation::from_measurement(
            self.angle,
            self.target_x,
            self.target_y,
            self.bullet_speed,
        ))
    }
}

/// Parse observations from any CSV source with an `angle,target_x,target_y,bullet_speed` header.
///
/// Rows are numbered from 1, not counting the header.
pub fn parse_observations<R: Read>(reader: R) -> Result<Vec<Observation>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    csv_reader
        .deserialize::<ObservationRecord>()
        .enumerate()
        .map(|(i, record)| record?.into_observation(i + 1))
        .collect()
}

/// Load observations from a CSV file
pub fn load_observations<P: AsRef<Path>>(path: P) -> Result<Vec<Observation>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CalibrationError::MissingInput {
            path: path.to_path_buf(),
        });
    }

    let file = std::fs::File::open(path)?;
    let observations = parse_observations(file)?;
    info!("Loaded {} observations from {}", observations.len(), path.display());
    Ok(observations)
}

/// Like [`load_observations`], but any failure to read the file yields an
/// empty list. The failure is logged at `error`.
pub fn load_observations_or_empty<P: AsRef<Path>>(path: P) -> Vec<Observation> {
    let path = path.as_ref();
    match load_observations(path) {
        Ok(observations) => observations,
        Err(CalibrationError::MissingInput { path }) => {
            error!("Observation file {} does not exist", path.display());
            Vec::new()
        }
        Err(e) => {
            error!("Could not load observations from {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "angle,target_x,target_y,bullet_speed\n\
                          -16.9,1,0,17\n\
                          -10,2,0,17\n";

    #[test]
    fn test_parse_applies_conversions() {
        let observations = parse_observations(SAMPLE.as_bytes()).unwrap();
        assert_eq!(observations.len(), 2);

        let first = observations[0];
        assert_relative_eq!(first.launch_angle_rad, (-16.9_f64).to_radians(), epsilon = 1e-15);
        assert_eq!(first.target_x, 1.0);
        assert_eq!(first.target_y, -0.375);
        assert_eq!(first.muzzle_speed, 17.0);
        assert_relative_eq!(observations[1].launch_angle_deg(), -10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let data = "angle, target_x, target_y, bullet_speed\n -5.8 , 3 , 0.1 , 17.0\n";
        let observations = parse_observations(data.as_bytes()).unwrap();
        assert_relative_eq!(observations[0].target_y, 0.1 - 0.375, epsilon = 1e-15);
    }

    #[test]
    fn test_non_positive_speed_rejected() {
        let data = "angle,target_x,target_y,bullet_speed\n-10,2,0,17\n-5,3,0,0\n";
        match parse_observations(data.as_bytes()) {
            Err(CalibrationError::InvalidObservation { row, .. }) => assert_eq!(row, 2),
            other => panic!("expected InvalidObservation, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_row_is_csv_error() {
        let data = "angle,target_x,target_y,bullet_speed\n-10,two,0,17\n";
        assert!(matches!(
            parse_observations(data.as_bytes()),
            Err(CalibrationError::Csv(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let observations = load_observations(file.path()).unwrap();
        assert_eq!(observations.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.csv");

        assert!(matches!(
            load_observations(&path),
            Err(CalibrationError::MissingInput { .. })
        ));
        assert!(load_observations_or_empty(&path).is_empty());
    }

    #[test]
    fn test_unparseable_file_loads_as_empty() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"angle,target_x,target_y,bullet_speed\n-10,two,0,17\n")
            .unwrap();
        assert!(matches!(
            load_observations(file.path()),
            Err(CalibrationError::Csv(_))
        ));
        assert!(load_observations_or_empty(file.path()).is_empty());

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"angle,target_x,target_y,bullet_speed\n-10,2,0,-17\n")
            .unwrap();
        assert!(load_observations_or_empty(file.path()).is_empty());
    }
}
