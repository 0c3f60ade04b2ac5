//! Cluster wall-time extraction.
//!
//! Batch schedulers kill worker processes hard at the job's wall-time limit,
//! so the budget loop needs the limit in seconds. SLURM spells it as
//! `batch.t`, PBS buries it in the resource list as `walltime=HH:MM:SS`.

use hs_types::{ConfigError, HsResult};
use tracing::warn;

use crate::loader::{PbsSection, SlurmSection};

/// Assumed when no scheduler section yields a usable limit.
pub const DEFAULT_WALL_TIME_SECS: u64 = 12 * 3600;

/// Parse `HH:MM:SS`, `MM:SS`, or plain seconds into seconds.
pub fn parse_wall_time(value: &str) -> HsResult<u64> {
    let parts: Result<Vec<u64>, _> = value.trim().split(':').map(str::parse).collect();
    let parts = parts.map_err(|_| ConfigError::WallTime {
        value: value.to_string(),
    })?;

    let secs = match parts.as_slice() {
        [s] => *s,
        [m, s] => m * 60 + s,
        [h, m, s] => h * 3600 + m * 60 + s,
        _ => {
            return Err(ConfigError::WallTime {
                value: value.to_string(),
            }
            .into())
        }
    };
    Ok(secs)
}

/// Resolve the wall-time limit from whichever scheduler section is present.
///
/// Falls back to [`DEFAULT_WALL_TIME_SECS`] with a warning when the limit is
/// absent or unparsable, matching how a worker should degrade on an
/// unfamiliar cluster rather than refuse to run.
pub fn wall_time_from_sections(
    slurm: Option<&SlurmSection>,
    pbs: Option<&PbsSection>,
) -> u64 {
    if let Some(slurm) = slurm {
        if let Some(t) = slurm.batch.t.as_deref() {
            match parse_wall_time(t) {
                Ok(secs) => return secs,
                Err(e) => warn!("Could not parse SLURM wall-time {t:?}: {e}"),
            }
        }
    }

    if let Some(pbs) = pbs {
        for option in &pbs.batch.l {
            if let Some(t) = option.split("walltime=").nth(1) {
                match parse_wall_time(t) {
                    Ok(secs) => return secs,
                    Err(e) => warn!("Could not parse PBS wall-time {t:?}: {e}"),
                }
            }
        }
    }

    warn!(
        "Could not determine the cluster wall-time. Assuming {} hours.",
        DEFAULT_WALL_TIME_SECS / 3600
    );
    DEFAULT_WALL_TIME_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{PbsBatch, SlurmBatch};

    #[test]
    fn parses_hms() {
        assert_eq!(parse_wall_time("12:00:00").unwrap(), 43200);
        assert_eq!(parse_wall_time("00:30:15").unwrap(), 1815);
    }

    #[test]
    fn parses_ms_and_bare_seconds() {
        assert_eq!(parse_wall_time("90:00").unwrap(), 5400);
        assert_eq!(parse_wall_time("3600").unwrap(), 3600);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_wall_time("twelve hours").is_err());
        assert!(parse_wall_time("1:2:3:4").is_err());
    }

    #[test]
    fn slurm_section_wins() {
        let slurm = SlurmSection {
            batch: SlurmBatch {
                t: Some("06:00:00".to_string()),
            },
        };
        assert_eq!(wall_time_from_sections(Some(&slurm), None), 21600);
    }

    #[test]
    fn pbs_walltime_option_is_found() {
        let pbs = PbsSection {
            batch: PbsBatch {
                l: vec![
                    "select=1:ncpus=8".to_string(),
                    "walltime=01:00:00".to_string(),
                ],
            },
        };
        assert_eq!(wall_time_from_sections(None, Some(&pbs)), 3600);
    }

    #[test]
    fn missing_sections_fall_back_to_default() {
        assert_eq!(wall_time_from_sections(None, None), DEFAULT_WALL_TIME_SECS);
    }
}
