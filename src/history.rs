//! Per-episode records of a convergence run and their CSV export

use std::{fs::File, path::Path};

use csv::Writer;
use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeRecord {
    /// 1-based episode number within the run
    pub episode: usize,
    pub start_x: usize,
    pub start_y: usize,
    pub steps: usize,
    pub total_reward: f64,
    pub policy_changed: bool,
    /// Consecutive episodes without a policy change, this one included
    pub unchanged_streak: usize,
    /// The episode hit the step limit before reaching a goal
    pub truncated: bool,
}

pub fn write_history_csv(path: impl AsRef<Path>, records: &[EpisodeRecord]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| Error::Io {
        operation: format!("create history file {}", path.display()),
        source,
    })?;
    let mut writer = Writer::from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|source| Error::Io {
        operation: format!("flush history file {}", path.display()),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let records = vec![
            EpisodeRecord {
                episode: 1,
                start_x: 0,
                start_y: 2,
                steps: 7,
                total_reward: 0.76,
                policy_changed: true,
                unchanged_streak: 0,
                truncated: false,
            },
            EpisodeRecord {
                episode: 2,
                start_x: 3,
                start_y: 0,
                steps: 1,
                total_reward: 1.0,
                policy_changed: false,
                unchanged_streak: 1,
                truncated: false,
            },
        ];
        write_history_csv(&path, &records).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines[0],
            "episode,start_x,start_y,steps,total_reward,policy_changed,unchanged_streak,truncated"
        );
        assert_eq!(lines[1], "1,0,2,7,0.76,true,0,false");
        assert_eq!(lines[2], "2,3,0,1,1.0,false,1,false");
    }
}
