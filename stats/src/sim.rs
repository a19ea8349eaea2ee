use serde::{Deserialize, Serialize};

/// Statistics of a complete simulation run.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sim {
    /// Number of driver rounds in which at least one core was stepped.
    pub rounds: u64,
    /// Per-warp counters, ordered by core id and warp id.
    pub warps: Vec<super::Warp>,
}

impl Sim {
    /// Sum of all per-warp counters.
    #[must_use]
    pub fn total(&self) -> super::Warp {
        let mut total = super::Warp::default();
        for warp in &self.warps {
            total += warp;
        }
        total
    }

    /// Write one CSV row per warp.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_writer(writer);
        for warp in &self.warps {
            writer.serialize(warp)?;
        }
        writer.flush()?;
        Ok(())
    }
}
